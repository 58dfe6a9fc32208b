//! component-registry: build, verify, and install registries of reusable source components.
//!
//! A registry is a named set of items (UI components, hooks, helpers), each
//! shipping source files, npm dependencies, and references to other items.
//! The lifecycle has four phases:
//!
//! 1. **Building**: compile `registry.json` into one integrity-sealed bundle
//! 2. **Loading**: read and verify that bundle once per cache
//! 3. **Resolving**: expand requested items to their dependency closure
//! 4. **Installing**: write files into a project and add npm packages, all or nothing
//!
//! A separate [`pipeline`] publishes per-item documents produced by an
//! external build, fingerprinted for downstream caches.
//!
//! # Example
//!
//! ```no_run
//! use component_registry::{builder, installer, loader, resolver, ProjectConfig};
//! use std::path::Path;
//!
//! let root = Path::new(".");
//! let config = ProjectConfig::load(root).unwrap();
//! builder::build(root, &config.bundle, &(&config).into()).unwrap();
//!
//! let cache = loader::RegistryCache::new(&config.bundle);
//! let bundle = cache.get_or_load().unwrap();
//! let order = resolver::resolve(&["dialog"], |n| bundle.item(n)).unwrap();
//!
//! let items: Vec<_> = order.iter().filter_map(|n| bundle.item(n)).collect();
//! let ops = installer::file_ops_for(&items, Path::new("../app"), &config).unwrap();
//! println!("{} file(s) to install", ops.len());
//! ```

pub mod builder;
pub mod config;
pub mod error;
pub mod imports;
pub mod installer;
pub mod integrity;
pub mod item;
pub mod loader;
pub mod package_manager;
pub mod pipeline;
pub mod reference;
pub mod resolver;
pub mod schema;

pub use config::ProjectConfig;
pub use error::{RegistryError, Result};
pub use item::{Bundle, ItemKind, RegistryItem};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the stderr log subscriber.
///
/// `RUST_LOG` wins when set; otherwise `debug` and `verbose` raise the
/// default `warn` level.
pub fn init_logging(verbose: bool, debug: bool) {
    let default = if debug {
        "component_registry=debug"
    } else if verbose {
        "component_registry=info"
    } else {
        "component_registry=warn"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .init();
}
