//! Registry loader.
//!
//! A [`RegistryCache`] owns one bundle path and loads it at most once. The
//! bundle is validated and its integrity digest recomputed before it is
//! handed out; a corrupted or hand-edited bundle never reaches the resolver.

use once_cell::unsync::OnceCell;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::{RegistryError, Result};
use crate::integrity;
use crate::item::{Bundle, RegistryItem};
use crate::schema::{self, Document};

/// Lazily loaded, verified bundle.
///
/// Not `Sync`: one cache serves one thread. Separate caches load separate
/// registries independently.
#[derive(Debug)]
pub struct RegistryCache {
    path: PathBuf,
    bundle: OnceCell<Bundle>,
}

impl RegistryCache {
    /// Creates an empty cache for the bundle at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            bundle: OnceCell::new(),
        }
    }

    /// Bundle path this cache reads.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the bundle, reading it on first use only.
    ///
    /// A failed load leaves the cache empty, so a later call retries.
    pub fn get_or_load(&self) -> Result<&Bundle> {
        self.bundle.get_or_try_init(|| load_bundle(&self.path))
    }

    /// Looks up `name`, loading the bundle first if needed.
    pub fn item(&self, name: &str) -> Result<Option<&RegistryItem>> {
        Ok(self.get_or_load()?.item(name))
    }

    /// True once a load has succeeded.
    pub fn is_loaded(&self) -> bool {
        self.bundle.get().is_some()
    }
}

/// Reads, validates, and verifies a bundle without caching it.
pub fn load_bundle(path: &Path) -> Result<Bundle> {
    let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => RegistryError::NotFound {
            what: "registry bundle",
            path: path.to_path_buf(),
            hint: "run `component-registry build` first".to_string(),
        },
        _ => RegistryError::io("read", path, e),
    })?;

    let value: Value = serde_json::from_str(&raw).map_err(|e| RegistryError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;

    let issues = schema::check(&value, Document::Bundle);
    if !issues.is_empty() {
        return Err(RegistryError::Validation {
            path: path.to_path_buf(),
            issues,
        });
    }

    if let Value::Object(body) = &value
        && let Some(Value::String(expected)) = body.get(integrity::INTEGRITY_FIELD)
        && !expected.is_empty()
        && let Err(actual) = integrity::verify(body, expected)
    {
        return Err(RegistryError::Integrity {
            path: path.to_path_buf(),
            expected: expected.clone(),
            actual,
        });
    }

    let bundle: Bundle = schema::typed(value, path)?;
    if bundle.integrity.is_empty() {
        tracing::warn!("{} carries no integrity digest; loaded unverified", path.display());
    }
    tracing::debug!("Loaded {} item(s) from {}", bundle.items.len(), path.display());
    Ok(bundle)
}
