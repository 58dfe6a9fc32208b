//! Command-line interface definitions.
//!
//! Each subcommand maps to one phase of the registry lifecycle: building the
//! bundle, inspecting or resolving it, installing items into a project, and
//! running the publish pipeline.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Build, verify, and install component registries.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Project root holding `registry.config.json`.
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Log phase progress to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log every decision and show full error details.
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compile the registry definition into an integrity-sealed bundle.
    Build {
        /// Registry definition, relative to the root. Overrides the config.
        #[arg(long)]
        registry: Option<PathBuf>,

        /// Bundle output path. Overrides the config.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Strip this prefix from every file path recorded in the bundle.
        #[arg(long)]
        strip_prefix: Option<String>,
    },

    /// List the items of a bundle.
    List {
        /// Bundle to read. Defaults to the configured bundle.
        #[arg(short, long)]
        bundle: Option<PathBuf>,

        /// Include items marked hidden.
        #[arg(long)]
        all: bool,

        /// Emit JSON instead of human-readable output.
        #[arg(long)]
        json: bool,
    },

    /// Print the install order for items and the npm packages they need.
    Resolve {
        /// Item names.
        #[arg(required = true)]
        items: Vec<String>,

        /// Bundle to read. Defaults to the configured bundle.
        #[arg(short, long)]
        bundle: Option<PathBuf>,

        /// Emit JSON instead of human-readable output.
        #[arg(long)]
        json: bool,
    },

    /// Install items and their dependencies into a project.
    Add {
        /// Item names.
        #[arg(required = true)]
        items: Vec<String>,

        /// Bundle to read. Defaults to the configured bundle.
        #[arg(short, long)]
        bundle: Option<PathBuf>,

        /// Project to install into. Defaults to the root.
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Replace files that already exist.
        #[arg(long)]
        overwrite: bool,

        /// Do not ask before overwriting.
        #[arg(short, long)]
        yes: bool,

        /// Report what would change without touching anything.
        #[arg(long)]
        dry_run: bool,

        /// Write files only; leave npm packages alone.
        #[arg(long)]
        skip_install: bool,

        /// Seconds the package manager may run.
        #[arg(long, default_value_t = 300)]
        timeout: u64,
    },

    /// Verify published per-item documents match the sources.
    Check {
        /// Run the external build when documents are stale.
        #[arg(long)]
        rebuild: bool,
    },

    /// Publish build outputs with a manifest and input fingerprint.
    Publish {
        /// Target origin for URLs in published documents. `REGISTRY_ORIGIN` wins when set.
        #[arg(long)]
        origin: Option<String>,

        /// Run the external build when documents are stale.
        #[arg(long)]
        rebuild: bool,
    },

    /// Replace an origin in every JSON file of a directory.
    RewriteOrigin {
        /// Directory to rewrite in place.
        dir: PathBuf,

        /// Origin to replace. Defaults to `pipeline.origin.from`.
        #[arg(long)]
        from: Option<String>,

        /// Replacement origin. `REGISTRY_ORIGIN` wins when set.
        #[arg(long)]
        to: Option<String>,
    },

    /// Print the content fingerprint of the pipeline inputs.
    Fingerprint {
        /// Inputs relative to the root. Defaults to `pipeline.inputs`.
        inputs: Vec<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        let args = Args::parse_from(["component-registry", "add", "button", "--dry-run", "--debug"]);
        assert!(args.debug);
        match args.command {
            Commands::Add { items, dry_run, timeout, .. } => {
                assert_eq!(items, vec!["button"]);
                assert!(dry_run);
                assert_eq!(timeout, 300);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rewrite_origin_is_kebab_case() {
        let args = Args::parse_from(["component-registry", "rewrite-origin", "public/r", "--to", "https://x.dev"]);
        assert!(matches!(args.command, Commands::RewriteOrigin { ref to, .. } if to.as_deref() == Some("https://x.dev")));
    }
}
