//! Project configuration.
//!
//! Read from `registry.config.json` at the project root. The file may contain
//! `//` and `/* */` comments; everything is optional and falls back to the
//! defaults below, so a project without a config file works out of the box.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::error::{RegistryError, Result};
use crate::imports;
use crate::item::ItemKind;

/// Project configuration file, relative to the root. Comments are allowed.
pub const CONFIG_FILE: &str = "registry.config.json";

/// Environment variable holding the origin substituted during origin rewriting.
pub const ORIGIN_ENV: &str = "REGISTRY_ORIGIN";

/// Settings read from [`CONFIG_FILE`]; every field has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectConfig {
    /// Source registry definition, relative to the root.
    pub registry: PathBuf,
    /// Bundle output (build) and input (install) path.
    pub bundle: PathBuf,
    pub alias_prefixes: Vec<String>,
    /// Packages the consuming framework always provides.
    pub core_dependencies: BTreeSet<String>,
    pub peer_dependencies: BTreeSet<String>,
    /// Overrides for where each item type is installed.
    pub directories: BTreeMap<String, String>,
    pub pipeline: PipelineConfig,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            registry: PathBuf::from("registry.json"),
            bundle: PathBuf::from("dist/registry.bundle.json"),
            alias_prefixes: imports::default_alias_prefixes(),
            core_dependencies: ["react", "react-dom"].iter().map(|s| s.to_string()).collect(),
            peer_dependencies: BTreeSet::new(),
            directories: BTreeMap::new(),
            pipeline: PipelineConfig::default(),
        }
    }
}

/// Publish pipeline settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Where the external build writes one JSON document per item.
    pub public_dir: PathBuf,
    /// Index file inside `public_dir` whose absence triggers a build.
    pub index: String,
    /// External registry-build invocation: program followed by its arguments.
    pub build_command: Vec<String>,
    /// Artifact directory, wiped and recreated on every publish.
    pub output_dir: PathBuf,
    /// Paths fingerprinted for cache invalidation, in order.
    pub inputs: Vec<PathBuf>,
    /// Glob patterns of build outputs copied into the artifact directory.
    pub outputs: Vec<String>,
    pub manifest_file: String,
    pub fingerprint_file: String,
    pub origin: OriginConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            public_dir: PathBuf::from("public/r"),
            index: "index.json".to_string(),
            build_command: vec!["npx".into(), "shadcn".into(), "build".into()],
            output_dir: PathBuf::from("artifacts"),
            inputs: vec![PathBuf::from("registry.json"), PathBuf::from("registry")],
            outputs: vec!["public/r/*.json".to_string()],
            manifest_file: "manifest.json".to_string(),
            fingerprint_file: "fingerprint.txt".to_string(),
            origin: OriginConfig::default(),
        }
    }
}

/// Origin substitution applied to published JSON.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Origin embedded by the build, e.g. `http://localhost:3000`.
    pub from: Option<String>,
    /// Replacement origin. `REGISTRY_ORIGIN` takes precedence when set.
    pub to: Option<String>,
}

impl ProjectConfig {
    /// Loads `<root>/registry.config.json`, or defaults when it does not exist.
    pub fn load(root: &Path) -> Result<Self> {
        Self::load_from_path(&root.join(CONFIG_FILE))
    }

    /// Reads the configuration at `path`; a missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RegistryError::io("read", path, e))?;
        let stripped = strip_json_comments(&raw);
        serde_json::from_str(&stripped).map_err(|e| RegistryError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Install directory for `kind`, honoring overrides keyed by the type name
    /// with or without the `registry:` prefix.
    pub fn directory_for(&self, kind: ItemKind) -> String {
        let full = kind.as_str();
        let short = full.trim_start_matches("registry:");
        self.directories
            .get(full)
            .or_else(|| self.directories.get(short))
            .cloned()
            .unwrap_or_else(|| kind.default_directory().to_string())
    }
}

/// Resolves the origin used when rewriting, preferring the environment.
///
/// The value must be an http(s) origin; trailing slashes are removed.
pub fn target_origin(env_value: Option<String>, configured: Option<&str>) -> Result<Option<String>> {
    let Some(raw) = env_value
        .filter(|v| !v.trim().is_empty())
        .or_else(|| configured.map(str::to_string))
    else {
        return Ok(None);
    };
    normalize_origin(&raw).map(Some)
}

/// Validates an http(s) origin and strips trailing slashes.
pub fn normalize_origin(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(RegistryError::InvalidOrigin(trimmed.to_string()));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

/// Removes `//` line comments and `/* */` block comments outside string literals.
pub fn strip_json_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        let lookahead = chars.peek().copied();
        match (c, lookahead) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    if next == '\n' {
                        out.push('\n');
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }

    out
}
