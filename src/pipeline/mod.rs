//! Artifact pipeline.
//!
//! Wraps the external registry build that writes one JSON document per item,
//! verifies those documents are fresh, and publishes them into a clean
//! artifact directory with a manifest and an input fingerprint that downstream
//! caches key on.

pub mod fingerprint;
pub mod freshness;
pub mod origin;

use serde::Serialize;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use std::process::Command;

use crate::config::{PipelineConfig, ProjectConfig};
use crate::error::{RegistryError, Result};
use crate::installer::write_atomic;
use crate::item::SourceRegistry;
use crate::schema;

/// What `ensure_public_artifacts` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensured {
    /// Published documents already matched the sources.
    Fresh,
    /// The index was missing and the build ran.
    Built,
    /// Documents were stale and the build ran again.
    Rebuilt,
}

/// Contents of the manifest written next to published artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    pub generator: String,
    pub fingerprint: String,
    pub inputs: Vec<String>,
    /// Published files, relative to the artifact directory.
    pub files: Vec<String>,
    pub origin: Option<String>,
}

/// Result of [`ArtifactPipeline::publish`].
#[derive(Debug)]
pub struct PublishReport {
    pub output_dir: PathBuf,
    pub manifest: Manifest,
    /// Copies whose origin was rewritten.
    pub rewritten: usize,
}

/// Build, freshness, and publish steps for one project root.
pub struct ArtifactPipeline {
    root: PathBuf,
    registry_file: PathBuf,
    config: PipelineConfig,
}

impl ArtifactPipeline {
    /// Creates a pipeline for `root` using the project configuration.
    pub fn new(root: impl Into<PathBuf>, project: &ProjectConfig) -> Self {
        Self {
            root: root.into(),
            registry_file: project.registry.clone(),
            config: project.pipeline.clone(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Absolute directory of the published per-item documents.
    pub fn public_dir(&self) -> PathBuf {
        self.root.join(&self.config.public_dir)
    }

    /// Absolute directory publish writes into.
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.config.output_dir)
    }

    fn build_command_display(&self) -> String {
        self.config.build_command.join(" ")
    }

    /// Runs the external registry build in the project root.
    pub fn run_build(&self) -> Result<()> {
        let shown = self.build_command_display();
        let Some((program, args)) = self.config.build_command.split_first() else {
            return Err(RegistryError::ExternalBuild {
                command: shown,
                reason: "no build command configured".to_string(),
            });
        };

        tracing::info!("Running `{}`", shown);
        let output = Command::new(program)
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|e| RegistryError::ExternalBuild {
                command: shown.clone(),
                reason: format!("could not be started: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RegistryError::ExternalBuild {
                command: shown,
                reason: format!("{}: {}", output.status, stderr.trim()),
            });
        }
        Ok(())
    }

    fn source_registry(&self) -> Result<SourceRegistry> {
        let path = self.root.join(&self.registry_file);
        let raw = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RegistryError::NotFound {
                what: "registry definition",
                path: path.clone(),
                hint: "create it or set `registry` in the project config".to_string(),
            },
            _ => RegistryError::io("read", &path, e),
        })?;
        let value: Value = serde_json::from_str(&raw).map_err(|e| RegistryError::Parse {
            path: path.clone(),
            source: e,
        })?;
        schema::source_registry(value, &path)
    }

    /// Fails with a stale-artifact error if any published document is out of date.
    pub fn check_freshness(&self) -> Result<()> {
        let registry = self.source_registry()?;
        freshness::check(&registry, &self.root, &self.public_dir(), &self.build_command_display())
    }

    /// Makes sure published per-item documents exist and match the sources.
    ///
    /// Builds when the index is missing. Stale documents are rebuilt only when
    /// `allow_rebuild` is set; otherwise the stale error is returned.
    pub fn ensure_public_artifacts(&self, allow_rebuild: bool) -> Result<Ensured> {
        let index = self.public_dir().join(&self.config.index);
        if !index.exists() {
            tracing::info!("{} is missing, building", index.display());
            self.run_build()?;
            self.check_freshness()?;
            return Ok(Ensured::Built);
        }

        match self.check_freshness() {
            Ok(()) => Ok(Ensured::Fresh),
            Err(RegistryError::Stale { item, detail, .. }) if allow_rebuild => {
                tracing::info!("'{}' is stale ({}), rebuilding", item, detail);
                self.run_build()?;
                self.check_freshness()?;
                Ok(Ensured::Rebuilt)
            }
            Err(e) => Err(e),
        }
    }

    /// Publishes build outputs into a freshly reset artifact directory.
    ///
    /// `target_origin`, when set, replaces the configured `origin.from` in
    /// every published copy.
    pub fn publish(&self, target_origin: Option<&str>) -> Result<PublishReport> {
        let output_dir = self.checked_output_dir()?;
        let fingerprint = fingerprint::fingerprint(&self.root, &self.config.inputs)?;

        reset_dir(&output_dir)?;

        let mut files = Vec::new();
        for pattern in &self.config.outputs {
            for (relative, source) in self.matching_outputs(pattern)? {
                let dest = output_dir.join(&relative);
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| RegistryError::io("create directory", parent, e))?;
                }
                std::fs::copy(&source, &dest).map_err(|e| RegistryError::io("copy", &source, e))?;
                files.push(relative);
            }
        }
        files.sort();
        files.dedup();

        let mut rewritten = 0;
        if let Some(to) = target_origin {
            match self.config.origin.from.as_deref() {
                Some(from) => rewritten = origin::rewrite_dir(&output_dir, from, to)?.len(),
                None => tracing::warn!("Target origin {} given but `pipeline.origin.from` is not set; skipping rewrite", to),
            }
        }

        let manifest = Manifest {
            generator: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            fingerprint: fingerprint.clone(),
            inputs: self
                .config
                .inputs
                .iter()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .collect(),
            files,
            origin: target_origin.map(str::to_string),
        };

        let manifest_path = output_dir.join(&self.config.manifest_file);
        let mut text = serde_json::to_string_pretty(&manifest).map_err(|e| RegistryError::Serialize {
            path: manifest_path.clone(),
            source: e,
        })?;
        text.push('\n');
        write_atomic(&manifest_path, text.as_bytes())
            .map_err(|e| RegistryError::io("write", &manifest_path, e))?;

        let fingerprint_path = output_dir.join(&self.config.fingerprint_file);
        write_atomic(&fingerprint_path, format!("{fingerprint}\n").as_bytes())
            .map_err(|e| RegistryError::io("write", &fingerprint_path, e))?;

        tracing::info!(
            "Published {} file(s) to {} (fingerprint {})",
            manifest.files.len(),
            output_dir.display(),
            fingerprint
        );

        Ok(PublishReport {
            output_dir,
            manifest,
            rewritten,
        })
    }

    /// The artifact directory, refusing anything that is not strictly below the root.
    fn checked_output_dir(&self) -> Result<PathBuf> {
        let relative = &self.config.output_dir;
        let below_root = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
            && relative.components().any(|c| matches!(c, Component::Normal(_)));
        if !below_root {
            return Err(RegistryError::Config {
                path: PathBuf::from(crate::config::CONFIG_FILE),
                message: format!(
                    "pipeline.outputDir '{}' must be a relative path below the project root",
                    relative.display()
                ),
            });
        }
        Ok(self.root.join(relative))
    }

    /// Files matching `pattern`, paired with their path relative to the pattern's fixed prefix.
    fn matching_outputs(&self, pattern: &str) -> Result<Vec<(String, PathBuf)>> {
        let base = self.root.join(glob_base(pattern));
        let full = self.root.join(pattern);
        let entries = glob::glob(&full.to_string_lossy()).map_err(|e| RegistryError::Config {
            path: PathBuf::from(crate::config::CONFIG_FILE),
            message: format!("invalid output pattern '{pattern}': {e}"),
        })?;

        let mut matches = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| {
                let path = e.path().to_path_buf();
                RegistryError::io("read", path, std::io::Error::from(e))
            })?;
            if !path.is_file() {
                continue;
            }
            let relative = path
                .strip_prefix(&base)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            matches.push((relative, path));
        }
        if matches.is_empty() {
            tracing::warn!("Output pattern '{}' matched no files", pattern);
        }
        Ok(matches)
    }
}

/// Leading path segments of `pattern` that contain no glob syntax.
fn glob_base(pattern: &str) -> PathBuf {
    let segments: Vec<&str> = pattern.split('/').collect();
    let fixed = segments
        .iter()
        .take_while(|segment| !segment.contains(['*', '?', '[', '{']))
        .count();
    // The last segment always names files, wildcard or not.
    let dirs = fixed.min(segments.len().saturating_sub(1));
    segments[..dirs].iter().collect()
}

fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir).map_err(|e| RegistryError::io("remove", dir, e))?;
    }
    std::fs::create_dir_all(dir).map_err(|e| RegistryError::io("create directory", dir, e))
}
