//! Bundle builder.
//!
//! Compiles the source registry definition into one self-contained bundle:
//! file contents are inlined, npm dependencies are completed from each file's
//! imports, and the whole thing is sealed with an integrity digest.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::ProjectConfig;
use crate::error::{RegistryError, Result, ValidationIssue};
use crate::imports;
use crate::installer::write_atomic;
use crate::integrity::{self, INTEGRITY_FIELD};
use crate::item::{RegistryItem, SourceRegistry};
use crate::reference::ItemRef;
use crate::schema;

/// Maps a registry-relative file path to the path recorded in the bundle.
pub type PathRewrite = Box<dyn Fn(&str) -> String>;

/// Knobs for [`build`].
pub struct BuildOptions {
    /// Source definition, relative to the build root.
    pub registry_file: PathBuf,
    pub alias_prefixes: Vec<String>,
    pub core_dependencies: BTreeSet<String>,
    pub peer_dependencies: BTreeSet<String>,
    pub rewrite_path: Option<PathRewrite>,
    /// Extra top-level content stored next to `items`.
    pub extra: Map<String, Value>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::from(&ProjectConfig::default())
    }
}

impl From<&ProjectConfig> for BuildOptions {
    fn from(config: &ProjectConfig) -> Self {
        Self {
            registry_file: config.registry.clone(),
            alias_prefixes: config.alias_prefixes.clone(),
            core_dependencies: config.core_dependencies.clone(),
            peer_dependencies: config.peer_dependencies.clone(),
            rewrite_path: None,
            extra: Map::new(),
        }
    }
}

/// What a build produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    pub output: PathBuf,
    pub items: usize,
    pub files: usize,
    pub bytes: usize,
    pub integrity: String,
    /// npm dependencies recorded for each item.
    pub dependencies: BTreeMap<String, Vec<String>>,
}

impl fmt::Display for BuildSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} item(s), {} file(s) -> {} ({} bytes, {})",
            self.items,
            self.files,
            self.output.display(),
            self.bytes,
            self.integrity
        )
    }
}

/// Builds the registry under `root` and writes the bundle to `output`.
pub fn build(root: &Path, output: &Path, options: &BuildOptions) -> Result<BuildSummary> {
    let source_path = root.join(&options.registry_file);
    let raw = std::fs::read_to_string(&source_path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => RegistryError::NotFound {
            what: "registry definition",
            path: source_path.clone(),
            hint: "create it or point `--registry` at the right file".to_string(),
        },
        _ => RegistryError::io("read", &source_path, e),
    })?;
    let value: Value = serde_json::from_str(&raw).map_err(|e| RegistryError::Parse {
        path: source_path.clone(),
        source: e,
    })?;
    let mut registry = schema::source_registry(value, &source_path)?;

    check_consistency(&registry, &source_path)?;

    for item in &mut registry.items {
        inline_files(item, root, options)?;
        tracing::debug!("Built {} with {} dependency(ies)", item.name, item.dependencies.len());
    }

    let body = bundle_body(&registry, output, &options.extra)?;
    let digest = integrity::digest(&body);

    let mut sealed = body;
    sealed.insert(INTEGRITY_FIELD.to_string(), Value::String(digest.clone()));
    let mut text = serde_json::to_string_pretty(&Value::Object(sealed)).map_err(|e| RegistryError::Serialize {
        path: output.to_path_buf(),
        source: e,
    })?;
    text.push('\n');

    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| RegistryError::io("create directory", parent, e))?;
    }
    write_atomic(output, text.as_bytes()).map_err(|e| RegistryError::io("write", output, e))?;

    let summary = BuildSummary {
        output: output.to_path_buf(),
        items: registry.items.len(),
        files: registry.items.iter().map(|i| i.files.len()).sum(),
        bytes: text.len(),
        integrity: digest,
        dependencies: registry
            .items
            .iter()
            .map(|i| (i.name.clone(), i.dependencies.clone()))
            .collect(),
    };
    tracing::info!("Built bundle: {}", summary);
    Ok(summary)
}

/// Unique names, and every local reference pointing at an existing item.
fn check_consistency(registry: &SourceRegistry, source_path: &Path) -> Result<()> {
    let mut issues = Vec::new();
    let mut seen = HashSet::new();
    for (i, item) in registry.items.iter().enumerate() {
        if !seen.insert(item.name.as_str()) {
            issues.push(ValidationIssue::new(
                format!("items[{i}].name"),
                format!("duplicate item name '{}'", item.name),
            ));
        }
    }

    for (i, item) in registry.items.iter().enumerate() {
        for (j, raw) in item.registry_dependencies.iter().enumerate() {
            if let Some(name) = ItemRef::parse(raw).and_then(|r| r.local())
                && !seen.contains(name)
            {
                issues.push(ValidationIssue::new(
                    format!("items[{i}].registryDependencies[{j}]"),
                    format!("unknown item '{name}'"),
                ));
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(RegistryError::Validation {
            path: source_path.to_path_buf(),
            issues,
        })
    }
}

/// Inlines file contents and settles the item's dependency list.
fn inline_files(item: &mut RegistryItem, root: &Path, options: &BuildOptions) -> Result<()> {
    // Keyed by bare package name; explicit declarations keep their version range.
    let mut deps: BTreeMap<String, String> = item
        .dependencies
        .iter()
        .map(|d| (imports::package_name(d).to_string(), d.clone()))
        .collect();

    for file in &mut item.files {
        let content = match file.content.take() {
            Some(inline) => inline,
            None => {
                let on_disk = root.join(&file.path);
                std::fs::read_to_string(&on_disk).map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => RegistryError::NotFound {
                        what: "registry file",
                        path: on_disk.clone(),
                        hint: format!("fix the path of '{}' in the registry definition", item.name),
                    },
                    _ => RegistryError::io("read", &on_disk, e),
                })?
            }
        };

        for package in imports::detect(&content, &options.alias_prefixes) {
            deps.entry(package.clone()).or_insert(package);
        }

        if let Some(rewrite) = &options.rewrite_path {
            file.path = rewrite(&file.path);
        }
        file.content = Some(content);
    }

    deps.retain(|name, _| {
        !options.core_dependencies.contains(name) && !options.peer_dependencies.contains(name)
    });
    item.dependencies = deps.into_values().collect();
    Ok(())
}

fn bundle_body(registry: &SourceRegistry, output: &Path, extra: &Map<String, Value>) -> Result<Map<String, Value>> {
    let reserved: Vec<ValidationIssue> = ["items", INTEGRITY_FIELD]
        .into_iter()
        .filter(|key| extra.contains_key(*key))
        .map(|key| ValidationIssue::new(format!("extra.{key}"), "reserved top-level key"))
        .collect();
    if !reserved.is_empty() {
        return Err(RegistryError::Validation {
            path: output.to_path_buf(),
            issues: reserved,
        });
    }

    let items = serde_json::to_value(&registry.items).map_err(|e| RegistryError::Serialize {
        path: output.to_path_buf(),
        source: e,
    })?;
    let mut body = extra.clone();
    body.insert("items".to_string(), items);
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Bundle;
    use serde_json::json;
    use tempfile::TempDir;

    fn project(registry: Value, files: &[(&str, &str)]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("registry.json"), registry.to_string()).unwrap();
        for (path, content) in files {
            let full = tmp.path().join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }
        tmp
    }

    fn read_bundle(path: &Path) -> (Value, Bundle) {
        let raw = std::fs::read_to_string(path).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        let bundle = serde_json::from_value(value.clone()).unwrap();
        (value, bundle)
    }

    #[test]
    fn builds_bundle_with_detected_dependencies() {
        let tmp = project(
            json!({
                "items": [{
                    "name": "dialog",
                    "type": "registry:ui",
                    "dependencies": ["zod@^3.22.0"],
                    "files": [{ "path": "registry/ui/dialog.tsx" }]
                }]
            }),
            &[(
                "registry/ui/dialog.tsx",
                "import * as React from \"react\"\nimport * as D from \"@radix-ui/react-dialog/primitive\"\nimport type { Z } from \"zod-types\"\nimport { cn } from \"@/lib/utils\"\n",
            )],
        );
        let output = tmp.path().join("dist/registry.bundle.json");

        let summary = build(tmp.path(), &output, &BuildOptions::default()).unwrap();

        assert_eq!(summary.items, 1);
        assert_eq!(summary.files, 1);
        assert_eq!(
            summary.dependencies["dialog"],
            vec!["@radix-ui/react-dialog", "zod@^3.22.0"]
        );

        let (value, bundle) = read_bundle(&output);
        let file = &bundle.items[0].files[0];
        assert!(file.content.as_deref().unwrap().contains("React"));
        assert_eq!(bundle.integrity, summary.integrity);
        assert!(integrity::verify(value.as_object().unwrap(), &bundle.integrity).is_ok());
    }

    #[test]
    fn peer_dependencies_are_stripped() {
        let tmp = project(
            json!({
                "items": [{
                    "name": "form",
                    "type": "registry:component",
                    "dependencies": ["react-hook-form@7"],
                    "files": [{ "path": "form.tsx" }]
                }]
            }),
            &[("form.tsx", "import { useForm } from 'react-hook-form'\nimport clsx from 'clsx'\n")],
        );
        let mut options = BuildOptions::default();
        options.peer_dependencies.insert("react-hook-form".into());

        let summary = build(tmp.path(), &tmp.path().join("out.json"), &options).unwrap();
        assert_eq!(summary.dependencies["form"], vec!["clsx"]);
    }

    #[test]
    fn consistency_problems_are_collected() {
        let tmp = project(
            json!({
                "items": [
                    { "name": "a", "type": "registry:lib", "registryDependencies": ["ghost"] },
                    { "name": "a", "type": "registry:lib" },
                    { "name": "b", "type": "registry:lib", "registryDependencies": ["https://x.dev/r/c.json", "@acme/d"] }
                ]
            }),
            &[],
        );
        let err = build(tmp.path(), &tmp.path().join("out.json"), &BuildOptions::default()).unwrap_err();
        let issues = match err {
            RegistryError::Validation { issues, .. } => issues,
            other => panic!("expected a validation error, got {other}"),
        };
        let paths: Vec<_> = issues.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["items[1].name", "items[0].registryDependencies[0]"]);
        assert!(!tmp.path().join("out.json").exists());
    }

    #[test]
    fn missing_registry_definition() {
        let tmp = TempDir::new().unwrap();
        let err = build(tmp.path(), &tmp.path().join("out.json"), &BuildOptions::default()).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { what: "registry definition", .. }));
    }

    #[test]
    fn malformed_registry_is_a_parse_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("registry.json"), "{ items: [").unwrap();
        let err = build(tmp.path(), &tmp.path().join("out.json"), &BuildOptions::default()).unwrap_err();
        assert!(matches!(err, RegistryError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_not_found() {
        let tmp = project(
            json!({ "items": [{ "name": "a", "type": "registry:lib", "files": [{ "path": "lib/a.ts" }] }] }),
            &[],
        );
        let err = build(tmp.path(), &tmp.path().join("out.json"), &BuildOptions::default()).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { what: "registry file", .. }));
        assert!(err.to_string().contains("'a'"));
    }

    #[test]
    fn traversal_is_rejected_before_reading() {
        let tmp = project(
            json!({ "items": [{ "name": "a", "type": "registry:lib", "files": [{ "path": "../secret.ts" }] }] }),
            &[],
        );
        let err = build(tmp.path(), &tmp.path().join("out.json"), &BuildOptions::default()).unwrap_err();
        assert!(matches!(err, RegistryError::Validation { .. }));
    }

    #[test]
    fn path_rewrite_and_extra_content() {
        let tmp = project(
            json!({ "items": [{ "name": "a", "type": "registry:lib", "files": [{ "path": "registry/lib/a.ts" }] }] }),
            &[("registry/lib/a.ts", "export const a = 1\n")],
        );
        let mut options = BuildOptions::default();
        options.rewrite_path = Some(Box::new(|p: &str| p.trim_start_matches("registry/").to_string()));
        options.extra.insert("themes".into(), json!({ "dark": { "bg": "#000" } }));
        let output = tmp.path().join("out.json");

        build(tmp.path(), &output, &options).unwrap();

        let (value, bundle) = read_bundle(&output);
        assert_eq!(bundle.items[0].files[0].path, "lib/a.ts");
        assert_eq!(value["themes"]["dark"]["bg"], "#000");
        assert!(integrity::verify(value.as_object().unwrap(), &bundle.integrity).is_ok());
    }

    #[test]
    fn reserved_extra_keys_are_rejected() {
        let tmp = project(json!({ "items": [] }), &[]);
        let mut options = BuildOptions::default();
        options.extra.insert("integrity".into(), json!("sha256:forged"));
        let err = build(tmp.path(), &tmp.path().join("out.json"), &options).unwrap_err();
        assert!(err.to_string().contains("extra.integrity"));
    }

    #[test]
    fn rebuilding_unchanged_sources_is_stable() {
        let tmp = project(
            json!({ "items": [{ "name": "a", "type": "registry:hook", "files": [{ "path": "use-a.ts" }] }] }),
            &[("use-a.ts", "import { useState } from 'react'\n")],
        );
        let output = tmp.path().join("out.json");
        let first = build(tmp.path(), &output, &BuildOptions::default()).unwrap();
        let bytes = std::fs::read(&output).unwrap();
        let second = build(tmp.path(), &output, &BuildOptions::default()).unwrap();
        assert_eq!(first.integrity, second.integrity);
        assert_eq!(bytes, std::fs::read(&output).unwrap());
        assert!(second.dependencies["a"].is_empty());
    }
}
