//! Freshness of published per-item documents.
//!
//! Compares each source item with the document the external build published
//! for it. Nothing is written; a mismatch is reported as a stale artifact.

use serde_json::Value;
use std::path::Path;

use crate::error::{RegistryError, Result};
use crate::item::{RegistryItem, SourceRegistry};

/// Checks every item of `registry` against `<public_dir>/<name>.json`.
///
/// `fix` is the command suggested in the error.
pub fn check(registry: &SourceRegistry, root: &Path, public_dir: &Path, fix: &str) -> Result<()> {
    for item in &registry.items {
        check_item(item, root, public_dir, fix)?;
    }
    tracing::debug!("{} published item(s) are fresh", registry.items.len());
    Ok(())
}

fn check_item(item: &RegistryItem, root: &Path, public_dir: &Path, fix: &str) -> Result<()> {
    let stale = |detail: String| RegistryError::Stale {
        item: item.name.clone(),
        detail,
        fix: fix.to_string(),
    };

    let published_path = public_dir.join(format!("{}.json", item.name));
    let Ok(raw) = std::fs::read_to_string(&published_path) else {
        return Err(stale(format!("{} is missing", published_path.display())));
    };
    let published: Value = serde_json::from_str(&raw).map_err(|e| RegistryError::Parse {
        path: published_path.clone(),
        source: e,
    })?;

    let published_files = published
        .get("files")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    if published_files.len() != item.files.len() {
        return Err(stale(format!(
            "has {} file(s), source declares {}",
            published_files.len(),
            item.files.len()
        )));
    }

    for (key, expected) in [
        ("dependencies", &item.dependencies),
        ("registryDependencies", &item.registry_dependencies),
    ] {
        let actual = string_array(published.get(key));
        if actual != *expected {
            return Err(stale(format!("{key} differ ({actual:?} vs {expected:?})")));
        }
    }

    for (file, published_file) in item.files.iter().zip(published_files) {
        let source_path = root.join(&file.path);
        let source = std::fs::read_to_string(&source_path)
            .map_err(|e| RegistryError::io("read", &source_path, e))?;
        let content = published_file.get("content").and_then(Value::as_str);
        if content != Some(source.as_str()) {
            return Err(stale(format!("content of {} changed", file.path)));
        }
    }

    Ok(())
}

fn string_array(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
