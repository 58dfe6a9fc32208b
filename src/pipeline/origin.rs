//! Origin rewriting.
//!
//! Published registry documents embed absolute URLs pointing at the host the
//! build ran against. Before publishing elsewhere those URLs are rewritten to
//! the target origin, in every string anywhere in the document.

use serde_json::Value;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{RegistryError, Result};
use crate::installer::write_atomic;

/// Replaces every occurrence of `from` with `to` in all strings of `value`.
///
/// Object keys are left alone. Returns the number of strings changed.
pub fn rewrite_origins(value: &mut Value, from: &str, to: &str) -> usize {
    if from.is_empty() || from == to {
        return 0;
    }
    match value {
        Value::String(s) if s.contains(from) => {
            *s = s.replace(from, to);
            1
        }
        Value::Array(values) => values.iter_mut().map(|v| rewrite_origins(v, from, to)).sum(),
        Value::Object(map) => map.values_mut().map(|v| rewrite_origins(v, from, to)).sum(),
        _ => 0,
    }
}

/// Rewrites one JSON file in place. Returns whether it changed.
pub fn rewrite_file(path: &Path, from: &str, to: &str) -> Result<bool> {
    let raw = std::fs::read_to_string(path).map_err(|e| RegistryError::io("read", path, e))?;
    let mut value: Value = serde_json::from_str(&raw).map_err(|e| RegistryError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;

    if rewrite_origins(&mut value, from, to) == 0 {
        return Ok(false);
    }

    let mut text = serde_json::to_string_pretty(&value).map_err(|e| RegistryError::Serialize {
        path: path.to_path_buf(),
        source: e,
    })?;
    if raw.ends_with('\n') {
        text.push('\n');
    }
    write_atomic(path, text.as_bytes()).map_err(|e| RegistryError::io("write", path, e))?;
    tracing::debug!("Rewrote origin in {}", path.display());
    Ok(true)
}

/// Rewrites every `.json` file under `dir`, returning the files that changed.
pub fn rewrite_dir(dir: &Path, from: &str, to: &str) -> Result<Vec<PathBuf>> {
    let mut changed = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| walk_error(dir, e))?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "json")
            && rewrite_file(entry.path(), from, to)?
        {
            changed.push(entry.into_path());
        }
    }
    tracing::info!("Rewrote {} -> {} in {} file(s)", from, to, changed.len());
    Ok(changed)
}

pub(crate) fn walk_error(root: &Path, e: walkdir::Error) -> RegistryError {
    let path = e.path().unwrap_or(root).to_path_buf();
    let source = e
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
    RegistryError::io("walk", path, source)
}
