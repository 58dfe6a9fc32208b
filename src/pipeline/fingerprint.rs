//! Content fingerprint of the pipeline inputs.
//!
//! Any change to a tracked file's path or bytes changes the fingerprint; file
//! modification times do not.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::origin::walk_error;
use crate::error::{RegistryError, Result};

/// Hex SHA-256 over `inputs`, in the order given, relative to `root`.
///
/// A directory contributes each file below it, sorted by relative path, as
/// `path NUL content NUL`. A file contributes `declared-name NUL content NUL`.
/// Missing inputs are an error.
pub fn fingerprint(root: &Path, inputs: &[PathBuf]) -> Result<String> {
    let mut hasher = Sha256::new();

    for input in inputs {
        let full = root.join(input);
        if full.is_dir() {
            for (relative, path) in directory_files(&full)? {
                let content = std::fs::read(&path).map_err(|e| RegistryError::io("read", &path, e))?;
                feed(&mut hasher, relative.as_bytes(), &content);
            }
        } else if full.is_file() {
            let content = std::fs::read(&full).map_err(|e| RegistryError::io("read", &full, e))?;
            feed(&mut hasher, input.to_string_lossy().as_bytes(), &content);
        } else {
            return Err(RegistryError::NotFound {
                what: "fingerprint input",
                path: full,
                hint: "fix `pipeline.inputs` in the project config".to_string(),
            });
        }
    }

    Ok(hex::encode(hasher.finalize()))
}

fn feed(hasher: &mut Sha256, name: &[u8], content: &[u8]) {
    hasher.update(name);
    hasher.update([0u8]);
    hasher.update(content);
    hasher.update([0u8]);
}

/// Files below `dir` as `(forward-slash relative path, full path)`, sorted.
fn directory_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| walk_error(dir, e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        files.push((relative, entry.into_path()));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn setup() -> TempDir {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("registry.json"), "{\"items\":[]}").unwrap();
        std::fs::create_dir_all(tmp.path().join("registry/ui")).unwrap();
        std::fs::write(tmp.path().join("registry/ui/button.tsx"), "button").unwrap();
        std::fs::write(tmp.path().join("registry/lib.ts"), "lib").unwrap();
        tmp
    }

    fn inputs() -> Vec<PathBuf> {
        vec![PathBuf::from("registry.json"), PathBuf::from("registry")]
    }

    #[test]
    fn stable_across_runs_and_mtimes() {
        let tmp = setup();
        let first = fingerprint(tmp.path(), &inputs()).unwrap();
        File::options()
            .write(true)
            .open(tmp.path().join("registry/lib.ts"))
            .unwrap()
            .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(42))
            .unwrap();
        assert_eq!(fingerprint(tmp.path(), &inputs()).unwrap(), first);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn content_change_changes_fingerprint() {
        let tmp = setup();
        let before = fingerprint(tmp.path(), &inputs()).unwrap();
        std::fs::write(tmp.path().join("registry/ui/button.tsx"), "button!").unwrap();
        assert_ne!(fingerprint(tmp.path(), &inputs()).unwrap(), before);
    }

    #[test]
    fn rename_changes_fingerprint() {
        let tmp = setup();
        let before = fingerprint(tmp.path(), &inputs()).unwrap();
        std::fs::rename(
            tmp.path().join("registry/lib.ts"),
            tmp.path().join("registry/utils.ts"),
        )
        .unwrap();
        assert_ne!(fingerprint(tmp.path(), &inputs()).unwrap(), before);
    }

    #[test]
    fn input_order_matters() {
        let tmp = setup();
        let forward = fingerprint(tmp.path(), &inputs()).unwrap();
        let mut reversed = inputs();
        reversed.reverse();
        assert_ne!(fingerprint(tmp.path(), &reversed).unwrap(), forward);
    }

    #[test]
    fn known_digest_for_single_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a"), "").unwrap();
        let mut hasher = Sha256::new();
        hasher.update(b"a\0\0");
        assert_eq!(
            fingerprint(tmp.path(), &[PathBuf::from("a")]).unwrap(),
            hex::encode(hasher.finalize())
        );
    }

    #[test]
    fn missing_input_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = fingerprint(tmp.path(), &[PathBuf::from("nope")]).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }
}
