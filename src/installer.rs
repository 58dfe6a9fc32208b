//! Transactional installation of registry files into a project.
//!
//! Files are written one at a time, each atomically (temp file in the target
//! directory, then rename). The installer records every file it creates, every
//! directory it creates, and the previous content of every file it
//! overwrites. If any write fails, or the package install that follows fails,
//! that record is replayed backwards so the project looks exactly as it did
//! before the call.
//!
//! The installer assumes exclusive access to the target project for the
//! duration of a call.

use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::config::ProjectConfig;
use crate::error::{RegistryError, Result, ValidationIssue};
use crate::item::RegistryItem;
use crate::package_manager::{InstallCommand, PackageManager};

/// One file to place in the target project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOp {
    pub target: PathBuf,
    pub content: String,
    /// Root-relative path used in reports and logs.
    pub label: String,
    /// Installation root the target belongs to.
    pub root: PathBuf,
}

/// Content a file held before it was overwritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    pub path: PathBuf,
    pub content: Vec<u8>,
}

/// Everything one install call changed, in the order it changed it.
#[derive(Debug, Default)]
pub struct Transaction {
    new_files: Vec<PathBuf>,
    created_dirs: Vec<PathBuf>,
    backups: Vec<Backup>,
}

impl Transaction {
    /// Files that did not exist before this call.
    pub fn new_files(&self) -> &[PathBuf] {
        &self.new_files
    }

    /// Directories created by this call, outermost first.
    pub fn created_dirs(&self) -> &[PathBuf] {
        &self.created_dirs
    }

    /// Prior content of every overwritten file.
    pub fn backups(&self) -> &[Backup] {
        &self.backups
    }

    /// True when the call changed nothing on disk.
    pub fn is_empty(&self) -> bool {
        self.new_files.is_empty() && self.created_dirs.is_empty() && self.backups.is_empty()
    }

    /// Creates every missing ancestor of `path`, outermost first, recording each.
    fn ensure_parent(&mut self, path: &Path) -> std::io::Result<()> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        let missing: Vec<&Path> = parent
            .ancestors()
            .take_while(|dir| !dir.as_os_str().is_empty() && !dir.exists())
            .collect();
        for dir in missing.into_iter().rev() {
            std::fs::create_dir(dir)?;
            self.created_dirs.push(dir.to_path_buf());
        }
        Ok(())
    }

    /// Restores the pre-transaction state as far as possible.
    ///
    /// Every step is attempted even if an earlier one fails; failures are
    /// logged and counted. The record is cleared afterwards.
    pub fn rollback(&mut self) -> usize {
        let mut failures = 0;

        for backup in self.backups.drain(..).rev() {
            if let Err(e) = write_atomic(&backup.path, &backup.content) {
                tracing::warn!("Rollback: failed to restore {}: {}", backup.path.display(), e);
                failures += 1;
            }
        }

        for file in self.new_files.drain(..).rev() {
            match std::fs::remove_file(&file) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!("Rollback: failed to remove {}: {}", file.display(), e);
                    failures += 1;
                }
            }
        }

        for dir in self.created_dirs.drain(..).rev() {
            let is_empty = std::fs::read_dir(&dir)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if !is_empty {
                tracing::debug!("Rollback: keeping non-empty directory {}", dir.display());
                continue;
            }
            if let Err(e) = std::fs::remove_dir(&dir) {
                tracing::warn!("Rollback: failed to remove directory {}: {}", dir.display(), e);
                failures += 1;
            }
        }

        failures
    }
}

/// Outcome of an install call.
#[derive(Debug, Default)]
pub struct InstallReport {
    /// Every file written, new or overwritten.
    pub written: Vec<String>,
    /// Existing files left alone because overwriting was not allowed.
    pub skipped: Vec<String>,
    /// Subset of `written` that replaced an existing file.
    pub overwritten: Vec<String>,
    /// Packages installed, or that would be installed in a dry run.
    pub packages: Vec<String>,
    pub dry_run: bool,
    pub transaction: Transaction,
}

/// How an install treats existing files and the package manager.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub overwrite: bool,
    pub dry_run: bool,
    /// Upper bound on the package manager run.
    pub timeout: Duration,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            dry_run: false,
            timeout: Duration::from_secs(300),
        }
    }
}

/// Writes file operations as one transaction.
pub struct Installer {
    options: InstallOptions,
}

impl Installer {
    /// Creates an installer with `options`.
    pub fn new(options: InstallOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &InstallOptions {
        &self.options
    }

    /// Writes every op or none of them.
    pub fn install_files(&self, ops: &[FileOp]) -> Result<InstallReport> {
        let mut report = InstallReport {
            dry_run: self.options.dry_run,
            ..InstallReport::default()
        };

        for op in ops {
            if let Err(source) = self.apply(op, &mut report) {
                let failures = report.transaction.rollback();
                if failures > 0 {
                    tracing::warn!("Rollback finished with {} failure(s)", failures);
                }
                return Err(RegistryError::Transaction {
                    label: op.label.clone(),
                    source,
                });
            }
        }

        tracing::info!(
            "Wrote {} file(s), skipped {}, overwrote {}",
            report.written.len(),
            report.skipped.len(),
            report.overwritten.len()
        );
        Ok(report)
    }

    fn apply(&self, op: &FileOp, report: &mut InstallReport) -> std::io::Result<()> {
        let exists = op.target.exists();

        if exists && !self.options.overwrite {
            tracing::debug!("Skipping existing {}", op.label);
            report.skipped.push(op.label.clone());
            return Ok(());
        }

        if self.options.dry_run {
            report.written.push(op.label.clone());
            if exists {
                report.overwritten.push(op.label.clone());
            }
            return Ok(());
        }

        if exists {
            let prior = std::fs::read(&op.target)?;
            report.transaction.backups.push(Backup {
                path: op.target.clone(),
                content: prior,
            });
            write_atomic(&op.target, op.content.as_bytes())?;
            report.overwritten.push(op.label.clone());
        } else {
            report.transaction.ensure_parent(&op.target)?;
            write_atomic(&op.target, op.content.as_bytes())?;
            report.transaction.new_files.push(op.target.clone());
        }

        tracing::debug!("Wrote {}", op.label);
        report.written.push(op.label.clone());
        Ok(())
    }

    /// Writes the files, then installs `packages` with the package manager
    /// detected in `project_root`. A failed install undoes the writes.
    pub async fn install(&self, ops: &[FileOp], packages: &[String], project_root: &Path) -> Result<InstallReport> {
        let manager = PackageManager::detect(project_root, std::env::var("npm_config_user_agent").ok().as_deref());
        tracing::debug!("Using {} in {}", manager, project_root.display());
        let command = manager.install_command(packages, project_root);
        self.install_with(ops, packages, command).await
    }

    /// Like [`Installer::install`], running `command` for the package phase.
    pub async fn install_with(&self, ops: &[FileOp], packages: &[String], command: InstallCommand) -> Result<InstallReport> {
        let mut report = self.install_files(ops)?;
        report.packages = packages.to_vec();

        if self.options.dry_run || packages.is_empty() {
            return Ok(report);
        }

        if let Err(err) = command.run(self.options.timeout).await {
            let failures = report.transaction.rollback();
            if failures > 0 {
                tracing::warn!("Rollback finished with {} failure(s)", failures);
            }
            return Err(err);
        }

        Ok(report)
    }
}

/// Replaces `path` with `content` via a sibling temp file and a rename.
///
/// A crash mid-write leaves either the old file or the new one, never a
/// truncated mix. The temp file is removed if anything fails. A replaced file
/// keeps its permissions; a new file gets the same mode `std::fs::write`
/// would give it.
pub fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let existing = std::fs::metadata(path).ok().map(|m| m.permissions());

    let mut builder = tempfile::Builder::new();
    builder.prefix(".tmp-");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // Subject to the umask, like any newly created file.
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    let mut tmp = builder.tempfile_in(dir)?;
    if let Some(permissions) = existing {
        tmp.as_file().set_permissions(permissions)?;
    }
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Builds file operations for `items`, placing files under `root`.
///
/// A file's explicit target wins; otherwise it lands in the directory
/// configured for its type, under its own file name.
pub fn file_ops_for(items: &[&RegistryItem], root: &Path, config: &ProjectConfig) -> Result<Vec<FileOp>> {
    let mut ops = Vec::new();
    let mut issues = Vec::new();

    for item in items {
        for (i, file) in item.files.iter().enumerate() {
            let relative = match &file.target {
                Some(target) => PathBuf::from(target),
                None => {
                    let name = Path::new(&file.path)
                        .file_name()
                        .map(PathBuf::from)
                        .unwrap_or_else(|| PathBuf::from(&file.path));
                    PathBuf::from(config.directory_for(item.file_kind(file))).join(name)
                }
            };

            if !stays_inside(&relative) {
                issues.push(ValidationIssue::new(
                    format!("{}.files[{i}]", item.name),
                    format!("target {} escapes the project root", relative.display()),
                ));
                continue;
            }

            let Some(content) = &file.content else {
                issues.push(ValidationIssue::new(
                    format!("{}.files[{i}].content", item.name),
                    "bundle file has no content",
                ));
                continue;
            };

            ops.push(FileOp {
                target: root.join(&relative),
                content: content.clone(),
                label: relative.to_string_lossy().replace('\\', "/"),
                root: root.to_path_buf(),
            });
        }
    }

    if !issues.is_empty() {
        return Err(RegistryError::Validation {
            path: root.to_path_buf(),
            issues,
        });
    }

    // Two items shipping the same target: last one wins, first one is dropped.
    let mut seen = std::collections::HashSet::new();
    let mut distinct: Vec<FileOp> = ops
        .into_iter()
        .rev()
        .filter(|op| seen.insert(op.target.clone()))
        .collect();
    distinct.reverse();
    Ok(distinct)
}

fn stays_inside(relative: &Path) -> bool {
    let mut depth: usize = 0;
    for component in relative.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    depth > 0
}
