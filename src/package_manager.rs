//! Package manager detection and invocation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, SystemTime};

use crate::error::{RegistryError, Result};

/// Supported npm clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Pnpm,
    Yarn,
    Bun,
}

/// Lock files and the tool that owns them.
const LOCK_FILES: [(&str, PackageManager); 5] = [
    ("pnpm-lock.yaml", PackageManager::Pnpm),
    ("yarn.lock", PackageManager::Yarn),
    ("bun.lockb", PackageManager::Bun),
    ("bun.lock", PackageManager::Bun),
    ("package-lock.json", PackageManager::Npm),
];

impl PackageManager {
    /// Executable name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Pnpm => "pnpm",
            Self::Yarn => "yarn",
            Self::Bun => "bun",
        }
    }

    /// Parses an executable name such as `pnpm`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "npm" => Some(Self::Npm),
            "pnpm" => Some(Self::Pnpm),
            "yarn" => Some(Self::Yarn),
            "bun" => Some(Self::Bun),
            _ => None,
        }
    }

    /// Picks the package manager a project uses.
    ///
    /// Checks, in order: the `packageManager` field of `package.json`, the
    /// `npm_config_user_agent` value the project's own scripts were started
    /// with, the most recently modified lock file. Falls back to npm.
    pub fn detect(root: &Path, user_agent: Option<&str>) -> Self {
        if let Some(pm) = from_package_json(&root.join("package.json")) {
            return pm;
        }
        if let Some(pm) = user_agent.and_then(from_user_agent) {
            return pm;
        }
        from_lock_files(root).unwrap_or(Self::Npm)
    }

    /// Arguments that add `packages` to the project.
    pub fn install_args(self, packages: &[String]) -> Vec<String> {
        let verb = match self {
            Self::Npm => "install",
            Self::Pnpm | Self::Yarn | Self::Bun => "add",
        };
        std::iter::once(verb.to_string())
            .chain(packages.iter().cloned())
            .collect()
    }

    /// Command installing `packages` in `root`.
    pub fn install_command(self, packages: &[String], root: &Path) -> InstallCommand {
        InstallCommand::new(self.as_str(), self.install_args(packages), root)
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn from_package_json(path: &Path) -> Option<PackageManager> {
    let raw = std::fs::read_to_string(path).ok()?;
    let value: serde_json::Value = serde_json::from_str(&raw).ok()?;
    let field = value.get("packageManager")?.as_str()?;
    let name = field.split('@').next().unwrap_or(field);
    PackageManager::from_name(name)
}

/// `pnpm/8.6.0 npm/? node/v18.0.0 darwin x64` → pnpm.
fn from_user_agent(agent: &str) -> Option<PackageManager> {
    let first = agent.split_whitespace().next()?;
    let name = first.split('/').next().unwrap_or(first);
    PackageManager::from_name(name)
}

fn from_lock_files(root: &Path) -> Option<PackageManager> {
    LOCK_FILES
        .iter()
        .filter_map(|(file, pm)| {
            let meta = std::fs::metadata(root.join(file)).ok().filter(|m| m.is_file())?;
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            Some((modified, *pm))
        })
        // max_by_key keeps the last maximum; reverse so earlier entries win ties.
        .rev()
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, pm)| pm)
}

/// A fully specified external install invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl InstallCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: cwd.into(),
        }
    }

    /// Shell-like rendering for messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Runs the command, killing it if it outlives `timeout`.
    pub async fn run(&self, timeout: Duration) -> Result<()> {
        let shown = self.display();
        tracing::info!("Running `{}` in {}", shown, self.cwd.display());

        let child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RegistryError::InstallFailed {
                command: shown.clone(),
                reason: format!("could not be started: {e}"),
                stderr: String::new(),
            })?;

        // Dropping the child on timeout kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(RegistryError::InstallFailed {
                    command: shown,
                    reason: format!("failed while running: {e}"),
                    stderr: String::new(),
                });
            }
            Err(_) => {
                return Err(RegistryError::InstallFailed {
                    command: shown,
                    reason: format!("timed out after {}s", timeout.as_secs_f32()),
                    stderr: String::new(),
                });
            }
        };

        if !output.status.success() {
            let reason = match output.status.code() {
                Some(code) => format!("exited with status {code}"),
                None => "was terminated by a signal".to_string(),
            };
            return Err(RegistryError::InstallFailed {
                command: shown,
                reason,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        tracing::debug!("`{}` finished", shown);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn packages(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn package_json_field_wins() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("package.json"),
            r#"{ "packageManager": "pnpm@9.1.0" }"#,
        )
        .unwrap();
        std::fs::write(tmp.path().join("yarn.lock"), "").unwrap();
        assert_eq!(
            PackageManager::detect(tmp.path(), Some("bun/1.0.0")),
            PackageManager::Pnpm
        );
    }

    #[test]
    fn user_agent_beats_lock_files() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("yarn.lock"), "").unwrap();
        assert_eq!(
            PackageManager::detect(tmp.path(), Some("bun/1.1.0 npm/? node/v20.0.0 linux x64")),
            PackageManager::Bun
        );
    }

    #[test]
    fn newest_lock_file_wins() {
        let tmp = TempDir::new().unwrap();
        let old = File::create(tmp.path().join("package-lock.json")).unwrap();
        old.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000))
            .unwrap();
        let new = File::create(tmp.path().join("yarn.lock")).unwrap();
        new.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(2_000))
            .unwrap();
        assert_eq!(PackageManager::detect(tmp.path(), None), PackageManager::Yarn);
    }

    #[test]
    fn defaults_to_npm() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(PackageManager::detect(tmp.path(), None), PackageManager::Npm);
        assert_eq!(
            PackageManager::detect(tmp.path(), Some("something-else/1.0")),
            PackageManager::Npm
        );
    }

    #[test]
    fn install_arguments() {
        let pkgs = packages(&["zod", "@radix-ui/react-slot"]);
        assert_eq!(
            PackageManager::Npm.install_args(&pkgs),
            vec!["install", "zod", "@radix-ui/react-slot"]
        );
        assert_eq!(
            PackageManager::Pnpm.install_command(&pkgs, Path::new("/p")).display(),
            "pnpm add zod @radix-ui/react-slot"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let tmp = TempDir::new().unwrap();
        let cmd = InstallCommand::new(
            "sh",
            packages(&["-c", "echo 'ERR! not found' >&2; exit 3"]),
            tmp.path(),
        );
        let err = cmd.run(Duration::from_secs(10)).await.unwrap_err();
        match err {
            RegistryError::InstallFailed { reason, stderr, .. } => {
                assert_eq!(reason, "exited with status 3");
                assert!(stderr.contains("ERR! not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_command_times_out() {
        let tmp = TempDir::new().unwrap();
        let cmd = InstallCommand::new("sleep", packages(&["5"]), tmp.path());
        let err = cmd.run(Duration::from_millis(100)).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn missing_program_is_reported() {
        let tmp = TempDir::new().unwrap();
        let cmd = InstallCommand::new("definitely-not-a-package-manager", vec![], tmp.path());
        let err = cmd.run(Duration::from_secs(1)).await.unwrap_err();
        assert!(err.to_string().contains("could not be started"));
    }
}
