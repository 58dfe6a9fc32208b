//! Error taxonomy shared by every stage of the registry lifecycle.
//!
//! Each variant maps to one failure class an operator can act on. Messages are
//! kept to a single line; the CLI decides whether to show the full chain.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Number of trailing stderr lines shown when a package install fails.
const LOG_TAIL_LINES: usize = 12;

/// A single schema or consistency problem, located by a JSON-ish path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Location of the problem, e.g. `items[2].files[0].path`.
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    /// Creates an issue at `path`.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Every failure the library reports.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A required file does not exist; `hint` says how to produce it.
    #[error("{what} not found at {}; {hint}", path.display())]
    NotFound {
        what: &'static str,
        path: PathBuf,
        hint: String,
    },

    /// A document is not valid JSON.
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A document could not be rendered as JSON.
    #[error("failed to serialize {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A document has the wrong shape or inconsistent contents.
    #[error("{} has {} validation issue(s): {}", path.display(), issues.len(), join_issues(issues))]
    Validation {
        path: PathBuf,
        issues: Vec<ValidationIssue>,
    },

    /// A bundle digest does not match its contents.
    #[error("integrity mismatch in {}: expected {expected}, computed {actual} (bundle is corrupt or was modified)", path.display())]
    Integrity {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Items depend on each other in a loop; the first name repeats at the end.
    #[error("circular dependency: {}", cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },

    /// A requested or referenced item is not in the bundle.
    #[error("missing dependency '{name}'{}", requested_by.as_ref().map(|r| format!(" (required by '{r}')")).unwrap_or_default())]
    MissingReference {
        name: String,
        requested_by: Option<String>,
    },

    /// Filesystem failure outside a transaction.
    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file write failed and the install was rolled back.
    #[error("failed to write {label}: {source}; all changes were rolled back")]
    Transaction {
        label: String,
        #[source]
        source: std::io::Error,
    },

    /// The package manager failed or timed out and the install was rolled back.
    #[error("`{command}` {reason}; all changes were rolled back")]
    InstallFailed {
        command: String,
        reason: String,
        stderr: String,
    },

    /// A published document no longer matches its source.
    #[error("published artifact for '{item}' is stale: {detail}; run `{fix}`")]
    Stale {
        item: String,
        detail: String,
        fix: String,
    },

    /// The configured registry build command failed.
    #[error("registry build `{command}` failed: {reason}")]
    ExternalBuild { command: String, reason: String },

    #[error("invalid origin '{0}': must start with http:// or https://")]
    InvalidOrigin(String),

    /// The project configuration could not be read or is inconsistent.
    #[error("invalid configuration in {}: {message}", path.display())]
    Config { path: PathBuf, message: String },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RegistryError>;

impl RegistryError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Tail of the package manager's stderr, for install failures only.
    pub fn install_log(&self) -> Option<String> {
        match self {
            Self::InstallFailed { stderr, .. } => Some(truncate_log(stderr, LOG_TAIL_LINES)),
            _ => None,
        }
    }

    /// Full package manager stderr, for install failures only.
    pub fn full_install_log(&self) -> Option<&str> {
        match self {
            Self::InstallFailed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Keeps the last `max_lines` lines of a log, noting how many were dropped.
pub fn truncate_log(log: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = log.trim_end().lines().collect();
    if lines.len() <= max_lines {
        return lines.join("\n");
    }
    let hidden = lines.len() - max_lines;
    format!(
        "... {} earlier line(s) hidden (rerun with --debug for the full log)\n{}",
        hidden,
        lines[hidden..].join("\n")
    )
}
