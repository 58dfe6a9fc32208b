//! npm import detection.
//!
//! Scans module source for static `import` statements and reduces each
//! specifier to the package that provides it. Type-only imports are erased at
//! compile time and never need a runtime package; specifiers starting with a
//! configured alias prefix point into the consuming project itself.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// Specifier prefixes that never name an npm package.
pub const DEFAULT_ALIAS_PREFIXES: [&str; 4] = ["@/", "./", "../", "node:"];

// A statement starts a line or follows a `;`. The clause between `import` and
// `from` may span lines but never contains a quote or semicolon, so a
// side-effect import cannot swallow the next statement.
static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)(?:^|;)\s*import\s+(type\s+)?(?:[^"';]*?\s*from\s*)?["']([^"'\n]+)["']"#)
        .expect("import pattern is valid")
});

/// Returns the npm packages imported by `source`.
pub fn detect(source: &str, alias_prefixes: &[String]) -> BTreeSet<String> {
    IMPORT_RE
        .captures_iter(source)
        .filter(|caps| caps.get(1).is_none())
        .filter_map(|caps| caps.get(2))
        .map(|m| m.as_str())
        .filter(|specifier| !alias_prefixes.iter().any(|p| specifier.starts_with(p.as_str())))
        .filter_map(package_root)
        .collect()
}

/// Reduces an import specifier to its package: `@scope/pkg/sub` → `@scope/pkg`,
/// `pkg/sub` → `pkg`.
pub fn package_root(specifier: &str) -> Option<String> {
    let mut parts = specifier.split('/');
    let first = parts.next().filter(|s| !s.is_empty())?;
    if first.starts_with('@') {
        let second = parts.next().filter(|s| !s.is_empty())?;
        if first.len() == 1 {
            return None;
        }
        Some(format!("{first}/{second}"))
    } else if first.starts_with('.') || first.starts_with('#') {
        None
    } else {
        Some(first.to_string())
    }
}

/// Package name of a dependency declaration, without any version range:
/// `zod@^3.22` → `zod`, `@scope/pkg@1` → `@scope/pkg`.
pub fn package_name(declaration: &str) -> &str {
    let search_from = usize::from(declaration.starts_with('@'));
    match declaration[search_from..].find('@') {
        Some(at) => &declaration[..at + search_from],
        None => declaration,
    }
}

/// Owned copy of [`DEFAULT_ALIAS_PREFIXES`].
pub fn default_alias_prefixes() -> Vec<String> {
    DEFAULT_ALIAS_PREFIXES.iter().map(|s| s.to_string()).collect()
}
