//! Structural validation of registry documents.
//!
//! Deserializing with serde stops at the first problem. Authors fixing a
//! registry want every problem at once, so documents are first walked as raw
//! JSON and each violation is recorded with its location.

use serde_json::Value;
use std::path::Path;

use crate::error::{RegistryError, Result, ValidationIssue};
use crate::item::{ItemKind, SourceRegistry};

/// Which document is being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Document {
    /// Author-maintained definition; file content lives on disk.
    Source,
    /// Built artifact; every file carries its content.
    Bundle,
}

/// Collects every structural issue in `value`.
pub fn check(value: &Value, document: Document) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let Some(root) = value.as_object() else {
        issues.push(ValidationIssue::new("$", "expected an object"));
        return issues;
    };

    match root.get("items") {
        Some(Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                check_item(item, &format!("items[{i}]"), document, &mut issues);
            }
        }
        Some(_) => issues.push(ValidationIssue::new("items", "expected an array")),
        None => issues.push(ValidationIssue::new("items", "required field is missing")),
    }

    if document == Document::Bundle
        && let Some(integrity) = root.get("integrity")
        && !integrity.is_string()
    {
        issues.push(ValidationIssue::new("integrity", "expected a string"));
    }

    issues
}

fn check_item(item: &Value, at: &str, document: Document, issues: &mut Vec<ValidationIssue>) {
    let Some(obj) = item.as_object() else {
        issues.push(ValidationIssue::new(at, "expected an object"));
        return;
    };

    match obj.get("name") {
        Some(Value::String(s)) if !s.trim().is_empty() => {}
        _ => issues.push(ValidationIssue::new(
            format!("{at}.name"),
            "expected a non-empty string",
        )),
    }

    check_kind(obj.get("type"), &format!("{at}.type"), true, issues);

    for key in ["title", "description"] {
        if let Some(v) = obj.get(key)
            && !v.is_string()
        {
            issues.push(ValidationIssue::new(format!("{at}.{key}"), "expected a string"));
        }
    }

    for key in ["dependencies", "registryDependencies"] {
        check_string_array(obj.get(key), &format!("{at}.{key}"), issues);
    }
    if let Some(Value::Array(refs)) = obj.get("registryDependencies") {
        for (i, r) in refs.iter().enumerate() {
            if r.as_str().is_some_and(|s| s.trim().is_empty()) {
                issues.push(ValidationIssue::new(
                    format!("{at}.registryDependencies[{i}]"),
                    "reference must not be empty",
                ));
            }
        }
    }

    match obj.get("files") {
        None => {}
        Some(Value::Array(files)) => {
            for (i, file) in files.iter().enumerate() {
                check_file(file, &format!("{at}.files[{i}]"), document, issues);
            }
        }
        Some(_) => issues.push(ValidationIssue::new(format!("{at}.files"), "expected an array")),
    }

    match obj.get("meta") {
        None => {}
        Some(Value::Object(meta)) => {
            for key in ["client", "hidden"] {
                if let Some(v) = meta.get(key)
                    && !v.is_boolean()
                {
                    issues.push(ValidationIssue::new(
                        format!("{at}.meta.{key}"),
                        "expected a boolean",
                    ));
                }
            }
            check_string_array(
                meta.get("optionalIntegrations"),
                &format!("{at}.meta.optionalIntegrations"),
                issues,
            );
        }
        Some(_) => issues.push(ValidationIssue::new(format!("{at}.meta"), "expected an object")),
    }
}

fn check_file(file: &Value, at: &str, document: Document, issues: &mut Vec<ValidationIssue>) {
    let Some(obj) = file.as_object() else {
        issues.push(ValidationIssue::new(at, "expected an object"));
        return;
    };

    match obj.get("path") {
        Some(Value::String(p)) if !p.is_empty() => {
            if let Some(problem) = path_problem(p) {
                issues.push(ValidationIssue::new(format!("{at}.path"), problem));
            }
        }
        _ => issues.push(ValidationIssue::new(
            format!("{at}.path"),
            "expected a non-empty string",
        )),
    }

    match (obj.get("content"), document) {
        (Some(Value::String(_)), _) | (None, Document::Source) => {}
        (None, Document::Bundle) => issues.push(ValidationIssue::new(
            format!("{at}.content"),
            "required field is missing",
        )),
        (Some(_), _) => issues.push(ValidationIssue::new(
            format!("{at}.content"),
            "expected a string",
        )),
    }

    match obj.get("target") {
        None => {}
        Some(Value::String(t)) => {
            if let Some(problem) = path_problem(t) {
                issues.push(ValidationIssue::new(format!("{at}.target"), problem));
            }
        }
        Some(_) => issues.push(ValidationIssue::new(format!("{at}.target"), "expected a string")),
    }

    check_kind(obj.get("type"), &format!("{at}.type"), false, issues);
}

fn check_kind(value: Option<&Value>, at: &str, required: bool, issues: &mut Vec<ValidationIssue>) {
    match value {
        None if !required => {}
        None => issues.push(ValidationIssue::new(at, "required field is missing")),
        Some(Value::String(s)) if ItemKind::from_str_opt(s).is_some() => {}
        Some(Value::String(s)) => {
            issues.push(ValidationIssue::new(at, format!("unknown item type '{s}'")))
        }
        Some(_) => issues.push(ValidationIssue::new(at, "expected a string")),
    }
}

fn check_string_array(value: Option<&Value>, at: &str, issues: &mut Vec<ValidationIssue>) {
    match value {
        None => {}
        Some(Value::Array(values)) => {
            for (i, v) in values.iter().enumerate() {
                if !v.is_string() {
                    issues.push(ValidationIssue::new(format!("{at}[{i}]"), "expected a string"));
                }
            }
        }
        Some(_) => issues.push(ValidationIssue::new(at, "expected an array of strings")),
    }
}

/// Explains why a registry-relative path is unsafe, if it is.
pub fn path_problem(path: &str) -> Option<&'static str> {
    let normalized = path.replace('\\', "/");
    if normalized.starts_with('/') || Path::new(path).is_absolute() {
        return Some("path must be relative");
    }
    if normalized.split('/').any(|segment| segment == "..") {
        return Some("path must not contain '..' segments");
    }
    None
}

/// Converts an already checked document into its typed form.
pub fn typed<T: serde::de::DeserializeOwned>(value: Value, source: &Path) -> Result<T> {
    serde_json::from_value(value).map_err(|e| RegistryError::Validation {
        path: source.to_path_buf(),
        issues: vec![ValidationIssue::new("$", e.to_string())],
    })
}

/// Validates and converts a source registry definition.
pub fn source_registry(value: Value, source: &Path) -> Result<SourceRegistry> {
    let issues = check(&value, Document::Source);
    if !issues.is_empty() {
        return Err(RegistryError::Validation {
            path: source.to_path_buf(),
            issues,
        });
    }
    typed(value, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paths(issues: &[ValidationIssue]) -> Vec<&str> {
        issues.iter().map(|i| i.path.as_str()).collect()
    }

    #[test]
    fn valid_source_has_no_issues() {
        let doc = json!({
            "items": [{
                "name": "button",
                "type": "registry:ui",
                "dependencies": ["@radix-ui/react-slot"],
                "registryDependencies": [],
                "files": [{ "path": "ui/button.tsx" }],
                "meta": { "client": true }
            }]
        });
        assert!(check(&doc, Document::Source).is_empty());
    }

    #[test]
    fn reports_every_issue() {
        let doc = json!({
            "items": [
                { "name": "", "type": "registry:ui" },
                { "name": "b", "type": "registry:bogus", "dependencies": [1] },
                { "name": "c", "type": "registry:lib", "files": [{ "path": "../escape.ts" }] },
                { "name": "d", "type": "registry:lib", "meta": { "hidden": "yes" } }
            ]
        });
        let issues = check(&doc, Document::Source);
        assert_eq!(
            paths(&issues),
            vec![
                "items[0].name",
                "items[1].type",
                "items[1].dependencies[0]",
                "items[2].files[0].path",
                "items[3].meta.hidden",
            ]
        );
    }

    #[test]
    fn missing_items_is_reported() {
        let issues = check(&json!({}), Document::Source);
        assert_eq!(paths(&issues), vec!["items"]);
        let issues = check(&json!([]), Document::Source);
        assert_eq!(paths(&issues), vec!["$"]);
    }

    #[test]
    fn bundle_requires_content() {
        let doc = json!({
            "items": [{ "name": "a", "type": "registry:lib", "files": [{ "path": "a.ts" }] }],
            "integrity": 5
        });
        let issues = check(&doc, Document::Bundle);
        assert_eq!(paths(&issues), vec!["items[0].files[0].content", "integrity"]);
        assert!(check(&doc, Document::Source).is_empty());
    }

    #[test]
    fn empty_reference_is_rejected() {
        let doc = json!({
            "items": [{ "name": "a", "type": "registry:lib", "registryDependencies": ["b", " "] }]
        });
        let issues = check(&doc, Document::Source);
        assert_eq!(paths(&issues), vec!["items[0].registryDependencies[1]"]);
    }

    #[test]
    fn path_problems() {
        assert_eq!(path_problem("ui/button.tsx"), None);
        assert_eq!(path_problem("ui/..hidden/x.ts"), None);
        assert!(path_problem("../x.ts").is_some());
        assert!(path_problem("ui/../../x.ts").is_some());
        assert!(path_problem("ui\\..\\x.ts").is_some());
        assert!(path_problem("/etc/passwd").is_some());
    }

    #[test]
    fn source_registry_converts_valid_documents() {
        let doc = json!({ "items": [{ "name": "a", "type": "registry:hook" }] });
        let registry = source_registry(doc, Path::new("registry.json")).unwrap();
        assert_eq!(registry.items[0].name, "a");
    }

    #[test]
    fn typed_conversion_fails_with_validation_error() {
        let err = typed::<crate::item::Bundle>(json!({ "items": 3 }), Path::new("bundle.json")).unwrap_err();
        assert!(matches!(err, RegistryError::Validation { ref issues, .. } if issues.len() == 1));
    }
}
