//! Bundle integrity digests.
//!
//! The digest covers `{items, ...extra}` and never the `integrity` field
//! itself. Serialization goes through `serde_json::Value`, whose object maps
//! keep keys sorted, so the builder and the loader produce identical bytes for
//! identical content regardless of how the file on disk was formatted.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Top-level bundle key holding the digest; excluded from hashing.
pub const INTEGRITY_FIELD: &str = "integrity";
const PREFIX: &str = "sha256:";

/// Compact, key-sorted JSON for `value`.
pub fn canonical_json(value: &Value) -> String {
    // Value's Display is the compact serializer and cannot fail.
    value.to_string()
}

/// Digest of a bundle body. Any `integrity` key present in `body` is ignored.
pub fn digest(body: &Map<String, Value>) -> String {
    let mut preimage = body.clone();
    preimage.remove(INTEGRITY_FIELD);
    let canonical = canonical_json(&Value::Object(preimage));

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{PREFIX}{}", hex::encode(hasher.finalize()))
}

/// Compares a stored integrity string against the body it claims to cover.
///
/// Returns the recomputed digest on mismatch.
pub fn verify(body: &Map<String, Value>, expected: &str) -> Result<(), String> {
    let actual = digest(body);
    if actual == expected {
        Ok(())
    } else {
        Err(actual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn digest_has_algorithm_prefix() {
        let d = digest(&body(json!({ "items": [] })));
        assert!(d.starts_with("sha256:"));
        assert_eq!(d.len(), "sha256:".len() + 64);
    }

    #[test]
    fn digest_ignores_key_order_and_integrity_field() {
        let a = body(json!({ "items": [{ "name": "a" }], "themes": { "x": 1 } }));
        let b = body(json!({
            "themes": { "x": 1 },
            "integrity": "sha256:whatever",
            "items": [{ "name": "a" }]
        }));
        assert_eq!(digest(&a), digest(&b));
    }

    #[test]
    fn digest_changes_when_items_change() {
        let a = body(json!({ "items": [{ "name": "a", "content": "x" }] }));
        let b = body(json!({ "items": [{ "name": "a", "content": "y" }] }));
        assert_ne!(digest(&a), digest(&b));
    }

    #[test]
    fn digest_changes_when_extra_changes() {
        let a = body(json!({ "items": [], "themes": { "dark": "#000" } }));
        let b = body(json!({ "items": [], "themes": { "dark": "#001" } }));
        assert_ne!(digest(&a), digest(&b));
    }

    #[test]
    fn verify_reports_recomputed_digest() {
        let b = body(json!({ "items": [] }));
        let good = digest(&b);
        assert!(verify(&b, &good).is_ok());
        assert_eq!(verify(&b, "sha256:00"), Err(good));
    }

    #[test]
    fn canonical_json_is_compact_and_sorted() {
        let v = json!({ "b": 1, "a": [true, null] });
        insta::assert_snapshot!(canonical_json(&v), @r#"{"a":[true,null],"b":1}"#);
    }
}
