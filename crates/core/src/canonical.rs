//! Canonical JSON encoding used for export-package and secure-channel
//! checksums: object keys sorted lexicographically at every level, no
//! insignificant whitespace, minimal Unicode escaping.
//!
//! Array element order is preserved; only object keys are reordered.

use serde::Serialize;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::error::CoreError;

/// Render a [`serde_json::Value`] as canonical JSON text.
#[must_use]
pub fn to_canonical_json(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "null".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string()),
        JsonValue::Array(items) => {
            let rendered: Vec<String> = items.iter().map(to_canonical_json).collect();
            format!("[{}]", rendered.join(","))
        }
        JsonValue::Object(map) => {
            let sorted: BTreeMap<&String, &JsonValue> = map.iter().collect();
            let rendered: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| {
                    let key = serde_json::to_string(k).unwrap_or_else(|_| "\"\"".to_string());
                    format!("{key}:{}", to_canonical_json(v))
                })
                .collect();
            format!("{{{}}}", rendered.join(","))
        }
    }
}

/// Serialize `value`, then render it as canonical JSON.
pub fn to_canonical_json_of<T: Serialize>(value: &T) -> Result<String, CoreError> {
    let json = serde_json::to_value(value).map_err(CoreError::Serialization)?;
    Ok(to_canonical_json(&json))
}

/// SHA-256 over the canonical JSON encoding of `value`, hex-encoded lowercase.
pub fn canonical_checksum<T: Serialize>(value: &T) -> Result<String, CoreError> {
    let canonical = to_canonical_json_of(value)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_object_keys() {
        let value = json!({"z": 1, "a": 2});
        assert_eq!(to_canonical_json(&value), r#"{"a":2,"z":1}"#);
    }

    #[test]
    fn sorts_nested_object_keys() {
        let value = json!({"outer": {"z": 1, "a": 2}});
        assert_eq!(to_canonical_json(&value), r#"{"outer":{"a":2,"z":1}}"#);
    }

    #[test]
    fn preserves_array_order() {
        let value = json!([3, 1, 2]);
        assert_eq!(to_canonical_json(&value), "[3,1,2]");
    }

    #[test]
    fn no_insignificant_whitespace() {
        let value = json!({"a": [1, 2], "b": "x"});
        let rendered = to_canonical_json(&value);
        assert!(!rendered.contains(' '));
        assert!(!rendered.contains('\n'));
    }

    #[test]
    fn checksum_is_deterministic_across_key_order() {
        let a = json!({"z": 1, "a": 2});
        let b = json!({"a": 2, "z": 1});
        assert_eq!(
            canonical_checksum(&a).unwrap(),
            canonical_checksum(&b).unwrap()
        );
    }

    #[test]
    fn checksum_changes_with_value() {
        let a = canonical_checksum(&json!({"a": 1})).unwrap();
        let b = canonical_checksum(&json!({"a": 2})).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn checksum_is_64_hex_chars() {
        let checksum = canonical_checksum(&json!({"a": 1})).unwrap();
        assert_eq!(checksum.len(), 64);
        assert!(checksum.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
