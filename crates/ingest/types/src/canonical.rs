//! Canonical JSON encoding and content fingerprints.
//!
//! Object keys are emitted in sorted order regardless of how the map was
//! built, so structurally equal values always encode to the same bytes.

use serde::Serialize;
use serde_json::Value;

/// Prefix of every fingerprint string.
pub const FINGERPRINT_PREFIX: &str = "blake3:";

/// Encode `value` as compact JSON with recursively sorted object keys.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Deterministic fingerprint of a JSON value: `blake3:<hex>` over its canonical encoding.
pub fn fingerprint(value: &Value) -> String {
    let hash = blake3::hash(canonical_json(value).as_bytes());
    format!("{}{}", FINGERPRINT_PREFIX, hash.to_hex())
}

/// Fingerprint any serializable value.
pub fn fingerprint_of<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(fingerprint(&serde_json::to_value(value)?))
}
