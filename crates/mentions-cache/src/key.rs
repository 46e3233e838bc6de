use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Rebuild `value` with every object's keys in sorted order.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Stable cache key: `prefix:` followed by the hex SHA-256 of the canonical
/// JSON form of `params`.
///
/// # Errors
///
/// Returns the serialization error if `params` cannot be represented as JSON.
pub fn cache_key<P: Serialize + ?Sized>(prefix: &str, params: &P) -> Result<String, serde_json::Error> {
    let canonical = canonicalize(serde_json::to_value(params)?);
    let bytes = serde_json::to_vec(&canonical)?;
    Ok(format!("{prefix}:{:x}", Sha256::digest(&bytes)))
}
