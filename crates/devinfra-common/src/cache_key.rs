//! Content-addressed cache keys for Operation templates
//!
//! The key is the sole source of Cache identity, so it must be a pure
//! function of the template's structure: the template is serialized to a
//! JSON value, canonicalized (object keys sorted, array order kept, integral
//! floats collapsed to integers), rendered without whitespace and hashed
//! with SHA-256.

use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::Error;

/// Number of hex characters kept from the digest (128 bits)
pub const CACHE_KEY_LEN: usize = 32;

/// Compute the cache key for any serializable template
pub fn cache_key<T: Serialize>(template: &T) -> Result<String, Error> {
    let value = serde_json::to_value(template)?;
    let canonical = canonical_json(&value);
    Ok(hash_hex(canonical.as_bytes(), CACHE_KEY_LEN))
}

/// Render a JSON value in canonical form
pub fn canonical_json(value: &Value) -> String {
    let normalized = canonicalize(value);
    // serde_json::Value displays compactly with no insignificant whitespace
    normalized.to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Number(n) => Value::Number(normalize_number(n)),
        other => other.clone(),
    }
}

fn normalize_number(n: &Number) -> Number {
    if n.is_i64() || n.is_u64() {
        return n.clone();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
            Number::from(f as i64)
        }
        _ => n.clone(),
    }
}

/// SHA-256 of `input`, lowercase hex, truncated to `len` characters
fn hash_hex(input: &[u8], len: usize) -> String {
    use aws_lc_rs::digest;
    use std::fmt::Write;

    let hash = digest::digest(&digest::SHA256, input);
    let mut out = hash
        .as_ref()
        .iter()
        .fold(String::with_capacity(64), |mut s, b| {
            let _ = write!(s, "{:02x}", b);
            s
        });
    out.truncate(len);
    out
}
