//! Canonical cache-key derivation.
//!
//! A key is the SHA-256 of a canonical JSON rendering of the call
//! parameters: object keys are emitted in sorted order at every depth, so
//! two logically equal parameter sets produce the same key regardless of
//! field insertion order. Unlike an in-process `DefaultHasher`, the digest
//! is stable across processes and builds.

use std::fmt::Write as _;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{MuninnError, Result};

/// Derive the cache key for a serializable parameter set.
///
/// Fails with [`MuninnError::Serialization`] when `params` cannot be
/// represented as JSON (e.g. a map with non-string keys). Callers treat
/// that as a cache bypass.
pub fn derive_key<T: Serialize + ?Sized>(params: &T) -> Result<String> {
    let canonical = canonical_json(params)?;
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(format!("{digest:x}"))
}

/// Render `value` as JSON with recursively sorted object keys.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let value =
        serde_json::to_value(value).map_err(|e| MuninnError::Serialization(e.to_string()))?;
    let mut out = String::new();
    write_canonical(&value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &serde_json::Value, out: &mut String) -> Result<()> {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_scalar(&Value::String(key.clone()), out)?;
                out.push(':');
                write_canonical(&map[key], out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => write_scalar(scalar, out)?,
    }
    Ok(())
}

fn write_scalar(value: &serde_json::Value, out: &mut String) -> Result<()> {
    let rendered =
        serde_json::to_string(value).map_err(|e| MuninnError::Serialization(e.to_string()))?;
    write!(out, "{rendered}").map_err(|e| MuninnError::Serialization(e.to_string()))
}
