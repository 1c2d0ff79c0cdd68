//! Deterministic encoding used as hash input.
//!
//! The encoder walks a `serde_json::Value` itself instead of trusting any
//! map's iteration order: object keys are sorted by their UTF-8 bytes,
//! no whitespace is emitted, strings use JSON escaping, and numbers use
//! `serde_json`'s shortest round-trip formatting. Two values that are equal
//! as JSON always encode to identical bytes.

use serde::Serialize;
use serde_json::Value;

use crate::hasher::HasherError;

/// Encode any serializable value canonically.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HasherError> {
    let value =
        serde_json::to_value(value).map_err(|e| HasherError::Serialization(e.to_string()))?;
    Ok(canonical_string(&value)?.into_bytes())
}

/// Encode a JSON value canonically.
pub fn canonical_string(value: &Value) -> Result<String, HasherError> {
    let mut out = String::new();
    write_value(&mut out, value)?;
    Ok(out)
}

fn write_value(out: &mut String, value: &Value) -> Result<(), HasherError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(out, s)?,
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable_by(|a, b| a.as_bytes().cmp(b.as_bytes()));

            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key)?;
                out.push(':');
                write_value(out, &map[key])?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn write_string(out: &mut String, s: &str) -> Result<(), HasherError> {
    let escaped =
        serde_json::to_string(s).map_err(|e| HasherError::Serialization(e.to_string()))?;
    out.push_str(&escaped);
    Ok(())
}
