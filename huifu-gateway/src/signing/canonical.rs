//! Canonical byte encoding of parameter mappings.
//!
//! The encoding is compact JSON with object keys sorted by their UTF-8 bytes at
//! every nesting level. Arrays keep their element order. Scalars use
//! `serde_json` encoding. The reserved [`SIGN_FIELD`] is dropped from the top level
//! so a signed map can be re-verified as-is.
//!
//! The encoding does not depend on `serde_json`'s map ordering, so enabling the
//! `preserve_order` feature anywhere in the dependency graph cannot change it.

use serde_json::Value;

use crate::{
    error::{GatewayError, Result},
    model::Params,
    signing::SIGN_FIELD,
};

/// Encodes `params` canonically, excluding the top-level signature field.
///
/// # Errors
///
/// Returns [`GatewayError::Signing`] if a scalar cannot be encoded.
///
/// # Examples
///
/// ```
/// use huifu_gateway::signing::canonicalize;
/// use serde_json::json;
///
/// let params = json!({"b": 1, "a": {"d": true, "c": null}, "sign": "ignored"});
/// let bytes = canonicalize(params.as_object().unwrap()).unwrap();
/// assert_eq!(bytes, br#"{"a":{"c":null,"d":true},"b":1}"#);
/// ```
pub fn canonicalize(params: &Params) -> Result<Vec<u8>> {
    let mut out = String::with_capacity(params.len() * 32);
    let mut keys: Vec<&String> = params.keys().filter(|k| k.as_str() != SIGN_FIELD).collect();
    keys.sort_unstable();

    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_scalar(&mut out, &Value::String(key.clone()))?;
        out.push(':');
        if let Some(value) = params.get(key) {
            write_value(&mut out, value)?;
        }
    }
    out.push('}');

    Ok(out.into_bytes())
}

fn write_value(out: &mut String, value: &Value) -> Result<()> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, nested)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_scalar(out, &Value::String(key.clone()))?;
                out.push(':');
                write_value(out, nested)?;
            }
            out.push('}');
        }
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
        scalar => write_scalar(out, scalar)?,
    }
    Ok(())
}

fn write_scalar(out: &mut String, value: &Value) -> Result<()> {
    let encoded = serde_json::to_string(value)
        .map_err(|e| GatewayError::Signing(format!("cannot encode parameter value: {e}")))?;
    out.push_str(&encoded);
    Ok(())
}
