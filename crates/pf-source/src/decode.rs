//! Payload decoding shared by the adapters.

use pf_core::SourceError;
use serde_json::Value;

/// Parse a text frame or response body as JSON.
pub fn decode_text(url: &str, text: &str) -> Result<Value, SourceError> {
    serde_json::from_str(text).map_err(|e| SourceError::decode(url, format!("invalid JSON: {e}")))
}

/// Parse a binary frame as UTF-8 JSON.
pub fn decode_binary(url: &str, bytes: &[u8]) -> Result<Value, SourceError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| SourceError::decode(url, format!("binary frame is not UTF-8: {e}")))?;
    decode_text(url, text)
}

/// Narrow `value` to one top-level field. `None` or an empty selector keeps
/// the whole value.
pub fn select_field(url: &str, value: Value, field: Option<&str>) -> Result<Value, SourceError> {
    match field {
        None | Some("") => Ok(value),
        Some(field) => take_field(url, value, field),
    }
}

/// Take a required top-level field out of an object.
pub fn take_field(url: &str, value: Value, field: &str) -> Result<Value, SourceError> {
    match value {
        Value::Object(mut map) => map
            .remove(field)
            .ok_or_else(|| SourceError::decode(url, format!("missing field `{field}`"))),
        other => Err(SourceError::decode(
            url,
            format!("expected an object with field `{field}`, got {}", type_name(&other)),
        )),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
