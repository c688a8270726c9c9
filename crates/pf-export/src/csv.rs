//! CSV rendering of a tabular snapshot.
//!
//! The format is deliberately loose: the header comes from the first record's
//! keys, cells are joined with `", "`, lines end in `\r\n`, and nothing is
//! quoted or escaped. Each row lists its own values in its own key order.

use serde_json::{Number, Value};

const SEPARATOR: &str = ", ";
const LINE_END: &str = "\r\n";

pub fn convert_to_csv(records: &[Value]) -> String {
    let mut out = String::new();

    for (i, record) in records.iter().enumerate() {
        let fields = fields(record);
        if i == 0 {
            let header: Vec<&str> = fields.iter().map(|(k, _)| k.as_str()).collect();
            out.push_str(&header.join(SEPARATOR));
            out.push_str(LINE_END);
        }
        let line: Vec<String> = fields.iter().map(|(_, v)| render(v)).collect();
        out.push_str(&line.join(SEPARATOR));
        out.push_str(LINE_END);
    }

    out
}

/// Key/value pairs of one record. Arrays are keyed by index; scalars have none.
fn fields(record: &Value) -> Vec<(String, &Value)> {
    match record {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Vec::new(),
    }
}

/// Render a cell the way string concatenation would.
fn render(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => render_number(n),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|v| match v {
                Value::Null => String::new(),
                other => render(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

fn render_number(n: &Number) -> String {
    match n.as_f64() {
        // Negative zero prints as plain 0.
        Some(f) if n.is_f64() && f == 0.0 => "0".to_string(),
        Some(f) if n.is_f64() && f.is_finite() && f.fract() == 0.0 && f.abs() < 1e21 => {
            format!("{f:.0}")
        }
        _ => n.to_string(),
    }
}
