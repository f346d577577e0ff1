//! Host-side rendering of trainer input lines.
//!
//! Applies the same per-type rules as the generated SQL to rows held in
//! memory, so the encoding of a handful of sample rows can be checked
//! without a running engine.

use crate::encoder::sanitize_text;
use crate::error::EncodeError;
use crate::job::JobSpec;
use crate::query::EXAMPLE_WEIGHT;
use crate::types::{Column, ColumnType, NamespaceMap};
use serde_json::Value;

/// A row keyed by column name.
pub type Row = serde_json::Map<String, Value>;

/// Token for one column value, empty when the value is null or zero.
pub fn render_token(column: &Column, value: Option<&Value>) -> Result<String, EncodeError> {
    let value = value.filter(|v| !v.is_null());
    let name = &column.name;
    let token = match &column.data_type {
        ColumnType::Double => match value.and_then(as_f64) {
            Some(v) if v != 0.0 => format!("{name}:{v:.2} "),
            _ => String::new(),
        },
        ColumnType::Integer => match value.and_then(as_i64) {
            Some(v) if v != 0 => format!("{name}:{v} "),
            _ => String::new(),
        },
        ColumnType::Boolean => match value.map(as_flag) {
            Some(1) => format!("{name}:1 "),
            _ => String::new(),
        },
        ColumnType::Text => match value.map(as_text) {
            Some(text) if !text.is_empty() => format!("{} ", sanitize_text(&text)),
            _ => String::new(),
        },
        ColumnType::Other(raw) => {
            return Err(EncodeError::UnsupportedType {
                column: name.clone(),
                data_type: raw.clone(),
            });
        }
    };
    Ok(token)
}

/// Render `row` as one trainer input line.
///
/// Returns `None` for rows with a null or missing label, which the
/// extraction query filters out.
pub fn render_row(
    job: &JobSpec,
    namespaces: &NamespaceMap,
    row: &Row,
) -> Result<Option<String>, EncodeError> {
    let Some(label) = row.get(&job.label_column).filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let label = as_f64(label).unwrap_or(0.0);
    let tag = row
        .get(&job.tag_column)
        .filter(|v| !v.is_null())
        .map(as_text)
        .unwrap_or_default();

    let mut line = format!("{label:.4} {EXAMPLE_WEIGHT} {tag}");
    for ns in namespaces.iter() {
        line.push('|');
        line.push_str(&ns.name);
        line.push(' ');
        for column in &ns.columns {
            line.push_str(&render_token(column, row.get(&column.name))?);
        }
    }
    Ok(Some(line))
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(f64::from(u8::from(*b))),
        _ => None,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn as_flag(value: &Value) -> u8 {
    match value {
        Value::Bool(b) => u8::from(*b),
        other => u8::from(as_i64(other).is_some_and(|v| v != 0)),
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
