//! JSON to column value coercion

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::warn;

use crate::schema::{ColumnSpec, ColumnType, ColumnValue};

/// Coerce an API value to the column's declared type
///
/// `null` stays null. Values that cannot be represented in the column type
/// become null and are logged.
pub fn coerce(value: &Value, column: &ColumnSpec) -> ColumnValue {
    if value.is_null() {
        return ColumnValue::Null;
    }

    let coerced = match column.column_type {
        ColumnType::String => Some(ColumnValue::String(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })),
        ColumnType::Long => to_long(value).map(ColumnValue::Long),
        ColumnType::Boolean => to_bool(value).map(ColumnValue::Boolean),
        ColumnType::Timestamp => to_timestamp(value, column.format.as_deref()).map(ColumnValue::Timestamp),
        ColumnType::Json => Some(ColumnValue::Json(value.clone())),
    };

    coerced.unwrap_or_else(|| {
        warn!(
            column = %column.name,
            column_type = %column.column_type,
            value = %value,
            "Value does not fit column type, emitting null"
        );
        ColumnValue::Null
    })
}

fn to_long(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
        }
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn to_timestamp(value: &Value, format: Option<&str>) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp(s, format),
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}

/// Parse a timestamp string
///
/// Tries the column format first (with or without an offset), then RFC 3339,
/// then the minute-precision `2020-01-02T00:00Z` form the API uses in places.
pub fn parse_timestamp(input: &str, format: Option<&str>) -> Option<DateTime<Utc>> {
    let input = input.trim();

    if let Some(format) = format {
        if let Ok(ts) = DateTime::parse_from_str(input, format) {
            return Some(ts.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Some(naive.and_utc());
        }
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Some(ts.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%MZ", "%Y-%m-%dT%H:%M:%SZ", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .map(|naive| naive.and_utc())
        .or_else(|| {
            DateTime::parse_from_str(input, "%Y-%m-%dT%H:%M%z")
                .ok()
                .map(|ts| ts.with_timezone(&Utc))
        })
}
