use std::collections::HashMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use serde_json::Value;

/// A row under construction or cached for copy lookups, keyed by column name.
pub type RowMap = HashMap<String, GeneratedValue>;

/// Generated value for a column or an intermediate expression result.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Duration(TimeDelta),
    List(Vec<GeneratedValue>),
    /// Insertion-ordered mapping.
    Dict(Vec<(GeneratedValue, GeneratedValue)>),
}

impl GeneratedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, GeneratedValue::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            GeneratedValue::Null => "NoneType",
            GeneratedValue::Bool(_) => "bool",
            GeneratedValue::Int(_) => "int",
            GeneratedValue::Float(_) => "float",
            GeneratedValue::Text(_) => "str",
            GeneratedValue::Uuid(_) => "UUID",
            GeneratedValue::Date(_) => "date",
            GeneratedValue::Time(_) => "time",
            GeneratedValue::Timestamp(_) => "datetime",
            GeneratedValue::Duration(_) => "timedelta",
            GeneratedValue::List(_) => "list",
            GeneratedValue::Dict(_) => "dict",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            GeneratedValue::Null => false,
            GeneratedValue::Bool(value) => *value,
            GeneratedValue::Int(value) => *value != 0,
            GeneratedValue::Float(value) => *value != 0.0,
            GeneratedValue::Text(value) | GeneratedValue::Uuid(value) => !value.is_empty(),
            GeneratedValue::Duration(value) => !value.is_zero(),
            GeneratedValue::List(items) => !items.is_empty(),
            GeneratedValue::Dict(entries) => !entries.is_empty(),
            GeneratedValue::Date(_) | GeneratedValue::Time(_) | GeneratedValue::Timestamp(_) => {
                true
            }
        }
    }

    /// Cell text for CSV export; null becomes an empty field.
    pub fn to_csv(&self) -> String {
        match self {
            GeneratedValue::Null => String::new(),
            other => other.to_string(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            GeneratedValue::Null => Value::Null,
            GeneratedValue::Bool(value) => Value::Bool(*value),
            GeneratedValue::Int(value) => Value::from(*value),
            GeneratedValue::Float(value) => serde_json::Number::from_f64(*value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            GeneratedValue::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            GeneratedValue::Dict(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.to_json()))
                    .collect(),
            ),
            other => Value::String(other.to_string()),
        }
    }

    /// Python-style `repr`, used for values nested in lists and dicts.
    pub fn repr(&self) -> String {
        match self {
            GeneratedValue::Text(value) => quote(value),
            GeneratedValue::Uuid(value) => format!("UUID('{value}')"),
            GeneratedValue::Date(value) => format!(
                "datetime.date({}, {}, {})",
                value.format("%Y"),
                value.format("%-m"),
                value.format("%-d")
            ),
            other => other.to_string(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            GeneratedValue::Bool(value) => Some(if *value { 1.0 } else { 0.0 }),
            GeneratedValue::Int(value) => Some(*value as f64),
            GeneratedValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            GeneratedValue::Bool(value) => Some(i64::from(*value)),
            GeneratedValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            GeneratedValue::Text(value) | GeneratedValue::Uuid(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            GeneratedValue::Date(value) => Some(*value),
            GeneratedValue::Timestamp(value) => Some(value.date()),
            _ => None,
        }
    }
}

impl fmt::Display for GeneratedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneratedValue::Null => f.write_str("None"),
            GeneratedValue::Bool(true) => f.write_str("True"),
            GeneratedValue::Bool(false) => f.write_str("False"),
            GeneratedValue::Int(value) => write!(f, "{value}"),
            GeneratedValue::Float(value) => f.write_str(&format_float(*value)),
            GeneratedValue::Text(value) | GeneratedValue::Uuid(value) => f.write_str(value),
            GeneratedValue::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            GeneratedValue::Time(value) => {
                if value.nanosecond() == 0 {
                    write!(f, "{}", value.format("%H:%M:%S"))
                } else {
                    write!(f, "{}", value.format("%H:%M:%S%.6f"))
                }
            }
            GeneratedValue::Timestamp(value) => {
                if value.nanosecond() == 0 {
                    write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S"))
                } else {
                    write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S%.6f"))
                }
            }
            GeneratedValue::Duration(value) => f.write_str(&format_duration(*value)),
            GeneratedValue::List(items) => {
                let items: Vec<String> = items.iter().map(Self::repr).collect();
                write!(f, "[{}]", items.join(", "))
            }
            GeneratedValue::Dict(entries) => {
                let entries: Vec<String> = entries
                    .iter()
                    .map(|(key, value)| format!("{}: {}", key.repr(), value.repr()))
                    .collect();
                write!(f, "{{{}}}", entries.join(", "))
            }
        }
    }
}

impl From<bool> for GeneratedValue {
    fn from(value: bool) -> Self {
        GeneratedValue::Bool(value)
    }
}

impl From<i64> for GeneratedValue {
    fn from(value: i64) -> Self {
        GeneratedValue::Int(value)
    }
}

impl From<f64> for GeneratedValue {
    fn from(value: f64) -> Self {
        GeneratedValue::Float(value)
    }
}

impl From<String> for GeneratedValue {
    fn from(value: String) -> Self {
        GeneratedValue::Text(value)
    }
}

impl From<&str> for GeneratedValue {
    fn from(value: &str) -> Self {
        GeneratedValue::Text(value.to_string())
    }
}

/// Cache key for a value. Equal numbers share a key (`True == 1 == 1.0`);
/// every other value is tagged with its type, so `"1"` and `1` stay apart.
pub fn value_key(value: &GeneratedValue) -> String {
    match value {
        GeneratedValue::Null => "<null>".to_string(),
        GeneratedValue::Bool(flag) => i64::from(*flag).to_string(),
        GeneratedValue::Int(value) => value.to_string(),
        GeneratedValue::Float(value) if value.fract() == 0.0 && value.abs() < 9.0e15 => {
            (*value as i64).to_string()
        }
        GeneratedValue::Float(_) => value.to_string(),
        other => format!("{}:{}", other.type_name(), other),
    }
}

pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let abs = value.abs();
    if abs == 0.0 || (1e-4..1e16).contains(&abs) {
        let text = value.to_string();
        if text.contains('.') {
            text
        } else {
            format!("{text}.0")
        }
    } else {
        let text = format!("{value:e}");
        match text.split_once('e') {
            Some((mantissa, exponent)) => {
                let exponent: i32 = exponent.parse().unwrap_or_default();
                let sign = if exponent < 0 { '-' } else { '+' };
                format!("{mantissa}e{sign}{:02}", exponent.abs())
            }
            None => text,
        }
    }
}

fn format_duration(value: TimeDelta) -> String {
    let total = value.num_seconds();
    let micros = value.subsec_nanos().rem_euclid(1_000_000_000) / 1_000;
    let days = total.div_euclid(86_400);
    let rem = total.rem_euclid(86_400);
    let clock = format!("{}:{:02}:{:02}", rem / 3600, (rem % 3600) / 60, rem % 60);
    let clock = if micros != 0 {
        format!("{clock}.{micros:06}")
    } else {
        clock
    };
    match days {
        0 => clock,
        1 | -1 => format!("{days} day, {clock}"),
        _ => format!("{days} days, {clock}"),
    }
}

fn quote(value: &str) -> String {
    if value.contains('\'') && !value.contains('"') {
        format!("\"{value}\"")
    } else {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
    }
}
