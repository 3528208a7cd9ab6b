//! Declared-type coercion applied to a generated table before null injection.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use tabula_core::DeclaredType;

use crate::errors::GenerationError;
use crate::value::{GeneratedValue, RowMap};

pub fn parse_date_value(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp_value(value).map(|moment| moment.date()))
}

pub fn parse_timestamp_value(value: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.naive_utc())
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").ok())
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f").ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
}

/// Convert one value to `declared`. Null stays null.
pub fn coerce_value(value: GeneratedValue, declared: DeclaredType) -> Result<GeneratedValue, String> {
    if value.is_null() {
        return Ok(value);
    }
    match declared {
        DeclaredType::Passthrough => Ok(value),
        DeclaredType::Text => match value {
            GeneratedValue::Text(_) => Ok(value),
            other => Ok(GeneratedValue::Text(other.to_string())),
        },
        DeclaredType::Integer { .. } => {
            let number = to_integer(&value)?;
            let (low, high) = declared.integer_bounds().unwrap_or((i128::from(i64::MIN), i128::from(i64::MAX)));
            if !(low..=high).contains(&i128::from(number)) {
                return Err(format!("{number} is out of range [{low}, {high}]"));
            }
            Ok(GeneratedValue::Int(number))
        }
        DeclaredType::Float { single } => {
            let number = match &value {
                GeneratedValue::Text(text) => text
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| format!("could not convert string to float: '{text}'"))?,
                other => other
                    .as_f64()
                    .ok_or_else(|| format!("cannot convert {} to float", other.type_name()))?,
            };
            Ok(GeneratedValue::Float(if single {
                f64::from(number as f32)
            } else {
                number
            }))
        }
        DeclaredType::Boolean => Ok(GeneratedValue::Bool(value.truthy())),
        DeclaredType::Date => match &value {
            GeneratedValue::Date(_) => Ok(value),
            GeneratedValue::Timestamp(moment) => Ok(GeneratedValue::Date(moment.date())),
            GeneratedValue::Text(text) => parse_date_value(text.trim())
                .map(GeneratedValue::Date)
                .ok_or_else(|| format!("'{text}' is not a date")),
            other => Err(format!("cannot convert {} to date", other.type_name())),
        },
        DeclaredType::Timestamp => match &value {
            GeneratedValue::Timestamp(_) => Ok(value),
            GeneratedValue::Date(date) => Ok(GeneratedValue::Timestamp(date.and_time(NaiveTime::MIN))),
            GeneratedValue::Text(text) => parse_timestamp_value(text.trim())
                .map(GeneratedValue::Timestamp)
                .ok_or_else(|| format!("'{text}' is not a timestamp")),
            other => Err(format!("cannot convert {} to datetime", other.type_name())),
        },
    }
}

fn to_integer(value: &GeneratedValue) -> Result<i64, String> {
    match value {
        GeneratedValue::Int(number) => Ok(*number),
        GeneratedValue::Bool(flag) => Ok(i64::from(*flag)),
        GeneratedValue::Float(number) => {
            if !number.is_finite() {
                return Err(format!("cannot convert non-finite value {number} to integer"));
            }
            let truncated = number.trunc();
            if truncated.abs() >= 9.223_372_036_854_775e18 {
                return Err(format!("{number} does not fit in 64 bits"));
            }
            Ok(truncated as i64)
        }
        GeneratedValue::Text(text) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("invalid literal for int(): '{text}'")),
        other => Err(format!("cannot convert {} to integer", other.type_name())),
    }
}

/// Apply `declared_name` to `column` in every row.
pub fn coerce_column(
    table: &str,
    column: &str,
    declared_name: &str,
    rows: &mut [RowMap],
) -> Result<(), GenerationError> {
    let error = |message: String| GenerationError::Coercion {
        table: table.to_string(),
        column: column.to_string(),
        declared: declared_name.to_string(),
        message,
    };
    let declared = DeclaredType::parse(declared_name)
        .ok_or_else(|| error("unknown type".to_string()))?;
    for row in rows.iter_mut() {
        if let Some(slot) = row.get_mut(column) {
            let value = std::mem::replace(slot, GeneratedValue::Null);
            *slot = coerce_value(value, declared).map_err(error)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const INT8: DeclaredType = DeclaredType::Integer {
        bits: 8,
        signed: true,
    };

    #[test]
    fn integers_truncate_and_check_width() {
        assert_eq!(
            coerce_value(GeneratedValue::Float(-3.7), INT8).unwrap(),
            GeneratedValue::Int(-3)
        );
        assert_eq!(coerce_value(" 42 ".into(), INT8).unwrap(), GeneratedValue::Int(42));
        assert!(coerce_value(GeneratedValue::Int(300), INT8).is_err());
        assert!(coerce_value("forty".into(), INT8).is_err());
    }

    #[test]
    fn null_is_preserved() {
        for declared in [INT8, DeclaredType::Text, DeclaredType::Boolean, DeclaredType::Date] {
            assert_eq!(
                coerce_value(GeneratedValue::Null, declared).unwrap(),
                GeneratedValue::Null
            );
        }
    }

    #[test]
    fn text_and_temporal_conversions() {
        assert_eq!(
            coerce_value(GeneratedValue::Float(1.5), DeclaredType::Text).unwrap(),
            "1.5".into()
        );
        assert_eq!(
            coerce_value("2024-03-01".into(), DeclaredType::Timestamp).unwrap(),
            GeneratedValue::Timestamp(
                NaiveDate::from_ymd_opt(2024, 3, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
            )
        );
        assert_eq!(
            coerce_value("".into(), DeclaredType::Boolean).unwrap(),
            GeneratedValue::Bool(false)
        );
    }

    #[test]
    fn column_errors_name_the_column() {
        let mut rows = vec![RowMap::from([("age".to_string(), "old".into())])];
        let err = coerce_column("people", "age", "int", &mut rows).unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Coercion { ref column, .. } if column == "age"
        ));
    }
}
