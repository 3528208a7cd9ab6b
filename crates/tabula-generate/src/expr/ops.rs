//! Operator semantics over [`GeneratedValue`]: arithmetic with int/float
//! promotion, date arithmetic, comparisons, membership, indexing.

use std::cmp::Ordering;

use chrono::TimeDelta;

use super::ExprError;
use super::format::percent_format;
use super::parser::{BinaryOp, CompareOp, UnaryOp};
use crate::value::GeneratedValue;

const SECONDS_PER_DAY: i64 = 86_400;

enum Numbers {
    Int(i64, i64),
    Float(f64, f64),
}

fn numbers(left: &GeneratedValue, right: &GeneratedValue) -> Option<Numbers> {
    match (left, right) {
        (GeneratedValue::Float(_), _) | (_, GeneratedValue::Float(_)) => {
            Some(Numbers::Float(left.as_f64()?, right.as_f64()?))
        }
        _ => Some(Numbers::Int(left.as_i64()?, right.as_i64()?)),
    }
}

fn symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::FloorDiv => "//",
        BinaryOp::Mod => "%",
        BinaryOp::Pow => "**",
    }
}

fn unsupported(op: BinaryOp, left: &GeneratedValue, right: &GeneratedValue) -> ExprError {
    ExprError::runtime(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        symbol(op),
        left.type_name(),
        right.type_name()
    ))
}

fn overflow() -> ExprError {
    ExprError::runtime("integer overflow")
}

fn zero_division() -> ExprError {
    ExprError::runtime("division by zero")
}

fn scale(delta: TimeDelta, factor: f64) -> Result<TimeDelta, ExprError> {
    let micros = delta
        .num_microseconds()
        .ok_or_else(|| ExprError::runtime("timedelta too large"))?;
    let scaled = (micros as f64 * factor).round();
    if !scaled.is_finite() || scaled.abs() > i64::MAX as f64 {
        return Err(ExprError::runtime("timedelta too large"));
    }
    Ok(TimeDelta::microseconds(scaled as i64))
}

fn whole_days(delta: TimeDelta) -> TimeDelta {
    TimeDelta::days(delta.num_seconds().div_euclid(SECONDS_PER_DAY))
}

fn floor_div(left: i64, right: i64) -> Result<i64, ExprError> {
    if right == 0 {
        return Err(ExprError::runtime("integer division or modulo by zero"));
    }
    let quotient = left.checked_div(right).ok_or_else(overflow)?;
    if left % right != 0 && ((left < 0) != (right < 0)) {
        Ok(quotient - 1)
    } else {
        Ok(quotient)
    }
}

fn modulo(left: i64, right: i64) -> Result<i64, ExprError> {
    if right == 0 {
        return Err(ExprError::runtime("integer division or modulo by zero"));
    }
    let remainder = left.checked_rem(right).ok_or_else(overflow)?;
    if remainder != 0 && ((remainder < 0) != (right < 0)) {
        Ok(remainder + right)
    } else {
        Ok(remainder)
    }
}

fn repeat<T: Clone>(items: &[T], times: i64) -> Result<Vec<T>, ExprError> {
    let times = usize::try_from(times.max(0)).map_err(|_| overflow())?;
    if items.len().saturating_mul(times) > 10_000_000 {
        return Err(ExprError::runtime("repeated sequence is too large"));
    }
    Ok(items.iter().cloned().cycle().take(items.len() * times).collect())
}

pub fn binary(op: BinaryOp, left: &GeneratedValue, right: &GeneratedValue) -> Result<GeneratedValue, ExprError> {
    use GeneratedValue as V;

    if let Some(numbers) = numbers(left, right) {
        return numeric(op, numbers);
    }

    match (op, left, right) {
        (BinaryOp::Add, V::Text(a), V::Text(b)) => Ok(V::Text(format!("{a}{b}"))),
        (BinaryOp::Add, V::List(a), V::List(b)) => {
            Ok(V::List(a.iter().chain(b.iter()).cloned().collect()))
        }
        (BinaryOp::Add, V::Date(date), V::Duration(delta))
        | (BinaryOp::Add, V::Duration(delta), V::Date(date)) => date
            .checked_add_signed(whole_days(*delta))
            .map(V::Date)
            .ok_or_else(|| ExprError::runtime("date value out of range")),
        (BinaryOp::Add, V::Timestamp(moment), V::Duration(delta))
        | (BinaryOp::Add, V::Duration(delta), V::Timestamp(moment)) => moment
            .checked_add_signed(*delta)
            .map(V::Timestamp)
            .ok_or_else(|| ExprError::runtime("date value out of range")),
        (BinaryOp::Add, V::Duration(a), V::Duration(b)) => a
            .checked_add(b)
            .map(V::Duration)
            .ok_or_else(|| ExprError::runtime("timedelta too large")),

        (BinaryOp::Sub, V::Date(a), V::Date(b)) => {
            Ok(V::Duration(TimeDelta::days(a.signed_duration_since(*b).num_days())))
        }
        (BinaryOp::Sub, V::Timestamp(a), V::Timestamp(b)) => {
            Ok(V::Duration(a.signed_duration_since(*b)))
        }
        (BinaryOp::Sub, V::Date(date), V::Duration(delta)) => date
            .checked_sub_signed(whole_days(*delta))
            .map(V::Date)
            .ok_or_else(|| ExprError::runtime("date value out of range")),
        (BinaryOp::Sub, V::Timestamp(moment), V::Duration(delta)) => moment
            .checked_sub_signed(*delta)
            .map(V::Timestamp)
            .ok_or_else(|| ExprError::runtime("date value out of range")),
        (BinaryOp::Sub, V::Duration(a), V::Duration(b)) => a
            .checked_sub(b)
            .map(V::Duration)
            .ok_or_else(|| ExprError::runtime("timedelta too large")),

        (BinaryOp::Mul, V::Text(text), count) | (BinaryOp::Mul, count, V::Text(text))
            if count.as_i64().is_some() =>
        {
            let chars: Vec<char> = text.chars().collect();
            Ok(V::Text(repeat(&chars, count.as_i64().unwrap_or_default())?.into_iter().collect()))
        }
        (BinaryOp::Mul, V::List(items), count) | (BinaryOp::Mul, count, V::List(items))
            if count.as_i64().is_some() =>
        {
            Ok(V::List(repeat(items, count.as_i64().unwrap_or_default())?))
        }
        (BinaryOp::Mul, V::Duration(delta), factor) | (BinaryOp::Mul, factor, V::Duration(delta))
            if factor.as_f64().is_some() =>
        {
            Ok(V::Duration(scale(*delta, factor.as_f64().unwrap_or_default())?))
        }

        (BinaryOp::Div, V::Duration(delta), divisor) if divisor.as_f64().is_some() => {
            let divisor = divisor.as_f64().unwrap_or_default();
            if divisor == 0.0 {
                return Err(zero_division());
            }
            Ok(V::Duration(scale(*delta, 1.0 / divisor)?))
        }
        (BinaryOp::Div, V::Duration(a), V::Duration(b)) => {
            let divisor = b.num_microseconds().unwrap_or(i64::MAX) as f64;
            if divisor == 0.0 {
                return Err(zero_division());
            }
            Ok(V::Float(a.num_microseconds().unwrap_or(i64::MAX) as f64 / divisor))
        }
        (BinaryOp::FloorDiv, V::Duration(a), V::Duration(b)) => {
            let left = a.num_microseconds().ok_or_else(overflow)?;
            let right = b.num_microseconds().ok_or_else(overflow)?;
            Ok(V::Int(floor_div(left, right)?))
        }

        (BinaryOp::Mod, V::Text(template), args) => Ok(V::Text(percent_format(template, args)?)),

        _ => Err(unsupported(op, left, right)),
    }
}

fn numeric(op: BinaryOp, numbers: Numbers) -> Result<GeneratedValue, ExprError> {
    use GeneratedValue as V;

    match numbers {
        Numbers::Int(a, b) => match op {
            BinaryOp::Add => a.checked_add(b).map(V::Int).ok_or_else(overflow),
            BinaryOp::Sub => a.checked_sub(b).map(V::Int).ok_or_else(overflow),
            BinaryOp::Mul => a.checked_mul(b).map(V::Int).ok_or_else(overflow),
            BinaryOp::Div => {
                if b == 0 {
                    Err(zero_division())
                } else {
                    Ok(V::Float(a as f64 / b as f64))
                }
            }
            BinaryOp::FloorDiv => floor_div(a, b).map(V::Int),
            BinaryOp::Mod => modulo(a, b).map(V::Int),
            BinaryOp::Pow => {
                if b >= 0 {
                    let exponent = u32::try_from(b).map_err(|_| overflow())?;
                    a.checked_pow(exponent).map(V::Int).ok_or_else(overflow)
                } else if a == 0 {
                    Err(ExprError::runtime("0.0 cannot be raised to a negative power"))
                } else {
                    Ok(V::Float((a as f64).powf(b as f64)))
                }
            }
        },
        Numbers::Float(a, b) => match op {
            BinaryOp::Add => Ok(V::Float(a + b)),
            BinaryOp::Sub => Ok(V::Float(a - b)),
            BinaryOp::Mul => Ok(V::Float(a * b)),
            BinaryOp::Div => {
                if b == 0.0 {
                    Err(zero_division())
                } else {
                    Ok(V::Float(a / b))
                }
            }
            BinaryOp::FloorDiv => {
                if b == 0.0 {
                    Err(ExprError::runtime("float floor division by zero"))
                } else {
                    Ok(V::Float((a / b).floor()))
                }
            }
            BinaryOp::Mod => {
                if b == 0.0 {
                    Err(ExprError::runtime("float modulo"))
                } else {
                    Ok(V::Float(a - b * (a / b).floor()))
                }
            }
            BinaryOp::Pow => {
                if a == 0.0 && b < 0.0 {
                    Err(ExprError::runtime("0.0 cannot be raised to a negative power"))
                } else {
                    Ok(V::Float(a.powf(b)))
                }
            }
        },
    }
}

pub fn unary(op: UnaryOp, operand: &GeneratedValue) -> Result<GeneratedValue, ExprError> {
    use GeneratedValue as V;

    match (op, operand) {
        (UnaryOp::Neg, V::Int(value)) => value.checked_neg().map(V::Int).ok_or_else(overflow),
        (UnaryOp::Neg, V::Bool(value)) => Ok(V::Int(-i64::from(*value))),
        (UnaryOp::Neg, V::Float(value)) => Ok(V::Float(-value)),
        (UnaryOp::Neg, V::Duration(value)) => Ok(V::Duration(-*value)),
        (UnaryOp::Pos, V::Bool(value)) => Ok(V::Int(i64::from(*value))),
        (UnaryOp::Pos, V::Int(_) | V::Float(_) | V::Duration(_)) => Ok(operand.clone()),
        (op, other) => Err(ExprError::runtime(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            other.type_name()
        ))),
    }
}

/// Equality with int/float/bool promotion and text/uuid equivalence.
pub fn equals(left: &GeneratedValue, right: &GeneratedValue) -> bool {
    use GeneratedValue as V;

    match (left, right) {
        (V::Int(a), V::Int(b)) => a == b,
        (V::Text(a) | V::Uuid(a), V::Text(b) | V::Uuid(b)) => a == b,
        (V::List(a), V::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| equals(x, y))
        }
        (V::Dict(a), V::Dict(b)) => {
            a.len() == b.len()
                && a.iter().all(|(key, value)| {
                    b.iter()
                        .any(|(other_key, other_value)| equals(key, other_key) && equals(value, other_value))
                })
        }
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => left == right,
        },
    }
}

/// Ordering for `<`-style comparisons, `sorted`, `min` and `max`.
/// `Ok(None)` when the values are unordered (NaN).
pub fn ordering(left: &GeneratedValue, right: &GeneratedValue) -> Result<Option<Ordering>, ExprError> {
    use GeneratedValue as V;

    let ordered = match (left, right) {
        (V::Int(a), V::Int(b)) => Some(a.cmp(b)),
        (V::Text(a) | V::Uuid(a), V::Text(b) | V::Uuid(b)) => Some(a.cmp(b)),
        (V::Date(a), V::Date(b)) => Some(a.cmp(b)),
        (V::Timestamp(a), V::Timestamp(b)) => Some(a.cmp(b)),
        (V::Time(a), V::Time(b)) => Some(a.cmp(b)),
        (V::Duration(a), V::Duration(b)) => Some(a.cmp(b)),
        (V::List(a), V::List(b)) => {
            for (x, y) in a.iter().zip(b) {
                if !equals(x, y) {
                    return ordering(x, y);
                }
            }
            Some(a.len().cmp(&b.len()))
        }
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => {
                return Err(ExprError::runtime(format!(
                    "'<' not supported between instances of '{}' and '{}'",
                    left.type_name(),
                    right.type_name()
                )));
            }
        },
    };
    Ok(ordered)
}

pub fn contains(container: &GeneratedValue, item: &GeneratedValue) -> Result<bool, ExprError> {
    use GeneratedValue as V;

    match container {
        V::Text(text) | V::Uuid(text) => match item {
            V::Text(needle) | V::Uuid(needle) => Ok(text.contains(needle.as_str())),
            other => Err(ExprError::runtime(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        V::List(items) => Ok(items.iter().any(|candidate| equals(candidate, item))),
        V::Dict(entries) => Ok(entries.iter().any(|(key, _)| equals(key, item))),
        other => Err(ExprError::runtime(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

pub fn compare(op: CompareOp, left: &GeneratedValue, right: &GeneratedValue) -> Result<bool, ExprError> {
    Ok(match op {
        CompareOp::Eq => equals(left, right),
        CompareOp::NotEq => !equals(left, right),
        CompareOp::Lt => ordering(left, right)? == Some(Ordering::Less),
        CompareOp::LtE => matches!(ordering(left, right)?, Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => ordering(left, right)? == Some(Ordering::Greater),
        CompareOp::GtE => matches!(
            ordering(left, right)?,
            Some(Ordering::Greater | Ordering::Equal)
        ),
        CompareOp::In => contains(right, left)?,
        CompareOp::NotIn => !contains(right, left)?,
        CompareOp::Is => identical(left, right),
        CompareOp::IsNot => !identical(left, right),
    })
}

fn identical(left: &GeneratedValue, right: &GeneratedValue) -> bool {
    left.type_name() == right.type_name() && equals(left, right)
}

/// Items produced by iterating a value: list items, characters, dict keys.
pub fn iterate(value: &GeneratedValue) -> Result<Vec<GeneratedValue>, ExprError> {
    match value {
        GeneratedValue::List(items) => Ok(items.clone()),
        GeneratedValue::Text(text) => Ok(text
            .chars()
            .map(|ch| GeneratedValue::Text(ch.to_string()))
            .collect()),
        GeneratedValue::Dict(entries) => Ok(entries.iter().map(|(key, _)| key.clone()).collect()),
        other => Err(ExprError::runtime(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

fn position(index: i64, len: usize, kind: &str) -> Result<usize, ExprError> {
    let len = len as i64;
    let resolved = if index < 0 { index + len } else { index };
    if (0..len).contains(&resolved) {
        Ok(resolved as usize)
    } else {
        Err(ExprError::runtime(format!("{kind} index out of range")))
    }
}

pub fn index(container: &GeneratedValue, key: &GeneratedValue) -> Result<GeneratedValue, ExprError> {
    use GeneratedValue as V;

    match container {
        V::List(items) => {
            let index = key.as_i64().ok_or_else(|| {
                ExprError::runtime(format!(
                    "list indices must be integers, not {}",
                    key.type_name()
                ))
            })?;
            Ok(items[position(index, items.len(), "list")?].clone())
        }
        V::Text(text) | V::Uuid(text) => {
            let index = key.as_i64().ok_or_else(|| {
                ExprError::runtime(format!(
                    "string indices must be integers, not {}",
                    key.type_name()
                ))
            })?;
            let chars: Vec<char> = text.chars().collect();
            Ok(V::Text(chars[position(index, chars.len(), "string")?].to_string()))
        }
        V::Dict(entries) => entries
            .iter()
            .find(|(candidate, _)| equals(candidate, key))
            .map(|(_, value)| value.clone())
            .ok_or_else(|| ExprError::runtime(format!("KeyError: {}", key.repr()))),
        other => Err(ExprError::runtime(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn bound(value: Option<&GeneratedValue>, len: usize, default: usize) -> Result<usize, ExprError> {
    let Some(value) = value.filter(|value| !value.is_null()) else {
        return Ok(default);
    };
    let index = value.as_i64().ok_or_else(|| {
        ExprError::runtime("slice indices must be integers or None")
    })?;
    let len = len as i64;
    let resolved = if index < 0 { (index + len).max(0) } else { index.min(len) };
    Ok(resolved as usize)
}

pub fn slice(
    container: &GeneratedValue,
    start: Option<&GeneratedValue>,
    stop: Option<&GeneratedValue>,
) -> Result<GeneratedValue, ExprError> {
    match container {
        GeneratedValue::List(items) => {
            let from = bound(start, items.len(), 0)?;
            let to = bound(stop, items.len(), items.len())?;
            Ok(GeneratedValue::List(
                items.get(from..to.max(from)).unwrap_or_default().to_vec(),
            ))
        }
        GeneratedValue::Text(text) | GeneratedValue::Uuid(text) => {
            let chars: Vec<char> = text.chars().collect();
            let from = bound(start, chars.len(), 0)?;
            let to = bound(stop, chars.len(), chars.len())?;
            Ok(GeneratedValue::Text(
                chars.get(from..to.max(from)).unwrap_or_default().iter().collect(),
            ))
        }
        other => Err(ExprError::runtime(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn integer_division_floors_like_python() {
        assert_eq!(
            binary(BinaryOp::FloorDiv, &GeneratedValue::Int(-7), &GeneratedValue::Int(2)).unwrap(),
            GeneratedValue::Int(-4)
        );
        assert_eq!(
            binary(BinaryOp::Mod, &GeneratedValue::Int(-7), &GeneratedValue::Int(3)).unwrap(),
            GeneratedValue::Int(2)
        );
        assert_eq!(
            binary(BinaryOp::Div, &GeneratedValue::Int(7), &GeneratedValue::Int(2)).unwrap(),
            GeneratedValue::Float(3.5)
        );
        assert!(binary(BinaryOp::Div, &GeneratedValue::Int(1), &GeneratedValue::Int(0)).is_err());
    }

    #[test]
    fn dates_shift_by_whole_days() {
        let date = GeneratedValue::Date(NaiveDate::from_ymd_opt(2024, 2, 28).unwrap());
        let shifted = binary(
            BinaryOp::Add,
            &date,
            &GeneratedValue::Duration(TimeDelta::hours(36)),
        )
        .unwrap();
        assert_eq!(
            shifted,
            GeneratedValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
    }

    #[test]
    fn mixed_types_do_not_add() {
        let err = binary(BinaryOp::Add, &"a".into(), &GeneratedValue::Int(1)).unwrap_err();
        assert_eq!(
            err,
            ExprError::runtime("unsupported operand type(s) for +: 'str' and 'int'")
        );
    }

    #[test]
    fn comparisons_promote_numbers() {
        assert!(compare(CompareOp::Eq, &GeneratedValue::Int(1), &GeneratedValue::Float(1.0)).unwrap());
        assert!(compare(CompareOp::Lt, &GeneratedValue::Bool(false), &GeneratedValue::Int(1)).unwrap());
        assert!(compare(CompareOp::Lt, &"a".into(), &GeneratedValue::Int(1)).is_err());
        let list = GeneratedValue::List(vec![GeneratedValue::Int(1), GeneratedValue::Int(2)]);
        assert!(compare(CompareOp::In, &GeneratedValue::Float(2.0), &list).unwrap());
    }

    #[test]
    fn negative_indices_and_slices() {
        let list = GeneratedValue::List(vec![
            GeneratedValue::Int(1),
            GeneratedValue::Int(2),
            GeneratedValue::Int(3),
        ]);
        assert_eq!(index(&list, &GeneratedValue::Int(-1)).unwrap(), GeneratedValue::Int(3));
        assert!(index(&list, &GeneratedValue::Int(3)).is_err());
        assert_eq!(
            slice(&"abcdef".into(), Some(&GeneratedValue::Int(1)), Some(&GeneratedValue::Int(-2)))
                .unwrap(),
            GeneratedValue::Text("bcd".to_string())
        );
    }
}
