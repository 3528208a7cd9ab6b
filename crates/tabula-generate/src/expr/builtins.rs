//! Built-in callables and the `random`, `math`, `date`, `datetime` and
//! `string` namespaces, plus methods on values.

use std::cmp::Ordering;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use rand::{Rng, RngCore};

use super::ExprError;
use super::format::{str_format, strftime};
use super::ops;
use super::parser::BinaryOp;
use crate::functions::{CallArgs, expect_float, expect_int};
use crate::value::GeneratedValue;

/// Upper bound on the length of a `range(...)` materialized as a list.
const MAX_RANGE_LEN: i64 = 10_000_000;

const ASCII_LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const ASCII_UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const PUNCTUATION: &str = r##"!"#$%&'()*+,-./:;<=>?@[\]^_`{|}~"##;
const WHITESPACE: &str = " \t\n\r\x0b\x0c";

/// Namespaces always visible to expressions unless shadowed by a column or local.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Random,
    Math,
    Date,
    Datetime,
    Strings,
}

impl Namespace {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "random" => Some(Self::Random),
            "math" => Some(Self::Math),
            "date" => Some(Self::Date),
            "datetime" => Some(Self::Datetime),
            "string" => Some(Self::Strings),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Random => "module 'random'",
            Self::Math => "module 'math'",
            Self::Date => "type object 'datetime.date'",
            Self::Datetime => "type object 'datetime.datetime'",
            Self::Strings => "module 'string'",
        }
    }

    fn missing(self, attr: &str) -> ExprError {
        ExprError::unknown_attribute(format!("{} has no attribute '{attr}'", self.label()))
    }

    /// Non-callable attribute such as `math.pi` or `string.digits`.
    pub fn constant(self, attr: &str) -> Result<GeneratedValue, ExprError> {
        let value = match (self, attr) {
            (Self::Math, "pi") => GeneratedValue::Float(std::f64::consts::PI),
            (Self::Math, "e") => GeneratedValue::Float(std::f64::consts::E),
            (Self::Math, "tau") => GeneratedValue::Float(std::f64::consts::TAU),
            (Self::Math, "inf") => GeneratedValue::Float(f64::INFINITY),
            (Self::Math, "nan") => GeneratedValue::Float(f64::NAN),
            (Self::Strings, "ascii_lowercase") => ASCII_LOWERCASE.into(),
            (Self::Strings, "ascii_uppercase") => ASCII_UPPERCASE.into(),
            (Self::Strings, "ascii_letters") => {
                GeneratedValue::Text(format!("{ASCII_LOWERCASE}{ASCII_UPPERCASE}"))
            }
            (Self::Strings, "digits") => DIGITS.into(),
            (Self::Strings, "hexdigits") => "0123456789abcdefABCDEF".into(),
            (Self::Strings, "octdigits") => "01234567".into(),
            (Self::Strings, "punctuation") => PUNCTUATION.into(),
            (Self::Strings, "whitespace") => WHITESPACE.into(),
            (Self::Strings, "printable") => GeneratedValue::Text(format!(
                "{DIGITS}{ASCII_LOWERCASE}{ASCII_UPPERCASE}{PUNCTUATION}{WHITESPACE}"
            )),
            (Self::Date, "min") => GeneratedValue::Date(NaiveDate::MIN),
            (Self::Date, "max") => GeneratedValue::Date(NaiveDate::MAX),
            _ => return Err(self.missing(attr)),
        };
        Ok(value)
    }

    pub fn call(
        self,
        attr: &str,
        args: &CallArgs,
        clock: NaiveDateTime,
        rng: &mut dyn RngCore,
    ) -> Result<GeneratedValue, ExprError> {
        match self {
            Self::Random => call_random(attr, args, rng).unwrap_or_else(|| Err(self.missing(attr))),
            Self::Math => call_math(attr, args).unwrap_or_else(|| Err(self.missing(attr))),
            Self::Date => match attr {
                "today" => Ok(GeneratedValue::Date(clock.date())),
                "fromisoformat" => {
                    let text = text_arg(args, 0, "date_string", "fromisoformat")?;
                    NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                        .map(GeneratedValue::Date)
                        .map_err(|_| invalid_isoformat(&text))
                }
                _ => Err(self.missing(attr)),
            },
            Self::Datetime => match attr {
                "now" | "today" | "utcnow" => Ok(GeneratedValue::Timestamp(clock)),
                "fromisoformat" => {
                    let text = text_arg(args, 0, "date_string", "fromisoformat")?;
                    parse_iso_datetime(&text)
                        .map(GeneratedValue::Timestamp)
                        .ok_or_else(|| invalid_isoformat(&text))
                }
                "strptime" => {
                    let text = text_arg(args, 0, "date_string", "strptime")?;
                    let pattern = text_arg(args, 1, "format", "strptime")?;
                    strptime(&text, &pattern).map(GeneratedValue::Timestamp)
                }
                "combine" => {
                    let date = args.required(0, "date", "combine")?;
                    let time = args.required(1, "time", "combine")?;
                    match (date, time) {
                        (GeneratedValue::Date(date), GeneratedValue::Time(time)) => {
                            Ok(GeneratedValue::Timestamp(date.and_time(*time)))
                        }
                        _ => Err(ExprError::runtime("combine() expects a date and a time")),
                    }
                }
                _ => Err(self.missing(attr)),
            },
            Self::Strings => match attr {
                "capwords" => {
                    let text = text_arg(args, 0, "s", "capwords")?;
                    Ok(GeneratedValue::Text(
                        text.split_whitespace()
                            .map(capitalize)
                            .collect::<Vec<_>>()
                            .join(" "),
                    ))
                }
                _ => Err(self.missing(attr)),
            },
        }
    }
}

fn invalid_isoformat(text: &str) -> ExprError {
    ExprError::runtime(format!("Invalid isoformat string: '{text}'"))
}

fn parse_iso_datetime(text: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|pattern| NaiveDateTime::parse_from_str(text, pattern).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
}

fn strptime(text: &str, pattern: &str) -> Result<NaiveDateTime, ExprError> {
    let pattern = pattern.replace("%f", "%6f");
    NaiveDateTime::parse_from_str(text, &pattern)
        .or_else(|_| {
            NaiveDate::parse_from_str(text, &pattern).map(|date| date.and_time(NaiveTime::MIN))
        })
        .map_err(|_| {
            ExprError::runtime(format!(
                "time data '{text}' does not match format '{pattern}'"
            ))
        })
}

fn text_arg(args: &CallArgs, index: usize, name: &str, function: &str) -> Result<String, ExprError> {
    args.text(index, name)?.ok_or_else(|| {
        ExprError::runtime(format!("{function}() missing required argument: '{name}'"))
    })
}

fn int_arg(args: &CallArgs, index: usize, name: &str, function: &str) -> Result<i64, ExprError> {
    expect_int(args.required(index, name, function)?, name)
}

fn float_arg(args: &CallArgs, index: usize, name: &str, function: &str) -> Result<f64, ExprError> {
    expect_float(args.required(index, name, function)?, name)
}

/// Builtin function by name; `None` when no builtin has that name.
pub fn call_builtin(name: &str, args: &CallArgs) -> Option<Result<GeneratedValue, ExprError>> {
    let result = match name {
        "str" => Ok(GeneratedValue::Text(
            args.positional.first().map(ToString::to_string).unwrap_or_default(),
        )),
        "int" => to_int(args),
        "float" => to_float(args),
        "bool" => Ok(GeneratedValue::Bool(
            args.positional.first().is_some_and(GeneratedValue::truthy),
        )),
        "round" => round(args),
        "abs" => absolute(args),
        "min" => extreme(args, "min", Ordering::Less),
        "max" => extreme(args, "max", Ordering::Greater),
        "len" => length(args),
        "sum" => sum(args),
        "range" => range(args),
        "list" | "tuple" => match args.positional.first() {
            Some(value) => ops::iterate(value).map(GeneratedValue::List),
            None => Ok(GeneratedValue::List(Vec::new())),
        },
        "set" => match args.positional.first() {
            Some(value) => ops::iterate(value).map(|items| GeneratedValue::List(distinct(items))),
            None => Ok(GeneratedValue::List(Vec::new())),
        },
        "dict" => Ok(GeneratedValue::Dict(
            args.keyword
                .iter()
                .map(|(key, value)| (GeneratedValue::Text(key.clone()), value.clone()))
                .collect(),
        )),
        "sorted" => sorted(args),
        "reversed" => args
            .required(0, "sequence", "reversed")
            .and_then(ops::iterate)
            .map(|items| GeneratedValue::List(items.into_iter().rev().collect())),
        "any" => args
            .required(0, "iterable", "any")
            .and_then(ops::iterate)
            .map(|items| GeneratedValue::Bool(items.iter().any(GeneratedValue::truthy))),
        "all" => args
            .required(0, "iterable", "all")
            .and_then(ops::iterate)
            .map(|items| GeneratedValue::Bool(items.iter().all(GeneratedValue::truthy))),
        "chr" => int_arg(args, 0, "i", "chr").and_then(|code| {
            u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .map(|ch| GeneratedValue::Text(ch.to_string()))
                .ok_or_else(|| ExprError::runtime("chr() arg not in range(0x110000)"))
        }),
        "ord" => text_arg(args, 0, "c", "ord").and_then(|text| {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) => Ok(GeneratedValue::Int(i64::from(u32::from(ch)))),
                _ => Err(ExprError::runtime(format!(
                    "ord() expected a character, but string of length {} found",
                    text.chars().count()
                ))),
            }
        }),
        "pow" => args.required(0, "base", "pow").and_then(|base| {
            ops::binary(BinaryOp::Pow, base, args.required(1, "exp", "pow")?)
        }),
        "date" => make_date(args),
        "datetime" => make_datetime(args),
        "time" => make_time(args),
        "timedelta" => make_timedelta(args),
        _ => return None,
    };
    Some(result)
}

fn to_int(args: &CallArgs) -> Result<GeneratedValue, ExprError> {
    let Some(value) = args.positional.first() else {
        return Ok(GeneratedValue::Int(0));
    };
    match value {
        GeneratedValue::Int(_) => Ok(value.clone()),
        GeneratedValue::Bool(flag) => Ok(GeneratedValue::Int(i64::from(*flag))),
        GeneratedValue::Float(number) => float_to_int(number.trunc()),
        GeneratedValue::Text(text) => {
            let base = args.int(1, "base", 10)?;
            let radix = u32::try_from(base)
                .ok()
                .filter(|radix| (2..=36).contains(radix))
                .ok_or_else(|| ExprError::runtime("int() base must be >= 2 and <= 36"))?;
            let cleaned = text.trim().replace('_', "");
            i64::from_str_radix(&cleaned, radix)
                .map(GeneratedValue::Int)
                .map_err(|_| {
                    ExprError::runtime(format!(
                        "invalid literal for int() with base {base}: {}",
                        value.repr()
                    ))
                })
        }
        other => Err(ExprError::runtime(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn float_to_int(number: f64) -> Result<GeneratedValue, ExprError> {
    if number.is_nan() {
        return Err(ExprError::runtime("cannot convert float NaN to integer"));
    }
    if !number.is_finite() || number.abs() >= 9.2e18 {
        return Err(ExprError::runtime("cannot convert float infinity to integer"));
    }
    Ok(GeneratedValue::Int(number as i64))
}

fn to_float(args: &CallArgs) -> Result<GeneratedValue, ExprError> {
    let Some(value) = args.positional.first() else {
        return Ok(GeneratedValue::Float(0.0));
    };
    match value {
        GeneratedValue::Text(text) => text
            .trim()
            .replace('_', "")
            .parse::<f64>()
            .map(GeneratedValue::Float)
            .map_err(|_| {
                ExprError::runtime(format!(
                    "could not convert string to float: {}",
                    value.repr()
                ))
            }),
        other => other.as_f64().map(GeneratedValue::Float).ok_or_else(|| {
            ExprError::runtime(format!(
                "float() argument must be a string or a real number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

/// Round half to even, like Python's `round`.
pub fn round_half_even(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    let scaled = value * factor;
    if !scaled.is_finite() {
        return value;
    }
    let floor = scaled.floor();
    let diff = scaled - floor;
    let rounded = if (diff - 0.5).abs() < 1e-9 {
        if floor % 2.0 == 0.0 { floor } else { floor + 1.0 }
    } else {
        scaled.round()
    };
    rounded / factor
}

fn round(args: &CallArgs) -> Result<GeneratedValue, ExprError> {
    let value = args.required(0, "number", "round")?;
    let digits = args.present(1, "ndigits");
    match (value, digits) {
        (GeneratedValue::Int(_) | GeneratedValue::Bool(_), None) => {
            Ok(GeneratedValue::Int(value.as_i64().unwrap_or_default()))
        }
        (GeneratedValue::Int(number), Some(digits)) => {
            let digits = expect_int(digits, "ndigits")?;
            if digits >= 0 {
                return Ok(GeneratedValue::Int(*number));
            }
            let rounded = round_half_even(*number as f64, i32::try_from(digits).unwrap_or(i32::MIN));
            float_to_int(rounded)
        }
        (GeneratedValue::Float(number), None) => float_to_int(round_half_even(*number, 0)),
        (GeneratedValue::Float(number), Some(digits)) => {
            let digits = i32::try_from(expect_int(digits, "ndigits")?)
                .map_err(|_| ExprError::runtime("ndigits out of range"))?;
            Ok(GeneratedValue::Float(round_half_even(*number, digits)))
        }
        (other, _) => Err(ExprError::runtime(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))),
    }
}

fn absolute(args: &CallArgs) -> Result<GeneratedValue, ExprError> {
    match args.required(0, "x", "abs")? {
        GeneratedValue::Int(number) => number
            .checked_abs()
            .map(GeneratedValue::Int)
            .ok_or_else(|| ExprError::runtime("integer overflow")),
        GeneratedValue::Bool(flag) => Ok(GeneratedValue::Int(i64::from(*flag))),
        GeneratedValue::Float(number) => Ok(GeneratedValue::Float(number.abs())),
        GeneratedValue::Duration(delta) => Ok(GeneratedValue::Duration(delta.abs())),
        other => Err(ExprError::runtime(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

fn candidates(args: &CallArgs, function: &str) -> Result<Vec<GeneratedValue>, ExprError> {
    match args.positional.as_slice() {
        [] => Err(ExprError::runtime(format!(
            "{function} expected at least 1 argument, got 0"
        ))),
        [single] => ops::iterate(single),
        many => Ok(many.to_vec()),
    }
}

fn extreme(args: &CallArgs, function: &str, wanted: Ordering) -> Result<GeneratedValue, ExprError> {
    let items = candidates(args, function)?;
    let mut items = items.into_iter();
    let Some(mut best) = items.next() else {
        return match args.get(usize::MAX, "default") {
            Some(default) => Ok(default.clone()),
            None => Err(ExprError::runtime(format!(
                "{function}() arg is an empty sequence"
            ))),
        };
    };
    for item in items {
        if ops::ordering(&item, &best)? == Some(wanted) {
            best = item;
        }
    }
    Ok(best)
}

fn length(args: &CallArgs) -> Result<GeneratedValue, ExprError> {
    let len = match args.required(0, "obj", "len")? {
        GeneratedValue::Text(text) | GeneratedValue::Uuid(text) => text.chars().count(),
        GeneratedValue::List(items) => items.len(),
        GeneratedValue::Dict(entries) => entries.len(),
        other => {
            return Err(ExprError::runtime(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )));
        }
    };
    Ok(GeneratedValue::Int(len as i64))
}

fn sum(args: &CallArgs) -> Result<GeneratedValue, ExprError> {
    let items = ops::iterate(args.required(0, "iterable", "sum")?)?;
    let start = args.get(1, "start").cloned().unwrap_or(GeneratedValue::Int(0));
    items
        .iter()
        .try_fold(start, |total, item| ops::binary(BinaryOp::Add, &total, item))
}

fn range(args: &CallArgs) -> Result<GeneratedValue, ExprError> {
    let (start, stop, step) = match args.positional.as_slice() {
        [stop] => (0, expect_int(stop, "stop")?, 1),
        [start, stop] => (expect_int(start, "start")?, expect_int(stop, "stop")?, 1),
        [start, stop, step] => (
            expect_int(start, "start")?,
            expect_int(stop, "stop")?,
            expect_int(step, "step")?,
        ),
        other => {
            return Err(ExprError::runtime(format!(
                "range expected 1 to 3 arguments, got {}",
                other.len()
            )));
        }
    };
    if step == 0 {
        return Err(ExprError::runtime("range() arg 3 must not be zero"));
    }
    let span = if step > 0 { stop.saturating_sub(start) } else { start.saturating_sub(stop) };
    let count = if span <= 0 { 0 } else { (span - 1) / step.saturating_abs() + 1 };
    if count > MAX_RANGE_LEN {
        return Err(ExprError::runtime("range() is too large to materialize"));
    }
    Ok(GeneratedValue::List(
        (0..count)
            .map(|offset| GeneratedValue::Int(start + offset * step))
            .collect(),
    ))
}

fn sort_values(items: &mut [GeneratedValue]) -> Result<(), ExprError> {
    let mut failure = None;
    items.sort_by(|left, right| match ops::ordering(left, right) {
        Ok(ordering) => ordering.unwrap_or(Ordering::Equal),
        Err(err) => {
            failure.get_or_insert(err);
            Ordering::Equal
        }
    });
    failure.map_or(Ok(()), Err)
}

fn sorted(args: &CallArgs) -> Result<GeneratedValue, ExprError> {
    args.check_keywords("sorted", &["reverse"])?;
    let mut items = ops::iterate(args.required(0, "iterable", "sorted")?)?;
    sort_values(&mut items)?;
    if args.flag(usize::MAX, "reverse", false) {
        items.reverse();
    }
    Ok(GeneratedValue::List(items))
}

fn distinct(items: Vec<GeneratedValue>) -> Vec<GeneratedValue> {
    let mut unique: Vec<GeneratedValue> = Vec::with_capacity(items.len());
    for item in items {
        if !unique.iter().any(|seen| ops::equals(seen, &item)) {
            unique.push(item);
        }
    }
    unique
}

fn make_date(args: &CallArgs) -> Result<GeneratedValue, ExprError> {
    let year = int_arg(args, 0, "year", "date")?;
    let month = int_arg(args, 1, "month", "date")?;
    let day = int_arg(args, 2, "day", "date")?;
    build_date(year, month, day).map(GeneratedValue::Date)
}

fn build_date(year: i64, month: i64, day: i64) -> Result<NaiveDate, ExprError> {
    if !(1..=9999).contains(&year) {
        return Err(ExprError::runtime(format!("year {year} is out of range")));
    }
    let month = u32::try_from(month).map_err(|_| ExprError::runtime("month must be in 1..12"))?;
    let day = u32::try_from(day).map_err(|_| ExprError::runtime("day is out of range for month"))?;
    NaiveDate::from_ymd_opt(year as i32, month, day)
        .ok_or_else(|| ExprError::runtime("day is out of range for month"))
}

fn build_time(hour: i64, minute: i64, second: i64, micro: i64) -> Result<NaiveTime, ExprError> {
    let part = |value: i64, name: &str| {
        u32::try_from(value).map_err(|_| ExprError::runtime(format!("{name} out of range")))
    };
    NaiveTime::from_hms_micro_opt(
        part(hour, "hour")?,
        part(minute, "minute")?,
        part(second, "second")?,
        part(micro, "microsecond")?,
    )
    .filter(|_| micro < 1_000_000)
    .ok_or_else(|| ExprError::runtime("time component out of range"))
}

fn make_datetime(args: &CallArgs) -> Result<GeneratedValue, ExprError> {
    let date = build_date(
        int_arg(args, 0, "year", "datetime")?,
        int_arg(args, 1, "month", "datetime")?,
        int_arg(args, 2, "day", "datetime")?,
    )?;
    let time = build_time(
        args.int(3, "hour", 0)?,
        args.int(4, "minute", 0)?,
        args.int(5, "second", 0)?,
        args.int(6, "microsecond", 0)?,
    )?;
    Ok(GeneratedValue::Timestamp(date.and_time(time)))
}

fn make_time(args: &CallArgs) -> Result<GeneratedValue, ExprError> {
    build_time(
        args.int(0, "hour", 0)?,
        args.int(1, "minute", 0)?,
        args.int(2, "second", 0)?,
        args.int(3, "microsecond", 0)?,
    )
    .map(GeneratedValue::Time)
}

fn make_timedelta(args: &CallArgs) -> Result<GeneratedValue, ExprError> {
    args.check_keywords(
        "timedelta",
        &["days", "seconds", "microseconds", "milliseconds", "minutes", "hours", "weeks"],
    )?;
    let micros = args.float(0, "days", 0.0)? * 86_400e6
        + args.float(1, "seconds", 0.0)? * 1e6
        + args.float(2, "microseconds", 0.0)?
        + args.float(3, "milliseconds", 0.0)? * 1e3
        + args.float(4, "minutes", 0.0)? * 60e6
        + args.float(5, "hours", 0.0)? * 3_600e6
        + args.float(6, "weeks", 0.0)? * 604_800e6;
    if !micros.is_finite() || micros.abs() > 8.64e19 {
        return Err(ExprError::runtime("timedelta out of range"));
    }
    Ok(GeneratedValue::Duration(TimeDelta::microseconds(micros.round() as i64)))
}

fn sequence(args: &CallArgs, index: usize, name: &str, function: &str) -> Result<Vec<GeneratedValue>, ExprError> {
    ops::iterate(args.required(index, name, function)?)
}

/// `random.<attr>(...)` drawn from the row's generator.
pub fn call_random(
    attr: &str,
    args: &CallArgs,
    rng: &mut dyn RngCore,
) -> Option<Result<GeneratedValue, ExprError>> {
    let result = match attr {
        "random" => Ok(GeneratedValue::Float(rng.random::<f64>())),
        "randint" => randint(args, rng),
        "uniform" => uniform(args, rng),
        "randrange" => randrange(args, rng),
        "choice" => choice(args, rng),
        "choices" => choices(args, rng),
        "sample" => sample(args, rng),
        "gauss" | "normalvariate" => gauss(args, rng),
        "getrandbits" => getrandbits(args, rng),
        _ => return None,
    };
    Some(result)
}

fn randint(args: &CallArgs, rng: &mut dyn RngCore) -> Result<GeneratedValue, ExprError> {
    let low = int_arg(args, 0, "a", "randint")?;
    let high = int_arg(args, 1, "b", "randint")?;
    if low > high {
        return Err(ExprError::runtime(format!(
            "empty range in randrange({low}, {})",
            high.saturating_add(1)
        )));
    }
    Ok(GeneratedValue::Int(rng.random_range(low..=high)))
}

fn uniform(args: &CallArgs, rng: &mut dyn RngCore) -> Result<GeneratedValue, ExprError> {
    let low = float_arg(args, 0, "a", "uniform")?;
    let high = float_arg(args, 1, "b", "uniform")?;
    Ok(GeneratedValue::Float(low + (high - low) * rng.random::<f64>()))
}

fn choice(args: &CallArgs, rng: &mut dyn RngCore) -> Result<GeneratedValue, ExprError> {
    let items = sequence(args, 0, "seq", "choice")?;
    if items.is_empty() {
        return Err(ExprError::runtime("Cannot choose from an empty sequence"));
    }
    Ok(items[rng.random_range(0..items.len())].clone())
}

fn gauss(args: &CallArgs, rng: &mut dyn RngCore) -> Result<GeneratedValue, ExprError> {
    let mu = args.float(0, "mu", 0.0)?;
    let sigma = args.float(1, "sigma", 1.0)?;
    Ok(GeneratedValue::Float(mu + sigma * standard_normal(rng)))
}

fn getrandbits(args: &CallArgs, rng: &mut dyn RngCore) -> Result<GeneratedValue, ExprError> {
    let bits = int_arg(args, 0, "k", "getrandbits")?;
    if !(0..=63).contains(&bits) {
        return Err(ExprError::runtime("number of bits must be between 0 and 63"));
    }
    let mask = if bits == 0 { 0 } else { u64::MAX >> (64 - bits) };
    Ok(GeneratedValue::Int((rng.next_u64() & mask) as i64))
}

fn randrange(args: &CallArgs, rng: &mut dyn RngCore) -> Result<GeneratedValue, ExprError> {
    let first = int_arg(args, 0, "start", "randrange")?;
    let (start, stop) = match args.present(1, "stop") {
        Some(stop) => (first, expect_int(stop, "stop")?),
        None => (0, first),
    };
    let step = args.int(2, "step", 1)?;
    if step == 0 {
        return Err(ExprError::runtime("zero step for randrange()"));
    }
    let span = stop.saturating_sub(start);
    let count = if step > 0 {
        (span + step - 1).div_euclid(step)
    } else {
        (span + step + 1).div_euclid(step)
    };
    if count <= 0 {
        return Err(ExprError::runtime(format!(
            "empty range in randrange({start}, {stop}, {step})"
        )));
    }
    Ok(GeneratedValue::Int(start + step * rng.random_range(0..count)))
}

fn choices(args: &CallArgs, rng: &mut dyn RngCore) -> Result<GeneratedValue, ExprError> {
    args.check_keywords("choices", &["population", "weights", "k"])?;
    let population = sequence(args, 0, "population", "choices")?;
    let count = args.int(2, "k", 1)?.max(0) as usize;
    if population.is_empty() {
        return Err(ExprError::runtime("Cannot choose from an empty population"));
    }
    let weights = match args.present(1, "weights") {
        Some(weights) => Some(
            ops::iterate(weights)?
                .iter()
                .map(|weight| expect_float(weight, "weights"))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        None => None,
    };
    let Some(weights) = weights else {
        return Ok(GeneratedValue::List(
            (0..count)
                .map(|_| population[rng.random_range(0..population.len())].clone())
                .collect(),
        ));
    };
    if weights.len() != population.len() {
        return Err(ExprError::runtime(
            "The number of weights does not match the population",
        ));
    }
    let cumulative: Vec<f64> = weights
        .iter()
        .scan(0.0, |total, weight| {
            *total += weight;
            Some(*total)
        })
        .collect();
    let total = cumulative.last().copied().unwrap_or_default();
    if total <= 0.0 || !total.is_finite() {
        return Err(ExprError::runtime("Total of weights must be greater than zero"));
    }
    let last = population.len() - 1;
    Ok(GeneratedValue::List(
        (0..count)
            .map(|_| {
                let target = rng.random::<f64>() * total;
                let index = cumulative.partition_point(|bound| *bound <= target).min(last);
                population[index].clone()
            })
            .collect(),
    ))
}

fn sample(args: &CallArgs, rng: &mut dyn RngCore) -> Result<GeneratedValue, ExprError> {
    let mut population = sequence(args, 0, "population", "sample")?;
    let count = int_arg(args, 1, "k", "sample")?;
    if count < 0 || count as usize > population.len() {
        return Err(ExprError::runtime("Sample larger than population or is negative"));
    }
    let count = count as usize;
    for index in 0..count {
        let pick = rng.random_range(index..population.len());
        population.swap(index, pick);
    }
    population.truncate(count);
    Ok(GeneratedValue::List(population))
}

/// Box-Muller draw from the standard normal distribution.
fn standard_normal(rng: &mut dyn RngCore) -> f64 {
    let u1 = 1.0 - rng.random::<f64>();
    let u2 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

fn domain_error() -> ExprError {
    ExprError::runtime("math domain error")
}

/// `math.<attr>(...)`.
pub fn call_math(attr: &str, args: &CallArgs) -> Option<Result<GeneratedValue, ExprError>> {
    let unary = |function: &str| float_arg(args, 0, "x", function);
    let result = match attr {
        "sqrt" => unary("sqrt").and_then(|x| {
            if x < 0.0 {
                Err(domain_error())
            } else {
                Ok(GeneratedValue::Float(x.sqrt()))
            }
        }),
        "floor" => match args.required(0, "x", "floor") {
            Ok(GeneratedValue::Int(value)) => Ok(GeneratedValue::Int(*value)),
            Ok(_) => unary("floor").and_then(|x| float_to_int(x.floor())),
            Err(err) => Err(err),
        },
        "ceil" => match args.required(0, "x", "ceil") {
            Ok(GeneratedValue::Int(value)) => Ok(GeneratedValue::Int(*value)),
            Ok(_) => unary("ceil").and_then(|x| float_to_int(x.ceil())),
            Err(err) => Err(err),
        },
        "trunc" => unary("trunc").and_then(|x| float_to_int(x.trunc())),
        "fabs" => unary("fabs").map(|x| GeneratedValue::Float(x.abs())),
        "exp" => unary("exp").map(|x| GeneratedValue::Float(x.exp())),
        "pow" => float_arg(args, 0, "x", "pow").and_then(|base| {
            let exponent = float_arg(args, 1, "y", "pow")?;
            Ok(GeneratedValue::Float(base.powf(exponent)))
        }),
        "log" => logarithm(args),
        "log10" | "log2" => unary(attr).and_then(|x| {
            if x <= 0.0 {
                Err(domain_error())
            } else if attr == "log10" {
                Ok(GeneratedValue::Float(x.log10()))
            } else {
                Ok(GeneratedValue::Float(x.log2()))
            }
        }),
        "sin" => unary("sin").map(|x| GeneratedValue::Float(x.sin())),
        "cos" => unary("cos").map(|x| GeneratedValue::Float(x.cos())),
        "tan" => unary("tan").map(|x| GeneratedValue::Float(x.tan())),
        "isclose" => is_close(args),
        _ => return None,
    };
    Some(result)
}

fn logarithm(args: &CallArgs) -> Result<GeneratedValue, ExprError> {
    let x = float_arg(args, 0, "x", "log")?;
    if x <= 0.0 {
        return Err(domain_error());
    }
    match args.present(1, "base") {
        Some(base) => {
            let base = expect_float(base, "base")?;
            if base <= 0.0 || base == 1.0 {
                return Err(domain_error());
            }
            Ok(GeneratedValue::Float(x.ln() / base.ln()))
        }
        None => Ok(GeneratedValue::Float(x.ln())),
    }
}

fn is_close(args: &CallArgs) -> Result<GeneratedValue, ExprError> {
    let a = float_arg(args, 0, "a", "isclose")?;
    let b = float_arg(args, 1, "b", "isclose")?;
    let relative = args.float(usize::MAX, "rel_tol", 1e-9)?;
    let absolute = args.float(usize::MAX, "abs_tol", 0.0)?;
    let close = (a - b).abs() <= (relative * a.abs().max(b.abs())).max(absolute);
    Ok(GeneratedValue::Bool(close))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

fn title(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_cased = false;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if previous_cased {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            previous_cased = true;
        } else {
            out.push(ch);
            previous_cased = false;
        }
    }
    out
}

fn no_attribute(value: &GeneratedValue, attr: &str) -> ExprError {
    ExprError::unknown_attribute(format!(
        "'{}' object has no attribute '{attr}'",
        value.type_name()
    ))
}

/// Python's normalized `timedelta` parts: whole days (floored), then
/// seconds and microseconds within that day.
fn delta_parts(delta: TimeDelta) -> (i64, i64, i64) {
    let micros = delta.num_microseconds().unwrap_or(i64::MAX);
    let days = micros.div_euclid(86_400_000_000);
    let rest = micros.rem_euclid(86_400_000_000);
    (days, rest / 1_000_000, rest % 1_000_000)
}

/// Non-callable attribute of a value, such as `d.year`.
pub fn value_attribute(value: &GeneratedValue, attr: &str) -> Result<GeneratedValue, ExprError> {
    let number = match (value, attr) {
        (GeneratedValue::Date(date), "year") => i64::from(date.year()),
        (GeneratedValue::Date(date), "month") => i64::from(date.month()),
        (GeneratedValue::Date(date), "day") => i64::from(date.day()),
        (GeneratedValue::Timestamp(moment), "year") => i64::from(moment.year()),
        (GeneratedValue::Timestamp(moment), "month") => i64::from(moment.month()),
        (GeneratedValue::Timestamp(moment), "day") => i64::from(moment.day()),
        (GeneratedValue::Timestamp(moment), "hour") => i64::from(moment.hour()),
        (GeneratedValue::Timestamp(moment), "minute") => i64::from(moment.minute()),
        (GeneratedValue::Timestamp(moment), "second") => i64::from(moment.second()),
        (GeneratedValue::Timestamp(moment), "microsecond") => {
            i64::from(moment.nanosecond() / 1_000)
        }
        (GeneratedValue::Time(time), "hour") => i64::from(time.hour()),
        (GeneratedValue::Time(time), "minute") => i64::from(time.minute()),
        (GeneratedValue::Time(time), "second") => i64::from(time.second()),
        (GeneratedValue::Time(time), "microsecond") => i64::from(time.nanosecond() / 1_000),
        (GeneratedValue::Duration(delta), "days") => delta_parts(*delta).0,
        (GeneratedValue::Duration(delta), "seconds") => delta_parts(*delta).1,
        (GeneratedValue::Duration(delta), "microseconds") => delta_parts(*delta).2,
        (GeneratedValue::Uuid(text), "hex") => {
            return Ok(GeneratedValue::Text(text.replace('-', "")));
        }
        _ => return Err(no_attribute(value, attr)),
    };
    Ok(GeneratedValue::Int(number))
}

/// `value.attr(...)`.
pub fn call_method(
    receiver: &GeneratedValue,
    attr: &str,
    args: &CallArgs,
) -> Result<GeneratedValue, ExprError> {
    match receiver {
        GeneratedValue::Text(text) | GeneratedValue::Uuid(text) => text_method(receiver, text, attr, args),
        GeneratedValue::Date(_) | GeneratedValue::Timestamp(_) | GeneratedValue::Time(_) => {
            temporal_method(receiver, attr, args)
        }
        GeneratedValue::Duration(delta) if attr == "total_seconds" => Ok(GeneratedValue::Float(
            delta.num_microseconds().unwrap_or(i64::MAX) as f64 / 1e6,
        )),
        GeneratedValue::Float(number) if attr == "is_integer" => {
            Ok(GeneratedValue::Bool(number.fract() == 0.0))
        }
        GeneratedValue::List(items) => list_method(receiver, items, attr, args),
        GeneratedValue::Dict(entries) => dict_method(receiver, entries, attr, args),
        other => Err(no_attribute(other, attr)),
    }
}

fn strip_set(args: &CallArgs) -> Result<Option<Vec<char>>, ExprError> {
    Ok(args.text(0, "chars")?.map(|chars| chars.chars().collect()))
}

fn text_method(
    receiver: &GeneratedValue,
    text: &str,
    attr: &str,
    args: &CallArgs,
) -> Result<GeneratedValue, ExprError> {
    let out = |value: String| -> Result<GeneratedValue, ExprError> { Ok(GeneratedValue::Text(value)) };
    let flag = |value: bool| -> Result<GeneratedValue, ExprError> { Ok(GeneratedValue::Bool(value)) };
    match attr {
        "upper" => out(text.to_uppercase()),
        "lower" => out(text.to_lowercase()),
        "title" => out(title(text)),
        "capitalize" => out(capitalize(text)),
        "swapcase" => out(text
            .chars()
            .flat_map(|ch| -> Vec<char> {
                if ch.is_uppercase() {
                    ch.to_lowercase().collect()
                } else {
                    ch.to_uppercase().collect()
                }
            })
            .collect()),
        "strip" | "lstrip" | "rstrip" => {
            let set = strip_set(args)?;
            let matches = |ch: char| match &set {
                Some(set) => set.contains(&ch),
                None => ch.is_whitespace(),
            };
            out(match attr {
                "strip" => text.trim_matches(matches),
                "lstrip" => text.trim_start_matches(matches),
                _ => text.trim_end_matches(matches),
            }
            .to_string())
        }
        "replace" => {
            let old = text_arg(args, 0, "old", "replace")?;
            let new = text_arg(args, 1, "new", "replace")?;
            let count = args.int(2, "count", -1)?;
            if count < 0 {
                out(text.replace(&old, &new))
            } else {
                out(text.replacen(&old, &new, count as usize))
            }
        }
        "split" => {
            let separator = args.text(0, "sep")?;
            let limit = args.int(1, "maxsplit", -1)?;
            let parts: Vec<String> = match (separator, limit) {
                (Some(sep), _) if sep.is_empty() => {
                    return Err(ExprError::runtime("empty separator"));
                }
                (Some(sep), limit) if limit >= 0 => {
                    text.splitn(limit as usize + 1, sep.as_str()).map(str::to_string).collect()
                }
                (Some(sep), _) => text.split(sep.as_str()).map(str::to_string).collect(),
                (None, limit) if limit >= 0 => {
                    let mut parts = Vec::new();
                    let mut rest = text.trim_start();
                    while !rest.is_empty() {
                        if parts.len() as i64 == limit {
                            parts.push(rest.to_string());
                            break;
                        }
                        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                        parts.push(rest[..end].to_string());
                        rest = rest[end..].trim_start();
                    }
                    parts
                }
                (None, _) => text.split_whitespace().map(str::to_string).collect(),
            };
            Ok(GeneratedValue::List(parts.into_iter().map(GeneratedValue::Text).collect()))
        }
        "join" => {
            let items = sequence(args, 0, "iterable", "join")?;
            let parts = items
                .iter()
                .enumerate()
                .map(|(index, item)| match item {
                    GeneratedValue::Text(part) | GeneratedValue::Uuid(part) => Ok(part.as_str()),
                    other => Err(ExprError::runtime(format!(
                        "sequence item {index}: expected str instance, {} found",
                        other.type_name()
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            out(parts.join(text))
        }
        "startswith" | "endswith" => {
            let probe = args.required(0, "prefix", attr)?;
            let options = match probe {
                GeneratedValue::List(items) => items.clone(),
                other => vec![other.clone()],
            };
            let mut hit = false;
            for option in &options {
                let Some(option) = option.as_str() else {
                    return Err(ExprError::runtime(format!(
                        "{attr} first arg must be str or a tuple of str, not {}",
                        option.type_name()
                    )));
                };
                hit |= if attr == "startswith" {
                    text.starts_with(option)
                } else {
                    text.ends_with(option)
                };
            }
            flag(hit)
        }
        "find" | "index" => {
            let needle = text_arg(args, 0, "sub", attr)?;
            match text.find(&needle) {
                Some(byte) => Ok(GeneratedValue::Int(text[..byte].chars().count() as i64)),
                None if attr == "find" => Ok(GeneratedValue::Int(-1)),
                None => Err(ExprError::runtime("substring not found")),
            }
        }
        "count" => {
            let needle = text_arg(args, 0, "sub", "count")?;
            let count = if needle.is_empty() {
                text.chars().count() + 1
            } else {
                text.matches(needle.as_str()).count()
            };
            Ok(GeneratedValue::Int(count as i64))
        }
        "zfill" => {
            let width = int_arg(args, 0, "width", "zfill")?.max(0) as usize;
            let len = text.chars().count();
            if len >= width {
                return out(text.to_string());
            }
            let padding = "0".repeat(width - len);
            match text.strip_prefix(['-', '+']) {
                Some(rest) => out(format!("{}{padding}{rest}", &text[..1])),
                None => out(format!("{padding}{text}")),
            }
        }
        "center" | "ljust" | "rjust" => {
            let width = int_arg(args, 0, "width", attr)?.max(0) as usize;
            let fill = args.text(1, "fillchar")?.unwrap_or_else(|| " ".to_string());
            let mut fill_chars = fill.chars();
            let (Some(fill), None) = (fill_chars.next(), fill_chars.next()) else {
                return Err(ExprError::runtime(
                    "The fill character must be exactly one character long",
                ));
            };
            let len = text.chars().count();
            let missing = width.saturating_sub(len);
            let (left, right) = match attr {
                "ljust" => (0, missing),
                "rjust" => (missing, 0),
                _ => {
                    let left = missing / 2 + (missing & width & 1);
                    (left, missing - left)
                }
            };
            let pad = |count: usize| std::iter::repeat_n(fill, count).collect::<String>();
            out(format!("{}{text}{}", pad(left), pad(right)))
        }
        "removeprefix" => {
            let prefix = text_arg(args, 0, "prefix", attr)?;
            out(text.strip_prefix(prefix.as_str()).unwrap_or(text).to_string())
        }
        "removesuffix" => {
            let suffix = text_arg(args, 0, "suffix", attr)?;
            out(text.strip_suffix(suffix.as_str()).unwrap_or(text).to_string())
        }
        "isdigit" | "isnumeric" | "isdecimal" => {
            flag(!text.is_empty() && text.chars().all(|ch| ch.is_ascii_digit()))
        }
        "isalpha" => flag(!text.is_empty() && text.chars().all(char::is_alphabetic)),
        "isalnum" => flag(!text.is_empty() && text.chars().all(char::is_alphanumeric)),
        "isspace" => flag(!text.is_empty() && text.chars().all(char::is_whitespace)),
        "isupper" => flag(
            text.chars().any(char::is_alphabetic) && !text.chars().any(char::is_lowercase),
        ),
        "islower" => flag(
            text.chars().any(char::is_alphabetic) && !text.chars().any(char::is_uppercase),
        ),
        "format" => out(str_format(text, &args.positional)?),
        _ => Err(no_attribute(receiver, attr)),
    }
}

fn isoformat(value: &GeneratedValue, separator: &str) -> String {
    let micros = |nanos: u32| {
        if nanos == 0 {
            String::new()
        } else {
            format!(".{:06}", nanos / 1_000)
        }
    };
    match value {
        GeneratedValue::Date(date) => date.format("%Y-%m-%d").to_string(),
        GeneratedValue::Timestamp(moment) => format!(
            "{}{separator}{}{}",
            moment.format("%Y-%m-%d"),
            moment.format("%H:%M:%S"),
            micros(moment.nanosecond())
        ),
        GeneratedValue::Time(time) => {
            format!("{}{}", time.format("%H:%M:%S"), micros(time.nanosecond()))
        }
        other => other.to_string(),
    }
}

fn replace_date(date: NaiveDate, args: &CallArgs) -> Result<NaiveDate, ExprError> {
    build_date(
        args.int(usize::MAX, "year", i64::from(date.year()))?,
        args.int(usize::MAX, "month", i64::from(date.month()))?,
        args.int(usize::MAX, "day", i64::from(date.day()))?,
    )
}

fn replace_time(time: NaiveTime, args: &CallArgs) -> Result<NaiveTime, ExprError> {
    build_time(
        args.int(usize::MAX, "hour", i64::from(time.hour()))?,
        args.int(usize::MAX, "minute", i64::from(time.minute()))?,
        args.int(usize::MAX, "second", i64::from(time.second()))?,
        args.int(usize::MAX, "microsecond", i64::from(time.nanosecond() / 1_000))?,
    )
}

fn temporal_method(
    receiver: &GeneratedValue,
    attr: &str,
    args: &CallArgs,
) -> Result<GeneratedValue, ExprError> {
    match (receiver, attr) {
        (_, "strftime") => {
            let pattern = text_arg(args, 0, "format", "strftime")?;
            Ok(GeneratedValue::Text(strftime(receiver, &pattern)?))
        }
        (_, "isoformat") => {
            let separator = args.text(0, "sep")?.unwrap_or_else(|| "T".to_string());
            Ok(GeneratedValue::Text(isoformat(receiver, &separator)))
        }
        (GeneratedValue::Timestamp(moment), "date") => Ok(GeneratedValue::Date(moment.date())),
        (GeneratedValue::Timestamp(moment), "time") => Ok(GeneratedValue::Time(moment.time())),
        (GeneratedValue::Timestamp(moment), "timestamp") => Ok(GeneratedValue::Float(
            moment.and_utc().timestamp_micros() as f64 / 1e6,
        )),
        (GeneratedValue::Date(date), "weekday") => {
            Ok(GeneratedValue::Int(i64::from(date.weekday().num_days_from_monday())))
        }
        (GeneratedValue::Timestamp(moment), "weekday") => {
            Ok(GeneratedValue::Int(i64::from(moment.weekday().num_days_from_monday())))
        }
        (GeneratedValue::Date(date), "isoweekday") => {
            Ok(GeneratedValue::Int(i64::from(date.weekday().number_from_monday())))
        }
        (GeneratedValue::Timestamp(moment), "isoweekday") => {
            Ok(GeneratedValue::Int(i64::from(moment.weekday().number_from_monday())))
        }
        (GeneratedValue::Date(date), "replace") => {
            replace_date(*date, args).map(GeneratedValue::Date)
        }
        (GeneratedValue::Timestamp(moment), "replace") => {
            let date = replace_date(moment.date(), args)?;
            let time = replace_time(moment.time(), args)?;
            Ok(GeneratedValue::Timestamp(date.and_time(time)))
        }
        (GeneratedValue::Time(time), "replace") => {
            replace_time(*time, args).map(GeneratedValue::Time)
        }
        _ => Err(no_attribute(receiver, attr)),
    }
}

fn list_method(
    receiver: &GeneratedValue,
    items: &[GeneratedValue],
    attr: &str,
    args: &CallArgs,
) -> Result<GeneratedValue, ExprError> {
    match attr {
        "index" => {
            let needle = args.required(0, "value", "index")?;
            items
                .iter()
                .position(|item| ops::equals(item, needle))
                .map(|position| GeneratedValue::Int(position as i64))
                .ok_or_else(|| ExprError::runtime(format!("{} is not in list", needle.repr())))
        }
        "count" => {
            let needle = args.required(0, "value", "count")?;
            Ok(GeneratedValue::Int(
                items.iter().filter(|item| ops::equals(item, needle)).count() as i64,
            ))
        }
        "copy" => Ok(receiver.clone()),
        _ => Err(no_attribute(receiver, attr)),
    }
}

fn dict_method(
    receiver: &GeneratedValue,
    entries: &[(GeneratedValue, GeneratedValue)],
    attr: &str,
    args: &CallArgs,
) -> Result<GeneratedValue, ExprError> {
    match attr {
        "get" => {
            let key = args.required(0, "key", "get")?;
            Ok(entries
                .iter()
                .find(|(candidate, _)| ops::equals(candidate, key))
                .map(|(_, value)| value.clone())
                .or_else(|| args.get(1, "default").cloned())
                .unwrap_or(GeneratedValue::Null))
        }
        "keys" => Ok(GeneratedValue::List(
            entries.iter().map(|(key, _)| key.clone()).collect(),
        )),
        "values" => Ok(GeneratedValue::List(
            entries.iter().map(|(_, value)| value.clone()).collect(),
        )),
        "items" => Ok(GeneratedValue::List(
            entries
                .iter()
                .map(|(key, value)| GeneratedValue::List(vec![key.clone(), value.clone()]))
                .collect(),
        )),
        "copy" => Ok(receiver.clone()),
        _ => Err(no_attribute(receiver, attr)),
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn args(values: Vec<GeneratedValue>) -> CallArgs {
        CallArgs::new(values)
    }

    fn builtin(name: &str, values: Vec<GeneratedValue>) -> GeneratedValue {
        call_builtin(name, &args(values)).unwrap().unwrap()
    }

    #[test]
    fn round_uses_bankers_rounding() {
        assert_eq!(builtin("round", vec![GeneratedValue::Float(2.5)]), GeneratedValue::Int(2));
        assert_eq!(builtin("round", vec![GeneratedValue::Float(3.5)]), GeneratedValue::Int(4));
        assert_eq!(
            builtin("round", vec![GeneratedValue::Float(1.234), GeneratedValue::Int(2)]),
            GeneratedValue::Float(1.23)
        );
    }

    #[test]
    fn conversions_follow_python_rules() {
        assert_eq!(builtin("int", vec!["42".into()]), GeneratedValue::Int(42));
        assert_eq!(builtin("int", vec![GeneratedValue::Float(-3.9)]), GeneratedValue::Int(-3));
        assert_eq!(builtin("str", vec![GeneratedValue::Float(2.0)]), "2.0".into());
        assert!(call_builtin("int", &args(vec!["abc".into()])).unwrap().is_err());
        assert!(call_builtin("no_such_builtin", &args(Vec::new())).is_none());
    }

    #[test]
    fn range_and_aggregates() {
        let values = builtin("range", vec![GeneratedValue::Int(5), GeneratedValue::Int(0), GeneratedValue::Int(-2)]);
        assert_eq!(
            values,
            GeneratedValue::List(vec![
                GeneratedValue::Int(5),
                GeneratedValue::Int(3),
                GeneratedValue::Int(1)
            ])
        );
        assert_eq!(builtin("sum", vec![values.clone()]), GeneratedValue::Int(9));
        assert_eq!(builtin("max", vec![values]), GeneratedValue::Int(5));
    }

    #[test]
    fn random_calls_are_reproducible() {
        let call = |seed: u64| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            call_random("randint", &args(vec![GeneratedValue::Int(1), GeneratedValue::Int(100)]), &mut rng)
                .unwrap()
                .unwrap()
        };
        assert_eq!(call(9), call(9));
        let GeneratedValue::Int(value) = call(9) else {
            panic!("randint returned a non-integer");
        };
        assert!((1..=100).contains(&value));
    }

    #[test]
    fn text_methods() {
        let text: GeneratedValue = "  hello world  ".into();
        assert_eq!(
            call_method(&text, "strip", &CallArgs::default()).unwrap(),
            "hello world".into()
        );
        assert_eq!(
            call_method(&"hello world".into(), "title", &CallArgs::default()).unwrap(),
            "Hello World".into()
        );
        assert_eq!(
            call_method(&"7".into(), "zfill", &args(vec![GeneratedValue::Int(3)])).unwrap(),
            "007".into()
        );
        let err = call_method(&text, "nope", &CallArgs::default()).unwrap_err();
        assert_eq!(err, ExprError::unknown_attribute("'str' object has no attribute 'nope'"));
    }

    #[test]
    fn timedelta_normalizes_negative_parts() {
        let delta = make_timedelta(&CallArgs::default().with_keyword("seconds", GeneratedValue::Int(-1)))
            .unwrap();
        assert_eq!(value_attribute(&delta, "days").unwrap(), GeneratedValue::Int(-1));
        assert_eq!(value_attribute(&delta, "seconds").unwrap(), GeneratedValue::Int(86_399));
    }
}
