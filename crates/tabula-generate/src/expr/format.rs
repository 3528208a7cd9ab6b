//! Format-spec mini language used by f-string fields, `format()` and the `%`
//! operator, plus `strftime` for temporal values.

use std::fmt::Write;

use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime};

use super::ExprError;
use crate::value::{GeneratedValue, format_float};

#[derive(Debug, Clone, Default, PartialEq)]
struct FormatSpec {
    fill: char,
    align: Option<char>,
    sign: Option<char>,
    zero: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

fn parse_spec(spec: &str) -> Result<FormatSpec, ExprError> {
    let chars: Vec<char> = spec.chars().collect();
    let mut parsed = FormatSpec {
        fill: ' ',
        ..FormatSpec::default()
    };
    let mut index = 0;

    let is_align = |ch: char| matches!(ch, '<' | '>' | '^' | '=');
    if chars.len() >= 2 && is_align(chars[1]) {
        parsed.fill = chars[0];
        parsed.align = Some(chars[1]);
        index = 2;
    } else if chars.first().is_some_and(|ch| is_align(*ch)) {
        parsed.align = Some(chars[0]);
        index = 1;
    }

    if let Some(sign) = chars.get(index).copied()
        && matches!(sign, '+' | '-' | ' ')
    {
        parsed.sign = Some(sign);
        index += 1;
    }
    if chars.get(index) == Some(&'0') {
        parsed.zero = true;
        index += 1;
    }

    let mut width = String::new();
    while let Some(ch) = chars.get(index).filter(|ch| ch.is_ascii_digit()) {
        width.push(*ch);
        index += 1;
    }
    parsed.width = width.parse().unwrap_or(0);

    if let Some(grouping) = chars.get(index).copied()
        && matches!(grouping, ',' | '_')
    {
        parsed.grouping = Some(grouping);
        index += 1;
    }

    if chars.get(index) == Some(&'.') {
        index += 1;
        let mut precision = String::new();
        while let Some(ch) = chars.get(index).filter(|ch| ch.is_ascii_digit()) {
            precision.push(*ch);
            index += 1;
        }
        parsed.precision = Some(
            precision
                .parse()
                .map_err(|_| ExprError::runtime(format!("format specifier missing precision in '{spec}'")))?,
        );
    }

    if let Some(kind) = chars.get(index) {
        parsed.kind = Some(*kind);
        index += 1;
    }
    if index != chars.len() {
        return Err(ExprError::runtime(format!("invalid format specifier '{spec}'")));
    }
    Ok(parsed)
}

/// Apply a format spec the way `format(value, spec)` does.
pub fn format_value(value: &GeneratedValue, spec: &str) -> Result<String, ExprError> {
    if spec.is_empty() {
        return Ok(value.to_string());
    }
    match value {
        GeneratedValue::Date(_) | GeneratedValue::Time(_) | GeneratedValue::Timestamp(_) => {
            return strftime(value, spec);
        }
        _ => {}
    }

    let spec_text = spec;
    let spec = parse_spec(spec)?;
    let numeric = matches!(
        value,
        GeneratedValue::Int(_) | GeneratedValue::Float(_) | GeneratedValue::Bool(_)
    );

    let body = match (spec.kind, value) {
        (Some('s') | None, value) if !numeric => {
            let text = value.to_string();
            match spec.precision {
                Some(limit) => text.chars().take(limit).collect(),
                None => text,
            }
        }
        (Some('d' | 'n') | None, GeneratedValue::Int(_) | GeneratedValue::Bool(_))
            if spec.precision.is_none() || spec.kind.is_some() =>
        {
            let number = value.as_i64().unwrap_or_default();
            group(&number.unsigned_abs().to_string(), spec.grouping)
        }
        (Some('x'), _) => integer_arg(value, spec_text).map(|n| format!("{:x}", n.unsigned_abs()))?,
        (Some('X'), _) => integer_arg(value, spec_text).map(|n| format!("{:X}", n.unsigned_abs()))?,
        (Some('o'), _) => integer_arg(value, spec_text).map(|n| format!("{:o}", n.unsigned_abs()))?,
        (Some('b'), _) => integer_arg(value, spec_text).map(|n| format!("{:b}", n.unsigned_abs()))?,
        (Some('f' | 'F'), _) => {
            let number = float_arg(value, spec_text)?.abs();
            fixed(number, spec.precision.unwrap_or(6), spec.grouping)
        }
        (Some('e' | 'E'), _) => {
            let number = float_arg(value, spec_text)?.abs();
            let text = scientific(number, spec.precision.unwrap_or(6));
            if spec.kind == Some('E') {
                text.to_uppercase()
            } else {
                text
            }
        }
        (Some('%'), _) => {
            let number = float_arg(value, spec_text)?.abs() * 100.0;
            format!("{}%", fixed(number, spec.precision.unwrap_or(6), spec.grouping))
        }
        (Some('g' | 'G') | None, _) => {
            let number = float_arg(value, spec_text)?.abs();
            match spec.precision {
                Some(precision) => general(number, precision.max(1)),
                None if matches!(value, GeneratedValue::Float(_)) => {
                    let text = format_float(number);
                    match spec.grouping {
                        Some(separator) => group_decimal(&text, separator),
                        None => text,
                    }
                }
                None => general(number, 6),
            }
        }
        (Some(kind), value) => {
            return Err(ExprError::runtime(format!(
                "unknown format code '{kind}' for object of type '{}'",
                value.type_name()
            )));
        }
    };

    let negative = numeric && value.as_f64().is_some_and(|n| n.is_sign_negative() && n != 0.0);
    let sign = if !numeric {
        ""
    } else if negative {
        "-"
    } else {
        match spec.sign {
            Some('+') => "+",
            Some(' ') => " ",
            _ => "",
        }
    };

    Ok(pad(sign, &body, &spec, numeric))
}

fn pad(sign: &str, body: &str, spec: &FormatSpec, numeric: bool) -> String {
    let length = sign.chars().count() + body.chars().count();
    if length >= spec.width {
        return format!("{sign}{body}");
    }
    let missing = spec.width - length;

    let (fill, align) = match (spec.align, spec.zero) {
        (Some(align), _) => (spec.fill, align),
        (None, true) => ('0', '='),
        (None, false) => (spec.fill, if numeric { '>' } else { '<' }),
    };
    let filler = |count: usize| fill.to_string().repeat(count);

    match align {
        '<' => format!("{sign}{body}{}", filler(missing)),
        '^' => {
            let left = missing / 2;
            format!("{}{sign}{body}{}", filler(left), filler(missing - left))
        }
        '=' => format!("{sign}{}{body}", filler(missing)),
        _ => format!("{}{sign}{body}", filler(missing)),
    }
}

fn integer_arg(value: &GeneratedValue, spec: &str) -> Result<i64, ExprError> {
    value.as_i64().ok_or_else(|| {
        ExprError::runtime(format!(
            "format code '{spec}' needs an integer, got '{}'",
            value.type_name()
        ))
    })
}

fn float_arg(value: &GeneratedValue, spec: &str) -> Result<f64, ExprError> {
    value.as_f64().ok_or_else(|| {
        ExprError::runtime(format!(
            "format code '{spec}' needs a number, got '{}'",
            value.type_name()
        ))
    })
}

fn fixed(number: f64, precision: usize, grouping: Option<char>) -> String {
    let text = format!("{number:.precision$}");
    match grouping {
        Some(separator) => group_decimal(&text, separator),
        None => text,
    }
}

fn scientific(number: f64, precision: usize) -> String {
    let text = format!("{number:.precision$e}");
    match text.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or_default();
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exponent.abs())
        }
        None => text,
    }
}

fn general(number: f64, precision: usize) -> String {
    if number == 0.0 {
        return "0".to_string();
    }
    let exponent = number.abs().log10().floor() as i32;
    let text = if exponent < -4 || exponent >= precision as i32 {
        let text = scientific(number, precision.saturating_sub(1));
        match text.split_once('e') {
            Some((mantissa, exponent)) => format!("{}e{exponent}", strip_zeros(mantissa)),
            None => text,
        }
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        strip_zeros(&format!("{number:.decimals$}"))
    };
    text
}

fn strip_zeros(text: &str) -> String {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text.to_string()
    }
}

fn group(digits: &str, separator: Option<char>) -> String {
    let Some(separator) = separator else {
        return digits.to_string();
    };
    let mut grouped = String::new();
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(separator);
        }
        grouped.push(ch);
    }
    grouped
}

fn group_decimal(text: &str, separator: char) -> String {
    match text.split_once('.') {
        Some((whole, fraction)) => format!("{}.{fraction}", group(whole, Some(separator))),
        None => group(text, Some(separator)),
    }
}

/// `strftime` over dates, times and timestamps.
///
/// Dates and times are widened to timestamps first so every directive
/// renders; `%f` is microseconds.
pub fn strftime(value: &GeneratedValue, pattern: &str) -> Result<String, ExprError> {
    let moment = match value {
        GeneratedValue::Timestamp(value) => *value,
        GeneratedValue::Date(value) => value.and_time(chrono::NaiveTime::MIN),
        GeneratedValue::Time(value) => NaiveDate::from_ymd_opt(1900, 1, 1)
            .map(|date| date.and_time(*value))
            .ok_or_else(|| ExprError::runtime("invalid base date"))?,
        other => {
            return Err(ExprError::unknown_attribute(format!(
                "'{}' object has no attribute 'strftime'",
                other.type_name()
            )));
        }
    };
    render(moment, pattern)
}

fn render(moment: NaiveDateTime, pattern: &str) -> Result<String, ExprError> {
    let pattern = pattern.replace("%f", "%6f");
    let items: Vec<Item<'_>> = StrftimeItems::new(&pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(ExprError::runtime(format!("invalid format string '{pattern}'")));
    }
    let mut out = String::new();
    write!(out, "{}", moment.format_with_items(items.iter()))
        .map_err(|_| ExprError::runtime(format!("cannot format with '{pattern}'")))?;
    Ok(out)
}

/// `template % args` with printf-style conversions.
pub fn percent_format(template: &str, args: &GeneratedValue) -> Result<String, ExprError> {
    let values: Vec<GeneratedValue> = match args {
        GeneratedValue::List(items) => items.clone(),
        other => vec![other.clone()],
    };
    let mut values = values.into_iter();
    let chars: Vec<char> = template.chars().collect();
    let mut out = String::new();
    let mut index = 0;

    while index < chars.len() {
        let ch = chars[index];
        if ch != '%' {
            out.push(ch);
            index += 1;
            continue;
        }
        index += 1;
        if chars.get(index) == Some(&'%') {
            out.push('%');
            index += 1;
            continue;
        }

        let mut flags = String::new();
        while let Some(flag) = chars.get(index).filter(|ch| matches!(ch, '-' | '+' | ' ' | '0')) {
            flags.push(*flag);
            index += 1;
        }
        let mut width = String::new();
        while let Some(digit) = chars.get(index).filter(|ch| ch.is_ascii_digit()) {
            width.push(*digit);
            index += 1;
        }
        let mut precision = None;
        if chars.get(index) == Some(&'.') {
            index += 1;
            let mut digits = String::new();
            while let Some(digit) = chars.get(index).filter(|ch| ch.is_ascii_digit()) {
                digits.push(*digit);
                index += 1;
            }
            precision = Some(digits);
        }
        let Some(conversion) = chars.get(index).copied() else {
            return Err(ExprError::runtime("incomplete format"));
        };
        index += 1;

        let value = values
            .next()
            .ok_or_else(|| ExprError::runtime("not enough arguments for format string"))?;

        let mut spec = String::new();
        if flags.contains('-') {
            spec.push('<');
        }
        if flags.contains('+') {
            spec.push('+');
        } else if flags.contains(' ') {
            spec.push(' ');
        }
        if flags.contains('0') && !flags.contains('-') {
            spec.push('0');
        }
        spec.push_str(&width);
        if let Some(precision) = precision {
            spec.push('.');
            spec.push_str(&precision);
        }

        let rendered = match conversion {
            's' | 'r' => {
                let text = if conversion == 'r' {
                    value.repr()
                } else {
                    value.to_string()
                };
                spec.push('s');
                format_value(&GeneratedValue::Text(text), &spec)?
            }
            'd' | 'i' | 'u' => {
                let number = match &value {
                    GeneratedValue::Float(number) => GeneratedValue::Int(number.trunc() as i64),
                    other => other.clone(),
                };
                spec.push('d');
                format_value(&number, &spec)?
            }
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' | 'x' | 'X' | 'o' => {
                spec.push(conversion);
                format_value(&value, &spec)?
            }
            other => {
                return Err(ExprError::runtime(format!(
                    "unsupported format character '{other}'"
                )));
            }
        };
        out.push_str(&rendered);
    }

    if values.next().is_some() {
        return Err(ExprError::runtime(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(out)
}

/// `str.format` with positional `{}` / `{0}` fields and optional specs.
pub fn str_format(template: &str, args: &[GeneratedValue]) -> Result<String, ExprError> {
    let chars: Vec<char> = template.chars().collect();
    let mut out = String::new();
    let mut index = 0;
    let mut auto = 0;

    while index < chars.len() {
        match chars[index] {
            '{' if chars.get(index + 1) == Some(&'{') => {
                out.push('{');
                index += 2;
            }
            '}' if chars.get(index + 1) == Some(&'}') => {
                out.push('}');
                index += 2;
            }
            '{' => {
                let Some(offset) = chars[index..].iter().position(|ch| *ch == '}') else {
                    return Err(ExprError::runtime("single '{' encountered in format string"));
                };
                let field: String = chars[index + 1..index + offset].iter().collect();
                let (name, spec) = field.split_once(':').unwrap_or((field.as_str(), ""));
                let position = if name.is_empty() {
                    auto += 1;
                    auto - 1
                } else {
                    name.parse::<usize>().map_err(|_| {
                        ExprError::runtime(format!("unsupported format field '{name}'"))
                    })?
                };
                let value = args.get(position).ok_or_else(|| {
                    ExprError::runtime(format!("replacement index {position} out of range"))
                })?;
                out.push_str(&format_value(value, spec)?);
                index += offset + 1;
            }
            ch => {
                out.push(ch);
                index += 1;
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn integer_specs_pad_and_group() {
        assert_eq!(format_value(&GeneratedValue::Int(42), "05d").unwrap(), "00042");
        assert_eq!(format_value(&GeneratedValue::Int(-42), "05d").unwrap(), "-0042");
        assert_eq!(format_value(&GeneratedValue::Int(1234567), ",").unwrap(), "1,234,567");
        assert_eq!(format_value(&GeneratedValue::Int(7), ">4").unwrap(), "   7");
    }

    #[test]
    fn float_specs_round_and_scale() {
        assert_eq!(format_value(&GeneratedValue::Float(3.14159), ".2f").unwrap(), "3.14");
        assert_eq!(format_value(&GeneratedValue::Float(0.256), ".1%").unwrap(), "25.6%");
        assert_eq!(format_value(&GeneratedValue::Int(5), ".2f").unwrap(), "5.00");
        assert_eq!(format_value(&GeneratedValue::Float(1234.5), ",.2f").unwrap(), "1,234.50");
    }

    #[test]
    fn text_specs_align() {
        assert_eq!(format_value(&"ab".into(), "<4").unwrap(), "ab  ");
        assert_eq!(format_value(&"ab".into(), "*^6").unwrap(), "**ab**");
    }

    #[test]
    fn dates_use_strftime_specs() {
        let date = GeneratedValue::Date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        assert_eq!(format_value(&date, "%d/%m/%Y").unwrap(), "09/03/2024");
        assert_eq!(strftime(&date, "%H:%M").unwrap(), "00:00");
    }

    #[test]
    fn percent_operator_formats_tuples() {
        let args = GeneratedValue::List(vec!["INV".into(), GeneratedValue::Int(7)]);
        assert_eq!(percent_format("%s-%04d", &args).unwrap(), "INV-0007");
        assert!(percent_format("%s %s", &GeneratedValue::Int(1)).is_err());
    }

    #[test]
    fn str_format_fills_positional_fields() {
        let args = vec!["a".into(), GeneratedValue::Float(2.5)];
        assert_eq!(str_format("{}:{:.1f}:{0}", &args).unwrap(), "a:2.5:a");
    }
}
