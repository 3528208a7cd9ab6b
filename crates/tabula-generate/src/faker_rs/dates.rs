//! Date and time generators with Faker-style relative bounds (`"-30y"`,
//! `"+2w"`, `"today"`). Every bound is resolved against the session clock.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use rand::{Rng, RngCore};

use crate::expr::ExprError;
use crate::expr::format::strftime;
use crate::functions::CallArgs;
use crate::value::GeneratedValue;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Resolve a bound argument: a relative string, `today`/`now`, a date or
/// timestamp, a timedelta from now, or an integer offset in seconds.
pub fn resolve_moment(
    value: Option<&GeneratedValue>,
    default: &str,
    clock: NaiveDateTime,
) -> Result<NaiveDateTime, ExprError> {
    let value = match value {
        None | Some(GeneratedValue::Null) => return parse_relative(default, clock),
        Some(value) => value,
    };
    match value {
        GeneratedValue::Text(text) => parse_relative(text, clock),
        GeneratedValue::Date(date) => Ok(date.and_time(NaiveTime::MIN)),
        GeneratedValue::Timestamp(moment) => Ok(*moment),
        GeneratedValue::Duration(delta) => shift(clock, *delta),
        GeneratedValue::Int(seconds) => shift(clock, TimeDelta::seconds(*seconds)),
        other => Err(ExprError::runtime(format!(
            "cannot use {} as a date bound",
            other.type_name()
        ))),
    }
}

fn shift(moment: NaiveDateTime, delta: TimeDelta) -> Result<NaiveDateTime, ExprError> {
    moment
        .checked_add_signed(delta)
        .ok_or_else(|| ExprError::runtime("date value out of range"))
}

/// `[+-]?(Ny)?(NM)?(Nw)?(Nd)?(Nh)?(Nm)?(Ns)?`; years are 365.24 days and
/// months 30.42 days.
fn parse_relative(text: &str, clock: NaiveDateTime) -> Result<NaiveDateTime, ExprError> {
    let trimmed = text.trim();
    match trimmed {
        "now" => return Ok(clock),
        "today" => return Ok(clock.date().and_time(NaiveTime::MIN)),
        _ => {}
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }

    let invalid = || ExprError::runtime(format!("can't parse date string `{text}`"));
    let (sign, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    if body.is_empty() {
        return Err(invalid());
    }

    let mut seconds = 0.0;
    let mut digits = String::new();
    for ch in body.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let amount: f64 = digits.parse().map_err(|_| invalid())?;
        digits.clear();
        seconds += amount
            * match ch {
                'y' => 365.24 * SECONDS_PER_DAY,
                'M' => 30.42 * SECONDS_PER_DAY,
                'w' => 7.0 * SECONDS_PER_DAY,
                'd' => SECONDS_PER_DAY,
                'h' => 3_600.0,
                'm' => 60.0,
                's' => 1.0,
                _ => return Err(invalid()),
            };
    }
    if !digits.is_empty() {
        return Err(invalid());
    }

    shift(clock, TimeDelta::seconds((sign * seconds).round() as i64))
}

fn between(
    start: NaiveDateTime,
    end: NaiveDateTime,
    rng: &mut dyn RngCore,
) -> Result<NaiveDateTime, ExprError> {
    let span = end.signed_duration_since(start).num_seconds();
    if span < 0 {
        return Err(ExprError::runtime("empty range for date generation"));
    }
    shift(start, TimeDelta::seconds(rng.random_range(0..=span)))
}

fn date_between(
    start: NaiveDate,
    end: NaiveDate,
    rng: &mut dyn RngCore,
) -> Result<GeneratedValue, ExprError> {
    let span = end.signed_duration_since(start).num_days();
    if span < 0 {
        return Err(ExprError::runtime("empty range for date generation"));
    }
    start
        .checked_add_signed(TimeDelta::days(rng.random_range(0..=span)))
        .map(GeneratedValue::Date)
        .ok_or_else(|| ExprError::runtime("date value out of range"))
}

fn epoch() -> NaiveDateTime {
    NaiveDateTime::default()
}

/// Date-valued Faker methods. `None` when `method` is not one of them.
pub fn generate(
    method: &str,
    args: &CallArgs,
    clock: NaiveDateTime,
    rng: &mut dyn RngCore,
) -> Option<Result<GeneratedValue, ExprError>> {
    generate_date(method, args, clock, rng).transpose()
}

fn generate_date(
    method: &str,
    args: &CallArgs,
    clock: NaiveDateTime,
    rng: &mut dyn RngCore,
) -> Result<Option<GeneratedValue>, ExprError> {
    let value = match method {
        "date_between" => {
            let start = resolve_moment(args.get(0, "start_date"), "-30y", clock)?;
            let end = resolve_moment(args.get(1, "end_date"), "today", clock)?;
            date_between(start.date(), end.date(), rng)
        }
        "date_time_between" => {
            let start = resolve_moment(args.get(0, "start_date"), "-30y", clock)?;
            let end = resolve_moment(args.get(1, "end_date"), "now", clock)?;
            between(start, end, rng).map(GeneratedValue::Timestamp)
        }
        "date_between_dates" => {
            let start = resolve_moment(args.get(0, "date_start"), "today", clock)?;
            let end = resolve_moment(args.get(1, "date_end"), "today", clock)?;
            date_between(start.date(), end.date(), rng)
        }
        "date_time_between_dates" => {
            let start = resolve_moment(args.get(0, "datetime_start"), "now", clock)?;
            let end = resolve_moment(args.get(1, "datetime_end"), "now", clock)?;
            between(start, end, rng).map(GeneratedValue::Timestamp)
        }
        "past_date" => {
            let start = resolve_moment(args.get(0, "start_date"), "-30d", clock)?;
            let end = clock.date() - TimeDelta::days(1);
            date_between(start.date(), end, rng)
        }
        "future_date" => {
            let end = resolve_moment(args.get(0, "end_date"), "+30d", clock)?;
            let start = clock.date() + TimeDelta::days(1);
            date_between(start, end.date(), rng)
        }
        "past_datetime" => {
            let start = resolve_moment(args.get(0, "start_date"), "-30d", clock)?;
            between(start, clock - TimeDelta::seconds(1), rng).map(GeneratedValue::Timestamp)
        }
        "future_datetime" => {
            let end = resolve_moment(args.get(0, "end_date"), "+30d", clock)?;
            between(clock + TimeDelta::seconds(1), end, rng).map(GeneratedValue::Timestamp)
        }
        "date_of_birth" => {
            let minimum = args.int(0, "minimum_age", 0)?;
            let maximum = args.int(1, "maximum_age", 115)?;
            if minimum < 0 || maximum < minimum {
                return Err(ExprError::runtime(
                    "date_of_birth() needs 0 <= minimum_age <= maximum_age",
                ));
            }
            let today = clock.date();
            let latest = years_before(today, minimum)?;
            let earliest = years_before(today, maximum + 1)? + TimeDelta::days(1);
            date_between(earliest, latest, rng)
        }
        "date_this_year" | "date_this_month" | "date_this_decade" | "date_this_century" => {
            let before = args.flag(0, "before_today", true);
            let after = args.flag(1, "after_today", false);
            let today = clock.date();
            let (first, next) = period_bounds(method, today)?;
            let (start, end) = match (before, after) {
                (true, true) => (first, next - TimeDelta::days(1)),
                (true, false) => (first, today),
                (false, true) => (today, next - TimeDelta::days(1)),
                (false, false) => return Ok(Some(GeneratedValue::Date(today))),
            };
            date_between(start, end, rng)
        }
        "date_time" | "date_time_ad" => {
            between(epoch(), clock, rng).map(GeneratedValue::Timestamp)
        }
        "date_object" => between(epoch(), clock, rng).map(|moment| GeneratedValue::Date(moment.date())),
        "time_object" => between(epoch(), clock, rng).map(|moment| GeneratedValue::Time(moment.time())),
        "date" | "time" | "iso8601" | "year" | "month" | "month_name" | "day_of_week"
        | "day_of_month" | "am_pm" => {
            let moment = between(epoch(), clock, rng)?;
            let default = match method {
                "date" => "%Y-%m-%d",
                "time" => "%H:%M:%S",
                "iso8601" => "%Y-%m-%dT%H:%M:%S",
                "year" => "%Y",
                "month" => "%m",
                "month_name" => "%B",
                "day_of_week" => "%A",
                "day_of_month" => "%d",
                _ => "%p",
            };
            let pattern = match method {
                "date" | "time" => args.text(0, "pattern")?,
                _ => None,
            };
            let pattern = pattern.as_deref().unwrap_or(default);
            strftime(&GeneratedValue::Timestamp(moment), pattern).map(GeneratedValue::Text)
        }
        "unix_time" => between(epoch(), clock, rng)
            .map(|moment| GeneratedValue::Int(moment.and_utc().timestamp())),
        _ => return Ok(None),
    }?;
    Ok(Some(value))
}

fn years_before(date: NaiveDate, years: i64) -> Result<NaiveDate, ExprError> {
    let year = i64::from(date.year()) - years;
    let year = i32::try_from(year).map_err(|_| ExprError::runtime("year out of range"))?;
    NaiveDate::from_ymd_opt(year, date.month(), date.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, date.month(), 28))
        .ok_or_else(|| ExprError::runtime("year out of range"))
}

fn period_bounds(method: &str, today: NaiveDate) -> Result<(NaiveDate, NaiveDate), ExprError> {
    let year = today.year();
    let bounds = match method {
        "date_this_month" => {
            let next = if today.month() == 12 {
                NaiveDate::from_ymd_opt(year + 1, 1, 1)
            } else {
                NaiveDate::from_ymd_opt(year, today.month() + 1, 1)
            };
            NaiveDate::from_ymd_opt(year, today.month(), 1).zip(next)
        }
        "date_this_decade" => {
            let start = year - year.rem_euclid(10);
            NaiveDate::from_ymd_opt(start, 1, 1).zip(NaiveDate::from_ymd_opt(start + 10, 1, 1))
        }
        "date_this_century" => {
            let start = year - year.rem_euclid(100);
            NaiveDate::from_ymd_opt(start, 1, 1).zip(NaiveDate::from_ymd_opt(start + 100, 1, 1))
        }
        _ => NaiveDate::from_ymd_opt(year, 1, 1).zip(NaiveDate::from_ymd_opt(year + 1, 1, 1)),
    };
    bounds.ok_or_else(|| ExprError::runtime("date value out of range"))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn clock() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn relative_bounds_follow_faker_units() {
        let moment = parse_relative("-2w", clock()).unwrap();
        assert_eq!(moment.date(), NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        let moment = parse_relative("+1d12h", clock()).unwrap();
        assert_eq!(moment, clock() + TimeDelta::hours(36));
        assert!(parse_relative("-3x", clock()).is_err());
        assert!(parse_relative("soon", clock()).is_err());
    }

    #[test]
    fn date_between_stays_inside_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let args = CallArgs::new(vec!["-1y".into(), "today".into()]);
        for _ in 0..100 {
            let value = generate("date_between", &args, clock(), &mut rng).unwrap().unwrap();
            let GeneratedValue::Date(date) = value else {
                panic!("expected a date");
            };
            assert!(date <= clock().date());
            assert!(date >= NaiveDate::from_ymd_opt(2023, 6, 15).unwrap());
        }
    }

    #[test]
    fn reversed_bounds_are_an_error() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let args = CallArgs::new(vec!["today".into(), "-1y".into()]);
        assert!(generate("date_between", &args, clock(), &mut rng).unwrap().is_err());
        assert!(generate("not_a_date_method", &args, clock(), &mut rng).is_none());
    }

    #[test]
    fn date_of_birth_respects_ages() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let args = CallArgs::new(vec![GeneratedValue::Int(18), GeneratedValue::Int(20)]);
        for _ in 0..50 {
            let value = generate("date_of_birth", &args, clock(), &mut rng).unwrap().unwrap();
            let date = value.as_date().unwrap();
            assert!(date <= NaiveDate::from_ymd_opt(2006, 6, 15).unwrap());
            assert!(date > NaiveDate::from_ymd_opt(2003, 6, 15).unwrap());
        }
    }
}
