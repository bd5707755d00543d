//! Wall-clock time helpers and the natural-language time expression parser.
//!
//! All times are local naive timestamps; the bot does no timezone handling.

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;
use std::sync::Mutex;

/// Storage format for timestamps in SQLite (sortable ISO-8601).
pub const STORAGE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// The phrase did not match any supported pattern, or named a time that
/// is not in the future.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseFailure;

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("time expression not recognized")
    }
}

impl std::error::Error for ParseFailure {}

/// What to do when a rule produces an instant that is not after `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PastPolicy {
    Reject,
    RollForwardOneDay,
}

struct Rule {
    name: &'static str,
    extract: fn(&str, NaiveDateTime) -> Option<NaiveDateTime>,
    past: PastPolicy,
}

/// Evaluated top to bottom; the first rule whose extractor matches decides.
const RULES: &[Rule] = &[
    Rule { name: "tomorrow_at", extract: tomorrow_at, past: PastPolicy::Reject },
    Rule { name: "today_at", extract: today_at, past: PastPolicy::Reject },
    Rule { name: "in_hours", extract: in_hours, past: PastPolicy::Reject },
    Rule { name: "in_minutes", extract: in_minutes, past: PastPolicy::Reject },
    Rule { name: "in_days", extract: in_days, past: PastPolicy::Reject },
    Rule { name: "iso_datetime", extract: iso_datetime, past: PastPolicy::Reject },
    Rule { name: "dotted_datetime", extract: dotted_datetime, past: PastPolicy::Reject },
    Rule { name: "month_name_datetime", extract: month_name_datetime, past: PastPolicy::Reject },
    Rule { name: "bare_time", extract: bare_time, past: PastPolicy::RollForwardOneDay },
];

/// Month names accepted by the long-form date rule.
const MONTHS: &[(&str, u32)] = &[
    ("января", 1),
    ("февраля", 2),
    ("марта", 3),
    ("апреля", 4),
    ("мая", 5),
    ("июня", 6),
    ("июля", 7),
    ("августа", 8),
    ("сентября", 9),
    ("октября", 10),
    ("ноября", 11),
    ("декабря", 12),
    ("january", 1),
    ("february", 2),
    ("march", 3),
    ("april", 4),
    ("may", 5),
    ("june", 6),
    ("july", 7),
    ("august", 8),
    ("september", 9),
    ("october", 10),
    ("november", 11),
    ("december", 12),
];

/// Converts a free-text phrase into an absolute timestamp after `now`.
///
/// Supported phrases, in priority order:
/// `tomorrow at HH:MM`, `today at HH:MM`, `in N hours`, `in N minutes`,
/// `in N days`, `YYYY-MM-DD HH:MM`, `DD.MM.YYYY HH:MM`,
/// `DD <month> YYYY HH:MM` and a bare `HH:MM`.
///
/// Only the bare `HH:MM` form moves to the next day when the time has
/// already passed today; every other form fails instead.
///
/// ```
/// use chrono::NaiveDate;
/// use todo_reminder_bot::utils::datetime::parse_time_expression;
///
/// let now = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(10, 0, 0).unwrap();
/// let at = parse_time_expression("in 2 hours", now).unwrap();
/// assert_eq!(at, now + chrono::Duration::hours(2));
/// ```
pub fn parse_time_expression(phrase: &str, now: NaiveDateTime) -> Result<NaiveDateTime, ParseFailure> {
    let input = phrase.trim().to_lowercase();

    for rule in RULES {
        let Some(candidate) = (rule.extract)(&input, now) else {
            continue;
        };

        if candidate > now {
            tracing::debug!("Time phrase '{}' matched rule {} -> {}", input, rule.name, candidate);
            return Ok(candidate);
        }

        return match rule.past {
            PastPolicy::RollForwardOneDay => candidate
                .checked_add_signed(Duration::days(1))
                .ok_or(ParseFailure),
            PastPolicy::Reject => {
                tracing::debug!("Time phrase '{}' matched rule {} but {} is not in the future", input, rule.name, candidate);
                Err(ParseFailure)
            }
        };
    }

    Err(ParseFailure)
}

fn tomorrow_at(input: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let time = parse_clock(input.strip_prefix("tomorrow at ")?)?;
    let date = now.date().succ_opt()?;
    Some(date.and_time(time))
}

fn today_at(input: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let time = parse_clock(input.strip_prefix("today at ")?)?;
    Some(now.date().and_time(time))
}

fn in_hours(input: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let amount = parse_relative(input, &["hour", "hours"])?;
    now.checked_add_signed(Duration::try_hours(amount)?)
}

fn in_minutes(input: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let amount = parse_relative(input, &["minute", "minutes"])?;
    now.checked_add_signed(Duration::try_minutes(amount)?)
}

fn in_days(input: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let amount = parse_relative(input, &["day", "days"])?;
    now.checked_add_signed(Duration::try_days(amount)?)
}

fn iso_datetime(input: &str, _now: NaiveDateTime) -> Option<NaiveDateTime> {
    let (date, time) = input.split_once(' ')?;
    let mut parts = date.split('-');
    let year = parse_fixed_digits(parts.next()?, 4)?;
    let month = parse_fixed_digits(parts.next()?, 2)?;
    let day = parse_fixed_digits(parts.next()?, 2)?;
    if parts.next().is_some() {
        return None;
    }
    let date = NaiveDate::from_ymd_opt(year as i32, month, day)?;
    Some(date.and_time(parse_clock(time)?))
}

fn dotted_datetime(input: &str, _now: NaiveDateTime) -> Option<NaiveDateTime> {
    let (date, time) = input.split_once(' ')?;
    let mut parts = date.split('.');
    let day = parse_fixed_digits(parts.next()?, 2)?;
    let month = parse_fixed_digits(parts.next()?, 2)?;
    let year = parse_fixed_digits(parts.next()?, 4)?;
    if parts.next().is_some() {
        return None;
    }
    let date = NaiveDate::from_ymd_opt(year as i32, month, day)?;
    Some(date.and_time(parse_clock(time)?))
}

fn month_name_datetime(input: &str, _now: NaiveDateTime) -> Option<NaiveDateTime> {
    let tokens: Vec<&str> = input.split_whitespace().collect();
    let [day, month, year, time] = tokens.as_slice() else {
        return None;
    };

    let day = parse_digits(day, 1, 2)?;
    let month = MONTHS
        .iter()
        .find(|(name, _)| name == month)
        .map(|(_, number)| *number)?;
    let year = parse_fixed_digits(year, 4)?;

    let date = NaiveDate::from_ymd_opt(year as i32, month, day)?;
    Some(date.and_time(parse_clock(time)?))
}

fn bare_time(input: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    Some(now.date().and_time(parse_clock(input)?))
}

/// `HH:MM` with a 1-2 digit hour and a 2 digit minute.
fn parse_clock(input: &str) -> Option<NaiveTime> {
    let (hour, minute) = input.split_once(':')?;
    let hour = parse_digits(hour, 1, 2)?;
    let minute = parse_fixed_digits(minute, 2)?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// `in N <unit>` where the unit is one of `units`.
fn parse_relative(input: &str, units: &[&str]) -> Option<i64> {
    let rest = input.strip_prefix("in ")?;
    let (amount, unit) = rest.split_once(' ')?;
    if !units.contains(&unit) {
        return None;
    }
    parse_digits(amount, 1, 10).map(i64::from)
}

fn parse_fixed_digits(input: &str, width: usize) -> Option<u32> {
    parse_digits(input, width, width)
}

fn parse_digits(input: &str, min: usize, max: usize) -> Option<u32> {
    if input.len() < min || input.len() > max || !input.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    input.parse().ok()
}

/// Source of "now" for everything that validates against the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: NaiveDateTime) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Human-readable form used in replies, e.g. `31.12.2024 23:59`.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format("%d.%m.%Y %H:%M").to_string()
}

pub fn to_storage(ts: &NaiveDateTime) -> String {
    ts.format(STORAGE_FORMAT).to_string()
}

pub fn from_storage(raw: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw, STORAGE_FORMAT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, 0))
            .unwrap()
    }

    #[test]
    fn test_in_hours_from_morning() {
        let now = at(2024, 6, 1, 10, 0);
        assert_eq!(parse_time_expression("in 2 hours", now), Ok(at(2024, 6, 1, 12, 0)));
        assert_eq!(parse_time_expression("in 1 hour", now), Ok(at(2024, 6, 1, 11, 0)));
    }

    #[test]
    fn test_bare_time_rolls_forward_when_passed() {
        let now = at(2024, 6, 1, 23, 50);
        assert_eq!(parse_time_expression("15:30", now), Ok(at(2024, 6, 2, 15, 30)));
    }

    #[test]
    fn test_bare_time_later_today() {
        let now = at(2024, 6, 1, 10, 0);
        assert_eq!(parse_time_expression("15:30", now), Ok(at(2024, 6, 1, 15, 30)));
        assert_eq!(parse_time_expression("9:05", now), Ok(at(2024, 6, 2, 9, 5)));
    }

    #[test]
    fn test_bare_time_equal_to_now_rolls_forward() {
        let now = at(2024, 6, 1, 10, 0);
        assert_eq!(parse_time_expression("10:00", now), Ok(at(2024, 6, 2, 10, 0)));
    }

    #[test]
    fn test_today_in_the_past_is_rejected() {
        let now = at(2024, 6, 1, 16, 0);
        assert_eq!(parse_time_expression("today at 15:30", now), Err(ParseFailure));
        assert_eq!(parse_time_expression("today at 18:15", now), Ok(at(2024, 6, 1, 18, 15)));
    }

    #[test]
    fn test_tomorrow_zeroes_seconds() {
        let now = at(2024, 6, 1, 10, 0) + Duration::seconds(42);
        assert_eq!(parse_time_expression("Tomorrow at 08:00", now), Ok(at(2024, 6, 2, 8, 0)));
    }

    #[test]
    fn test_tomorrow_across_month_end() {
        let now = at(2024, 6, 30, 22, 0);
        assert_eq!(parse_time_expression("tomorrow at 7:15", now), Ok(at(2024, 7, 1, 7, 15)));
    }

    #[test]
    fn test_relative_units() {
        let now = at(2024, 6, 1, 10, 0);
        assert_eq!(parse_time_expression("in 45 minutes", now), Ok(at(2024, 6, 1, 10, 45)));
        assert_eq!(parse_time_expression("in 1 minute", now), Ok(at(2024, 6, 1, 10, 1)));
        assert_eq!(parse_time_expression("in 3 days", now), Ok(at(2024, 6, 4, 10, 0)));
        assert_eq!(parse_time_expression("  IN 1 DAY  ", now), Ok(at(2024, 6, 2, 10, 0)));
    }

    #[test]
    fn test_relative_zero_is_not_future() {
        let now = at(2024, 6, 1, 10, 0);
        assert_eq!(parse_time_expression("in 0 hours", now), Err(ParseFailure));
    }

    #[test]
    fn test_relative_overflow_is_failure() {
        let now = at(2024, 6, 1, 10, 0);
        assert_eq!(parse_time_expression("in 4294967295 days", now), Err(ParseFailure));
        assert_eq!(parse_time_expression("in 99999999999999999999 hours", now), Err(ParseFailure));
    }

    #[test]
    fn test_relative_rejects_signs_and_garbage() {
        let now = at(2024, 6, 1, 10, 0);
        assert_eq!(parse_time_expression("in -2 hours", now), Err(ParseFailure));
        assert_eq!(parse_time_expression("in +2 hours", now), Err(ParseFailure));
        assert_eq!(parse_time_expression("in two hours", now), Err(ParseFailure));
        assert_eq!(parse_time_expression("in 2 weeks", now), Err(ParseFailure));
    }

    #[test]
    fn test_iso_datetime() {
        let now = at(2024, 6, 1, 10, 0);
        assert_eq!(parse_time_expression("2024-12-31 23:59", now), Ok(at(2024, 12, 31, 23, 59)));
        assert_eq!(parse_time_expression("2024-05-31 23:59", now), Err(ParseFailure));
    }

    #[test]
    fn test_dotted_datetime() {
        let now = at(2024, 6, 1, 10, 0);
        assert_eq!(parse_time_expression("31.12.2024 23:59", now), Ok(at(2024, 12, 31, 23, 59)));
        assert_eq!(parse_time_expression("01.06.2024 09:00", now), Err(ParseFailure));
    }

    #[test]
    fn test_invalid_calendar_dates_fail() {
        let now = at(2024, 1, 1, 10, 0);
        assert_eq!(parse_time_expression("31.02.2024 10:00", now), Err(ParseFailure));
        assert_eq!(parse_time_expression("2024-13-01 10:00", now), Err(ParseFailure));
        assert_eq!(parse_time_expression("2024-02-30 10:00", now), Err(ParseFailure));
        assert_eq!(parse_time_expression("29.02.2024 10:00", now), Ok(at(2024, 2, 29, 10, 0)));
    }

    #[test]
    fn test_month_names() {
        let now = at(2024, 6, 1, 10, 0);
        assert_eq!(parse_time_expression("5 июля 2024 18:00", now), Ok(at(2024, 7, 5, 18, 0)));
        assert_eq!(parse_time_expression("31 Декабря 2024 23:59", now), Ok(at(2024, 12, 31, 23, 59)));
        assert_eq!(parse_time_expression("14 september 2024 09:30", now), Ok(at(2024, 9, 14, 9, 30)));
        assert_eq!(parse_time_expression("5 июнтября 2024 18:00", now), Err(ParseFailure));
        assert_eq!(parse_time_expression("1 января 2024 12:00", now), Err(ParseFailure));
    }

    #[test]
    fn test_out_of_range_clock_values() {
        let now = at(2024, 6, 1, 10, 0);
        assert_eq!(parse_time_expression("24:00", now), Err(ParseFailure));
        assert_eq!(parse_time_expression("12:60", now), Err(ParseFailure));
        assert_eq!(parse_time_expression("tomorrow at 25:00", now), Err(ParseFailure));
        assert_eq!(parse_time_expression("12:5", now), Err(ParseFailure));
        assert_eq!(parse_time_expression("123:45", now), Err(ParseFailure));
    }

    #[test]
    fn test_unsupported_phrases() {
        let now = at(2024, 6, 1, 10, 0);
        for phrase in [
            "",
            "   ",
            "tomorrow",
            "next friday",
            "buy milk tomorrow at 15:30",
            "tomorrow at",
            "today at noon",
            "in hours",
            "2024-06-02",
            "2024/06/02 10:00",
            "02.06.24 10:00",
            "2024-06-02 10:00 extra",
            "15:30:00",
            "🙂",
        ] {
            assert_eq!(parse_time_expression(phrase, now), Err(ParseFailure), "phrase: {phrase:?}");
        }
    }

    #[test]
    fn test_results_are_always_after_now() {
        let now = at(2024, 6, 1, 12, 0);
        for phrase in [
            "tomorrow at 00:00",
            "today at 12:01",
            "in 1 minute",
            "in 5 hours",
            "in 2 days",
            "2030-01-01 00:00",
            "01.01.2030 00:00",
            "1 января 2030 00:00",
            "00:00",
            "12:00",
            "23:59",
        ] {
            let parsed = parse_time_expression(phrase, now);
            assert!(matches!(parsed, Ok(ts) if ts > now), "phrase: {phrase:?} -> {parsed:?}");
        }
    }

    #[test]
    fn test_storage_format_roundtrip() {
        let ts = at(2024, 6, 1, 10, 0) + Duration::milliseconds(250);
        let raw = to_storage(&ts);
        assert_eq!(raw, "2024-06-01T10:00:00.250");
        assert_eq!(from_storage(&raw).unwrap(), ts);
        assert_eq!(from_storage("2024-06-01T10:00:00").unwrap(), at(2024, 6, 1, 10, 0));
    }

    #[test]
    fn test_fixed_clock_moves_only_when_told() {
        let clock = FixedClock::new(at(2024, 6, 1, 10, 0));
        assert_eq!(clock.now(), at(2024, 6, 1, 10, 0));
        clock.advance(Duration::minutes(30));
        assert_eq!(clock.now(), at(2024, 6, 1, 10, 30));
        clock.set(at(2025, 1, 1, 0, 0));
        assert_eq!(clock.now(), at(2025, 1, 1, 0, 0));
    }
}
