//! Calendar date and time-of-day parsing helpers

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Two-digit years at or above this value belong to the 1900s, below it to the 2000s.
const TWO_DIGIT_YEAR_PIVOT: i32 = 69;

/// Order of the day, month and year parts in a date string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DateOrder {
    /// Month/day/year, e.g. `1/22/20` or `03/27/2006`
    #[default]
    Mdy,
    /// Day/month/year, e.g. `22/1/20`
    Dmy,
    /// Year-month-day, e.g. `2020-01-22`
    Ymd,
}

impl fmt::Display for DateOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateOrder::Mdy => write!(f, "month/day/year"),
            DateOrder::Dmy => write!(f, "day/month/year"),
            DateOrder::Ymd => write!(f, "year-month-day"),
        }
    }
}

impl DateOrder {
    /// Parse `text` as a calendar date in this order.
    ///
    /// Parts may be separated by `/` or `-`. Years may have two or four digits;
    /// two-digit years pivot at 69 (69-99 map to 19xx, 00-68 to 20xx).
    pub fn parse(&self, text: &str) -> Option<NaiveDate> {
        let parts: Vec<&str> = text.trim().split(['/', '-']).collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty() || p.len() > 4) {
            return None;
        }
        if !parts.iter().all(|p| p.chars().all(|c| c.is_ascii_digit())) {
            return None;
        }

        let (year, month, day) = match self {
            DateOrder::Mdy => (parts[2], parts[0], parts[1]),
            DateOrder::Dmy => (parts[2], parts[1], parts[0]),
            DateOrder::Ymd => (parts[0], parts[1], parts[2]),
        };

        if month.len() > 2 || day.len() > 2 {
            return None;
        }
        let year = parse_year(year)?;
        let month: u32 = month.parse().ok()?;
        let day: u32 = day.parse().ok()?;

        NaiveDate::from_ymd_opt(year, month, day)
    }
}

fn parse_year(text: &str) -> Option<i32> {
    let value: i32 = text.parse().ok()?;
    match text.len() {
        2 if value >= TWO_DIGIT_YEAR_PIVOT => Some(1900 + value),
        2 => Some(2000 + value),
        4 => Some(value),
        _ => None,
    }
}

/// Recognise a date in any of the patterns the loader infers: ISO `YYYY-MM-DD`
/// or `M/D/Y` with slashes.
pub fn parse_inferred_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if trimmed.contains('/') {
        DateOrder::Mdy.parse(trimmed)
    } else if trimmed.len() == 10 && trimmed.as_bytes()[4] == b'-' {
        DateOrder::Ymd.parse(trimmed)
    } else {
        None
    }
}

/// Extract the hour from a `H:MM` or `H:MM:SS` time of day.
pub fn parse_hour_of_day(text: &str) -> Option<i64> {
    let mut parts = text.trim().split(':');
    let hour: i64 = parts.next()?.parse().ok()?;
    let minute: i64 = parts.next()?.parse().ok()?;
    let second: i64 = match parts.next() {
        Some(s) => s.parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    if (0..24).contains(&hour) && (0..60).contains(&minute) && (0..61).contains(&second) {
        Some(hour)
    } else {
        None
    }
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// Days since 1970-01-01, the physical representation of a polars `Date`.
pub fn date_to_days(date: NaiveDate) -> i32 {
    (date - epoch()).num_days() as i32
}

pub fn days_to_date(days: i32) -> NaiveDate {
    epoch() + Duration::days(days as i64)
}

/// Calendar year of a date as an integer cell value.
pub fn year_of(date: NaiveDate) -> i64 {
    date.year() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_mdy_two_digit_year() {
        assert_eq!(DateOrder::Mdy.parse("1/22/20"), Some(ymd(2020, 1, 22)));
        assert_eq!(DateOrder::Mdy.parse("12/31/99"), Some(ymd(1999, 12, 31)));
        assert_eq!(DateOrder::Mdy.parse("3/1/68"), Some(ymd(2068, 3, 1)));
    }

    #[test]
    fn test_mdy_four_digit_year() {
        assert_eq!(DateOrder::Mdy.parse("03/27/2006"), Some(ymd(2006, 3, 27)));
    }

    #[test]
    fn test_ymd_and_dmy() {
        assert_eq!(DateOrder::Ymd.parse("2020-01-22"), Some(ymd(2020, 1, 22)));
        assert_eq!(DateOrder::Dmy.parse("22/1/2020"), Some(ymd(2020, 1, 22)));
    }

    #[test]
    fn test_rejects_invalid_dates() {
        assert_eq!(DateOrder::Mdy.parse("13/1/20"), None);
        assert_eq!(DateOrder::Mdy.parse("2/30/20"), None);
        assert_eq!(DateOrder::Mdy.parse("1/2"), None);
        assert_eq!(DateOrder::Mdy.parse("a/b/c"), None);
        assert_eq!(DateOrder::Mdy.parse("1/1/202"), None);
        assert_eq!(DateOrder::Mdy.parse(""), None);
    }

    #[test]
    fn test_inferred_patterns() {
        assert_eq!(parse_inferred_date("2021-06-30"), Some(ymd(2021, 6, 30)));
        assert_eq!(parse_inferred_date("6/30/21"), Some(ymd(2021, 6, 30)));
        assert_eq!(parse_inferred_date("20210630"), None);
        assert_eq!(parse_inferred_date("hello"), None);
    }

    #[test]
    fn test_hour_of_day() {
        assert_eq!(parse_hour_of_day("23:51:00"), Some(23));
        assert_eq!(parse_hour_of_day("0:05"), Some(0));
        assert_eq!(parse_hour_of_day("24:00:00"), None);
        assert_eq!(parse_hour_of_day("noon"), None);
        assert_eq!(parse_hour_of_day("1:2:3:4"), None);
    }

    #[test]
    fn test_days_round_trip() {
        let date = ymd(2020, 1, 22);
        assert_eq!(date_to_days(ymd(1970, 1, 1)), 0);
        assert_eq!(days_to_date(date_to_days(date)), date);
        assert_eq!(days_to_date(-1), ymd(1969, 12, 31));
    }
}
