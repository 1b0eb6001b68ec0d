// src/utils/date.rs

//! Calendar helpers for logical run dates.

use chrono::{Days, NaiveDate};

use crate::error::{AppError, Result};

/// Date format used in run contexts and folder names.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a `YYYY-MM-DD` string.
pub fn parse_date(date: &str) -> Result<NaiveDate> {
    Ok(NaiveDate::parse_from_str(date.trim(), DATE_FORMAT)?)
}

/// The calendar day immediately preceding `date`.
///
/// Fails for the first representable date instead of saturating.
pub fn previous_day(date: NaiveDate) -> Result<NaiveDate> {
    date.checked_sub_days(Days::new(1))
        .ok_or_else(|| AppError::validation(format!("no day before {}", date)))
}

/// Shift a `YYYY-MM-DD` string back by one day.
///
/// Malformed input is reported as an error rather than guessed at.
pub fn yesterday(date: &str) -> Result<String> {
    let day = previous_day(parse_date(date)?)?;
    Ok(day.format(DATE_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yesterday_same_month() {
        assert_eq!(yesterday("2023-03-15").unwrap(), "2023-03-14");
    }

    #[test]
    fn test_yesterday_month_boundary() {
        assert_eq!(yesterday("2023-03-01").unwrap(), "2023-02-28");
        assert_eq!(yesterday("2023-05-01").unwrap(), "2023-04-30");
    }

    #[test]
    fn test_yesterday_leap_year() {
        assert_eq!(yesterday("2024-03-01").unwrap(), "2024-02-29");
    }

    #[test]
    fn test_yesterday_year_boundary() {
        assert_eq!(yesterday("2024-01-01").unwrap(), "2023-12-31");
    }

    #[test]
    fn test_previous_day_of_first_date_fails() {
        assert!(previous_day(NaiveDate::MIN).is_err());
        assert_eq!(
            previous_day(NaiveDate::from_ymd_opt(2023, 3, 1).unwrap()).unwrap(),
            NaiveDate::from_ymd_opt(2023, 2, 28).unwrap()
        );
    }

    #[test]
    fn test_yesterday_rejects_malformed() {
        assert!(yesterday("2023-13-01").is_err());
        assert!(yesterday("yesterday").is_err());
    }
}
