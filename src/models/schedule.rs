//! Cron schedules and logical-date computation.
//!
//! A run whose logical date is fire time `t_k` becomes due once the next
//! fire time `t_{k+1}` has passed, so a daily schedule runs the previous
//! day's interval.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::error::{AppError, Result};

/// A parsed five-field cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    minutes: BTreeSet<u32>,
    hours: BTreeSet<u32>,
    days_of_month: BTreeSet<u32>,
    months: BTreeSet<u32>,
    days_of_week: BTreeSet<u32>,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronExpr {
    /// Parse `minute hour day-of-month month day-of-week`.
    pub fn parse(expr: &str) -> Result<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(AppError::validation(format!(
                "cron expression '{}' must have 5 fields, found {}",
                expr,
                fields.len()
            )));
        }

        let mut days_of_week = parse_field(fields[4], 0, 7, expr)?;
        if days_of_week.remove(&7) {
            days_of_week.insert(0);
        }

        Ok(Self {
            source: fields.join(" "),
            minutes: parse_field(fields[0], 0, 59, expr)?,
            hours: parse_field(fields[1], 0, 23, expr)?,
            days_of_month: parse_field(fields[2], 1, 31, expr)?,
            months: parse_field(fields[3], 1, 12, expr)?,
            days_of_week,
            dom_restricted: !fields[2].starts_with('*'),
            dow_restricted: !fields[4].starts_with('*'),
        })
    }

    /// Whether the expression fires on this calendar day.
    pub fn matches_day(&self, day: NaiveDate) -> bool {
        if !self.months.contains(&day.month()) {
            return false;
        }
        let dom = self.days_of_month.contains(&day.day());
        let dow = self
            .days_of_week
            .contains(&day.weekday().num_days_from_sunday());

        // Either day field matching is enough only when both are restricted.
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }

    /// Whether the expression fires at this minute.
    pub fn matches(&self, at: NaiveDateTime) -> bool {
        self.matches_day(at.date())
            && self.hours.contains(&at.hour())
            && self.minutes.contains(&at.minute())
    }

    /// Fire times on `day`, in order.
    fn times_on(&self, day: NaiveDate) -> impl Iterator<Item = NaiveDateTime> + '_ {
        let matched = self.matches_day(day);
        self.hours
            .iter()
            .filter(move |_| matched)
            .flat_map(move |&h| {
                self.minutes.iter().filter_map(move |&m| {
                    NaiveTime::from_hms_opt(h, m, 0).map(|t| day.and_time(t))
                })
            })
    }

    /// Fire times in `[from, until]`, in order.
    pub fn fire_times_between(
        &self,
        from: NaiveDateTime,
        until: NaiveDateTime,
    ) -> impl Iterator<Item = NaiveDateTime> + '_ {
        from.date()
            .iter_days()
            .take_while(move |day| *day <= until.date())
            .flat_map(move |day| self.times_on(day))
            .filter(move |t| *t >= from && *t <= until)
    }
}

impl FromStr for CronExpr {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_field(field: &str, min: u32, max: u32, expr: &str) -> Result<BTreeSet<u32>> {
    let invalid = |reason: &str| {
        AppError::validation(format!(
            "cron expression '{}': field '{}' {}",
            expr, field, reason
        ))
    };
    let number = |s: &str| -> Result<u32> {
        let n: u32 = s.parse().map_err(|_| invalid("is not a number"))?;
        if n < min || n > max {
            return Err(invalid(&format!("is outside {}-{}", min, max)));
        }
        Ok(n)
    };

    let mut values = BTreeSet::new();
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.parse().map_err(|_| invalid("has a bad step"))?;
                if step == 0 {
                    return Err(invalid("has a zero step"));
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (lo, hi) = if range == "*" {
            (min, max)
        } else if let Some((lo, hi)) = range.split_once('-') {
            (number(lo)?, number(hi)?)
        } else {
            let n = number(range)?;
            // "5/15" means from 5 to the end in steps of 15
            if part.contains('/') { (n, max) } else { (n, n) }
        };

        if lo > hi {
            return Err(invalid("has an empty range"));
        }
        values.extend((lo..=hi).step_by(step as usize));
    }

    if values.is_empty() {
        return Err(invalid("matches nothing"));
    }
    Ok(values)
}

/// When and how often a DAG runs.
#[derive(Debug, Clone)]
pub struct Schedule {
    /// Fire times
    pub cron: CronExpr,

    /// First logical date considered
    pub start_date: NaiveDate,

    /// Run every missed interval since `start_date`, not just the latest
    pub catchup: bool,

    /// Maximum runs of this DAG executing at once
    pub max_active_runs: usize,
}

impl Schedule {
    pub fn new(cron: &str, start_date: NaiveDate) -> Result<Self> {
        Ok(Self {
            cron: CronExpr::parse(cron)?,
            start_date,
            catchup: false,
            max_active_runs: 1,
        })
    }

    pub fn with_catchup(mut self, catchup: bool) -> Self {
        self.catchup = catchup;
        self
    }

    pub fn with_max_active_runs(mut self, max_active_runs: usize) -> Self {
        self.max_active_runs = max_active_runs.max(1);
        self
    }

    /// Logical dates whose interval has closed by `now`.
    ///
    /// With catch-up disabled only the most recent one is returned.
    pub fn due_runs(&self, now: NaiveDateTime) -> Vec<NaiveDateTime> {
        let start = self.start_date.and_time(NaiveTime::MIN);
        let mut fires = self.cron.fire_times_between(start, now);

        let mut due = Vec::new();
        let Some(mut current) = fires.next() else {
            return due;
        };
        for next in fires {
            due.push(current);
            current = next;
        }

        if !self.catchup {
            due = due.pop().into_iter().collect();
        }
        due
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' from {} (catchup: {}, max active runs: {})",
            self.cron, self.start_date, self.catchup, self.max_active_runs
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_parse_fields() {
        let cron = CronExpr::parse("30 11 * * 1").unwrap();
        // 2023-01-02 was a Monday
        assert!(cron.matches(at(2023, 1, 2, 11, 30)));
        assert!(!cron.matches(at(2023, 1, 3, 11, 30)));
        assert!(!cron.matches(at(2023, 1, 2, 11, 31)));
    }

    #[test]
    fn test_parse_lists_ranges_steps() {
        let cron = CronExpr::parse("*/15 9-17 1,15 * *").unwrap();
        assert!(cron.matches(at(2023, 6, 15, 9, 45)));
        assert!(!cron.matches(at(2023, 6, 15, 18, 0)));
        assert!(!cron.matches(at(2023, 6, 16, 9, 0)));
    }

    #[test]
    fn test_sunday_as_seven() {
        let cron = CronExpr::parse("0 0 * * 7").unwrap();
        // 2023-01-01 was a Sunday
        assert!(cron.matches(at(2023, 1, 1, 0, 0)));
    }

    #[test]
    fn test_dom_or_dow_when_both_restricted() {
        let cron = CronExpr::parse("0 0 13 * 5").unwrap();
        // 2023-01-06 is a Friday, 2023-01-13 is the 13th
        assert!(cron.matches(at(2023, 1, 6, 0, 0)));
        assert!(cron.matches(at(2023, 1, 13, 0, 0)));
        assert!(!cron.matches(at(2023, 1, 7, 0, 0)));
    }

    #[test]
    fn test_stepped_wildcard_day_needs_both_fields() {
        // `*/2` on day-of-month is odd days; with a weekday both must hold.
        let cron = CronExpr::parse("0 0 */2 * 1").unwrap();
        // 2023-01-09 is an odd Monday, 2023-01-02 an even Monday, 2023-01-03 an odd Tuesday
        assert!(cron.matches(at(2023, 1, 9, 0, 0)));
        assert!(!cron.matches(at(2023, 1, 2, 0, 0)));
        assert!(!cron.matches(at(2023, 1, 3, 0, 0)));
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(CronExpr::parse("* * * *").is_err());
        assert!(CronExpr::parse("60 * * * *").is_err());
        assert!(CronExpr::parse("*/0 * * * *").is_err());
        assert!(CronExpr::parse("5-1 * * * *").is_err());
        assert!(CronExpr::parse("a * * * *").is_err());
    }

    #[test]
    fn test_due_runs_with_catchup() {
        let schedule = Schedule::new("00 10 * * *", NaiveDate::from_ymd_opt(2023, 3, 10).unwrap())
            .unwrap()
            .with_catchup(true)
            .with_max_active_runs(5);

        // The 2023-03-12 interval closes at 2023-03-13 10:00.
        let due = schedule.due_runs(at(2023, 3, 13, 10, 0));
        assert_eq!(
            due,
            vec![at(2023, 3, 10, 10, 0), at(2023, 3, 11, 10, 0), at(2023, 3, 12, 10, 0)]
        );

        let due = schedule.due_runs(at(2023, 3, 13, 9, 59));
        assert_eq!(due.len(), 2);
    }

    #[test]
    fn test_due_runs_without_catchup() {
        let schedule =
            Schedule::new("30 11 * * 1", NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()).unwrap();

        let due = schedule.due_runs(at(2023, 2, 1, 0, 0));
        // Mondays 2023-01-02 .. 2023-01-30; the 30th's interval is still open.
        assert_eq!(due, vec![at(2023, 1, 23, 11, 30)]);
    }

    #[test]
    fn test_due_runs_before_start() {
        let schedule =
            Schedule::new("00 10 * * *", NaiveDate::from_ymd_opt(2023, 3, 10).unwrap()).unwrap();
        assert!(schedule.due_runs(at(2023, 3, 1, 0, 0)).is_empty());
    }
}
