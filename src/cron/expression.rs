//! Cron expression evaluation.
//!
//! Accepts 5 fields (minute hour day-of-month month day-of-week), 6 fields
//! with a leading seconds field, or 7 fields with an additional trailing year
//! field. [`CronExpression::next_time_after`] computes the next trigger time
//! strictly after a given instant by aligning each calendar field in turn.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};

use crate::cron::error::CronError;
use crate::cron::field::{DAY_NAMES, MONTH_NAMES, parse_field};

const MIN_YEAR: u32 = 1970;
const MAX_YEAR: u32 = 2199;

/// Search horizon when no year field constrains the expression. Four years
/// covers every leap-day schedule; anything unmatched by then (e.g. Feb 31)
/// can never fire.
const HORIZON_DAYS: i64 = 4 * 366;

/// Allowed values of one small-domain cron field, as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldMask(u64);

impl FieldMask {
    fn any(min: u32, max: u32) -> Self {
        let mut mask = 0u64;
        for value in min..=max {
            mask |= 1 << value;
        }
        Self(mask)
    }

    fn from_values(values: &[u32]) -> Self {
        let mut mask = 0u64;
        for &value in values {
            mask |= 1 << value;
        }
        Self(mask)
    }

    fn contains(self, value: u32) -> bool {
        value < 64 && self.0 >> value & 1 == 1
    }
}

/// A parsed cron schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpression {
    expression: String,
    seconds: FieldMask,
    minutes: FieldMask,
    hours: FieldMask,
    days_of_month: FieldMask,
    months: FieldMask,
    days_of_week: FieldMask,
    years: Option<BTreeSet<u32>>,
}

impl CronExpression {
    /// Parse a 5 to 7 field cron schedule string.
    pub fn parse(expression: &str) -> Result<Self, CronError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if !(5..=7).contains(&fields.len()) {
            return Err(CronError::FieldCount(fields.len()));
        }

        let with_seconds = fields.len() > 5;
        let mut ix = 0;

        let seconds = if with_seconds {
            let parsed = parse_field("second", fields[ix], 0, 59, &[], 0)?;
            ix += 1;
            mask(parsed, 0, 59)
        } else {
            // a 5 field schedule fires at second zero
            FieldMask::from_values(&[0])
        };

        let minutes = mask(parse_field("minute", fields[ix], 0, 59, &[], 0)?, 0, 59);
        let hours = mask(parse_field("hour", fields[ix + 1], 0, 23, &[], 0)?, 0, 23);
        let days_of_month = mask(
            parse_field("day-of-month", fields[ix + 2], 1, 31, &[], 0)?,
            1,
            31,
        );
        let months = mask(
            parse_field("month", fields[ix + 3], 1, 12, &MONTH_NAMES, 1)?,
            1,
            12,
        );
        let days_of_week = weekday_mask(parse_field(
            "day-of-week",
            fields[ix + 4],
            0,
            7,
            &DAY_NAMES,
            0,
        )?);

        let years = if fields.len() == ix + 6 {
            parse_field("year", fields[ix + 5], MIN_YEAR, MAX_YEAR, &[], 0)?
                .map(|values| values.into_iter().collect())
        } else {
            None
        };

        Ok(Self {
            expression: expression.to_string(),
            seconds,
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            years,
        })
    }

    /// Compute the next trigger time strictly after `from`.
    ///
    /// Pure and deterministic. Returns `None` only when a year field (or the
    /// four-year search horizon for impossible day/month combinations) leaves
    /// no future occurrence.
    pub fn next_time_after(&self, from: NaiveDateTime) -> Option<NaiveDateTime> {
        let mut t = from.with_nanosecond(0).unwrap_or(from) + Duration::seconds(1);
        let horizon = from + Duration::days(HORIZON_DAYS);

        loop {
            if let Some(years) = &self.years {
                let year = t.year().max(0) as u32;
                match years.range(year..).next() {
                    None => return None,
                    Some(&next_year) if next_year > year => {
                        t = start_of_year(next_year as i32)?;
                        continue;
                    }
                    Some(_) => {}
                }
            } else if t > horizon {
                return None;
            }

            if !self.months.contains(t.month()) {
                t = start_of_next_month(t)?;
                continue;
            }
            if !self.day_matches(t) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.hours.contains(t.hour()) {
                t = t.with_minute(0)?.with_second(0)? + Duration::hours(1);
                continue;
            }
            if !self.minutes.contains(t.minute()) {
                t = t.with_second(0)? + Duration::minutes(1);
                continue;
            }
            if !self.seconds.contains(t.second()) {
                t += Duration::seconds(1);
                continue;
            }
            return Some(t);
        }
    }

    /// Day-of-month and day-of-week must both match.
    fn day_matches(&self, t: NaiveDateTime) -> bool {
        self.days_of_month.contains(t.day())
            && self.days_of_week.contains(t.weekday().num_days_from_sunday())
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

fn mask(values: Option<Vec<u32>>, min: u32, max: u32) -> FieldMask {
    match values {
        Some(values) => FieldMask::from_values(&values),
        None => FieldMask::any(min, max),
    }
}

/// Weekdays allow 7 as an alias for Sunday.
fn weekday_mask(values: Option<Vec<u32>>) -> FieldMask {
    match values {
        Some(values) => FieldMask::from_values(
            &values
                .into_iter()
                .map(|v| if v == 7 { 0 } else { v })
                .collect::<Vec<_>>(),
        ),
        None => FieldMask::any(0, 6),
    }
}

fn start_of_year(year: i32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, 1, 1)?.and_hms_opt(0, 0, 0)
}

fn start_of_next_month(t: NaiveDateTime) -> Option<NaiveDateTime> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}
