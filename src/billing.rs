use crate::error::AppError;
use crate::models::BillingDay;
use chrono::{Datelike, NaiveDate};

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// Builds a date, moving days past the end of the month back to its last day
/// (billing day 31 in April is April 30th, 02/29 in 2023 is February 28th).
pub fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let last = days_in_month(year, month);
    if last == 0 {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day.clamp(1, last))
}

/// Shifts a (year, month) pair by a signed number of months.
fn shift_month(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let index = year * 12 + (month as i32 - 1) + delta;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

fn billing_date(year: i32, month: u32, start_day: BillingDay) -> Result<NaiveDate, AppError> {
    clamped_date(year, month, start_day.get()).ok_or_else(|| {
        AppError::Validation(format!(
            "billing date for {year}-{month:02} is outside the supported calendar"
        ))
    })
}

/// Whole days between two dates, ignoring direction.
pub fn diff_days(a: NaiveDate, b: NaiveDate) -> i64 {
    (a - b).num_days().abs()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingCycle {
    pub start: NaiveDate,
    pub next_start: NaiveDate,
    pub days_since_start: i64,
    pub total_days: i64,
}

impl BillingCycle {
    /// The cycle that contains `today` for a meter billed on `start_day`.
    ///
    /// The cycle starts on this month's billing date unless that date is
    /// still ahead of `today`, in which case it started last month.
    pub fn containing(today: NaiveDate, start_day: BillingDay) -> Result<Self, AppError> {
        let (year, month) = (today.year(), today.month());
        let reference = billing_date(year, month, start_day)?;

        let (start, next_start) = if reference > today {
            let (py, pm) = shift_month(year, month, -1);
            (billing_date(py, pm, start_day)?, reference)
        } else {
            let (ny, nm) = shift_month(year, month, 1);
            (reference, billing_date(ny, nm, start_day)?)
        };

        Ok(Self {
            start,
            next_start,
            days_since_start: diff_days(today, start),
            total_days: diff_days(next_start, start),
        })
    }
}
