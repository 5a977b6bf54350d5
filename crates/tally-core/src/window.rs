//! Aggregation windows and their resolution to inclusive day ranges.

use chrono::{Duration, NaiveDate};

use crate::dates::{month_bounds, week_monday};
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `Window` values.
pub enum Window {
    /// `[today - (n - 1), today]`, inclusive, calendar-local.
    RollingDays(u32),
    /// Monday to Sunday of the week containing the reference date.
    CalendarWeek(NaiveDate),
    /// A whole calendar month.
    CalendarMonth { month: u32, year: i32 },
    /// Inclusive explicit range.
    ExplicitRange { start: NaiveDate, end: NaiveDate },
}

impl Window {
    /// Resolves the window to inclusive `[start, end]` bounds anchored at
    /// `today`.
    pub fn resolve(&self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate), EngineError> {
        match self {
            Window::RollingDays(days) => {
                let span = i64::from((*days).max(1) - 1);
                let start = today
                    .checked_sub_signed(Duration::days(span))
                    .ok_or_else(|| {
                        EngineError::InvalidRange(format!("rolling window of {days} days overflows"))
                    })?;
                Ok((start, today))
            }
            Window::CalendarWeek(reference) => {
                let monday = week_monday(*reference);
                let sunday = monday
                    .checked_add_signed(Duration::days(6))
                    .ok_or_else(|| EngineError::InvalidRange("week overflows calendar".to_string()))?;
                Ok((monday, sunday))
            }
            Window::CalendarMonth { month, year } => month_bounds(*month, *year)
                .ok_or_else(|| EngineError::InvalidRange(format!("month {month} of year {year}"))),
            Window::ExplicitRange { start, end } => {
                if start > end {
                    return Err(EngineError::InvalidRange(format!(
                        "start {start} is after end {end}"
                    )));
                }
                Ok((*start, *end))
            }
        }
    }

    /// Short label used in digest headers.
    pub fn describe(&self) -> String {
        match self {
            Window::RollingDays(days) => format!("last {days} days"),
            Window::CalendarWeek(_) => "current week".to_string(),
            Window::CalendarMonth { month, year } => format!("{month:02}.{year}"),
            Window::ExplicitRange { start, end } => format!("{start} - {end}"),
        }
    }
}
