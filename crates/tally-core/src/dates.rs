//! Day-granularity calendar helpers shared by windows, payload tokens, and
//! the record store.

use chrono::{Datelike, Duration, NaiveDate};

/// `num_days_from_ce` value for 1970-01-01.
const EPOCH_DAYS_FROM_CE: i64 = 719_163;

/// Days since 1970-01-01 for a calendar date. Used as the day token inside
/// callback payloads.
pub fn epoch_day(date: NaiveDate) -> i64 {
    i64::from(date.num_days_from_ce()) - EPOCH_DAYS_FROM_CE
}

/// Inverse of [`epoch_day`]; `None` when the value is outside the calendar
/// range chrono supports.
pub fn date_from_epoch_day(value: i64) -> Option<NaiveDate> {
    let days_from_ce = value.checked_add(EPOCH_DAYS_FROM_CE)?;
    let days_from_ce = i32::try_from(days_from_ce).ok()?;
    NaiveDate::from_num_days_from_ce_opt(days_from_ce)
}

/// Parses a `YYYY-MM-DD` day string, tolerating surrounding whitespace.
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Monday of the week containing `reference`.
pub fn week_monday(reference: NaiveDate) -> NaiveDate {
    let offset = i64::from(reference.weekday().num_days_from_monday());
    reference
        .checked_sub_signed(Duration::days(offset))
        .unwrap_or(reference)
}

/// First and last day of the given calendar month; `None` for an invalid
/// month number or an out-of-range year.
pub fn month_bounds(month: u32, year: i32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year.checked_add(1)?, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next_first.pred_opt()?))
}
