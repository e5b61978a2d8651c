//! Night and date-range handling.
//!
//! An observing night is identified by the local date on which it starts.
//! Sutherland is on SAST (UTC+2), and a night runs from local noon to local
//! noon, so a UTC timestamp belongs to the night of `(t - 10h).date()`.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use thiserror::Error;

/// Hours to subtract from UTC so that night boundaries fall on a date change.
const NIGHT_OFFSET_HOURS: i64 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateRangeError {
    #[error("Invalid date '{0}': expected YYYY-MM-DD, 'today' or 'yesterday'")]
    InvalidDate(String),

    #[error("Invalid date range: start {start} must be before end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
}

/// Parse a command-line date. `today` and `yesterday` are relative to `today`.
pub fn parse_date(value: &str, today: NaiveDate) -> Result<NaiveDate, DateRangeError> {
    let value = value.trim();
    match value.to_ascii_lowercase().as_str() {
        "today" => Ok(today),
        "yesterday" => today
            .pred_opt()
            .ok_or_else(|| DateRangeError::InvalidDate(value.to_string())),
        _ => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map_err(|_| DateRangeError::InvalidDate(value.to_string())),
    }
}

/// Night to which a UTC instant belongs.
pub fn night_of(instant: DateTime<Utc>) -> NaiveDate {
    (instant - Duration::hours(NIGHT_OFFSET_HOURS)).date_naive()
}

/// Range of observing nights. The start is always included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
    end_inclusive: bool,
}

impl DateRange {
    pub fn new(
        start: NaiveDate,
        end: NaiveDate,
        end_inclusive: bool,
    ) -> Result<Self, DateRangeError> {
        if start > end || (start == end && !end_inclusive) {
            return Err(DateRangeError::InvalidDateRange { start, end });
        }
        Ok(Self {
            start,
            end,
            end_inclusive,
        })
    }

    /// Range covering a single night.
    pub fn single(night: NaiveDate) -> Self {
        Self {
            start: night,
            end: night,
            end_inclusive: true,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, night: NaiveDate) -> bool {
        night >= self.start
            && (night < self.end || (self.end_inclusive && night == self.end))
    }

    /// Nights in ascending order.
    pub fn nights(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start
            .iter_days()
            .take_while(move |night| self.contains(*night))
    }
}
