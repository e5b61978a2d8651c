//! Path helpers for synthetic archive trees.

use chrono::{Datelike, NaiveDate};
use std::path::{Path, PathBuf};

/// Raw data directory of an instrument for a night:
/// `<base>/salt/data/YYYY/MMDD/<instrument_dir>/raw`.
pub fn night_raw_dir(base: &Path, night: NaiveDate, instrument_dir: &str) -> PathBuf {
    base.join("salt")
        .join("data")
        .join(format!("{:04}", night.year()))
        .join(format!("{:02}{:02}", night.month(), night.day()))
        .join(instrument_dir)
        .join("raw")
}

/// Shorthand for a date in tests.
pub fn night(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}
