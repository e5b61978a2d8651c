//! Exposure timing.

use archive_common::{night_of, ObservationTime};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tracing::debug;

use crate::error::{IngestionError, Result};
use crate::keywords::{fields, SetupRecord};

/// Observation date from `DATE-OBS`, which may also carry a time.
pub fn observation_date(setup: &SetupRecord) -> Result<NaiveDate> {
    let value = setup.required_text(fields::DATE_OBS)?;
    let date_part = value.split('T').next().unwrap_or(value);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| {
        IngestionError::invalid(
            setup.keyword(fields::DATE_OBS),
            format!("'{}' is not a date", value),
        )
    })
}

fn start_time(setup: &SetupRecord) -> Result<Option<DateTime<Utc>>> {
    let date_obs = setup.required_text(fields::DATE_OBS)?;
    if date_obs.contains('T') {
        let start = NaiveDateTime::parse_from_str(date_obs, "%Y-%m-%dT%H:%M:%S%.f").map_err(|_| {
            IngestionError::invalid(
                setup.keyword(fields::DATE_OBS),
                format!("'{}' is not a timestamp", date_obs),
            )
        })?;
        return Ok(Some(start.and_utc()));
    }

    let date = observation_date(setup)?;
    let Some(time_obs) = setup.text(fields::TIME_OBS) else {
        return Ok(None);
    };
    let time = NaiveTime::parse_from_str(time_obs, "%H:%M:%S%.f").map_err(|_| {
        IngestionError::invalid(
            setup.keyword(fields::TIME_OBS),
            format!("'{}' is not a time", time_obs),
        )
    })?;
    Ok(Some(date.and_time(time).and_utc()))
}

/// Start, end and duration of the exposure. `None` without a start time.
pub fn observation_time(setup: &SetupRecord) -> Result<Option<ObservationTime>> {
    let Some(start) = start_time(setup)? else {
        debug!("No start time in header");
        return Ok(None);
    };
    let exposure_time = setup.required_f64(fields::EXPOSURE_TIME)?;
    if !exposure_time.is_finite() || exposure_time < 0.0 {
        return Err(IngestionError::invalid(
            setup.keyword(fields::EXPOSURE_TIME),
            format!("invalid exposure time {}", exposure_time),
        ));
    }
    let end = start
        .checked_add_signed(Duration::microseconds((exposure_time * 1e6).round() as i64))
        .ok_or_else(|| {
            IngestionError::invalid(
                setup.keyword(fields::EXPOSURE_TIME),
                format!("exposure time {} s ends outside the supported date range", exposure_time),
            )
        })?;
    Ok(Some(ObservationTime {
        start,
        end,
        exposure_time,
        resolution: exposure_time,
        night: night_of(start),
    }))
}
