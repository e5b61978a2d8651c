//! Pointing position.

use archive_common::Position;

use crate::error::{IngestionError, Result};
use crate::keywords::{fields, SetupRecord};

/// Parse a sexagesimal (`12:30:15.2`, `-45 10 02`) or decimal value.
pub fn parse_sexagesimal(value: &str) -> Option<f64> {
    let value = value.trim();
    let (negative, digits) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };
    let parts: Vec<f64> = digits
        .split(|c: char| c == ':' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| *p < 0.0) {
        return None;
    }
    let magnitude = parts
        .iter()
        .zip([1.0, 60.0, 3600.0])
        .map(|(p, scale)| p / scale)
        .sum::<f64>();
    Some(if negative { -magnitude } else { magnitude })
}

/// Position from `RA` (hours), `DEC` (degrees) and `EQUINOX`.
///
/// `None` when both coordinates are absent, when both are zero (the
/// telescope reports 0/0 for calibrations) or when the equinox is zero.
pub fn position(setup: &SetupRecord) -> Result<Option<Position>> {
    let ra = setup.text(fields::RA);
    let dec = setup.text(fields::DEC);
    let (ra, dec) = match (ra, dec) {
        (None, None) => return Ok(None),
        (Some(_), None) => {
            return Err(IngestionError::invalid(
                setup.keyword(fields::DEC),
                "right ascension without declination",
            ))
        }
        (None, Some(_)) => {
            return Err(IngestionError::invalid(
                setup.keyword(fields::RA),
                "declination without right ascension",
            ))
        }
        (Some(ra), Some(dec)) => (ra, dec),
    };

    let ra_hours = parse_sexagesimal(ra).ok_or_else(|| {
        IngestionError::invalid(setup.keyword(fields::RA), format!("'{}' is not an angle", ra))
    })?;
    let dec = parse_sexagesimal(dec).ok_or_else(|| {
        IngestionError::invalid(setup.keyword(fields::DEC), format!("'{}' is not an angle", dec))
    })?;
    let ra = (ra_hours * 15.0).rem_euclid(360.0);
    if ra == 0.0 && dec == 0.0 {
        return Ok(None);
    }

    let equinox = setup.required_f64(fields::EQUINOX)?;
    if equinox == 0.0 {
        return Ok(None);
    }

    let position = Position::new(ra, dec, equinox).map_err(IngestionError::from)?;
    Ok(Some(position))
}
