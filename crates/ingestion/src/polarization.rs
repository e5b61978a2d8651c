//! Polarimetry: Stokes parameters from the waveplate configuration.

use archive_common::{Polarization, StokesParameter};
use tracing::warn;

use crate::error::Result;
use crate::keywords::{fields, SetupRecord};

const LINEAR: &[StokesParameter] = &[StokesParameter::I, StokesParameter::Q, StokesParameter::U];
const CIRCULAR: &[StokesParameter] = &[StokesParameter::I, StokesParameter::V];
const ALL_STOKES: &[StokesParameter] = &[
    StokesParameter::I,
    StokesParameter::Q,
    StokesParameter::U,
    StokesParameter::V,
];

/// Stokes parameters measured with a named waveplate pattern.
pub fn stokes_parameters(pattern: &str) -> Option<&'static [StokesParameter]> {
    match pattern.trim().to_ascii_uppercase().as_str() {
        "LINEAR" | "LINEAR-HI" => Some(LINEAR),
        "CIRCULAR" | "CIRCULAR-HI" => Some(CIRCULAR),
        "ALL-STOKES" => Some(ALL_STOKES),
        _ => None,
    }
}

/// Polarization of an RSS exposure. `None` unless the polarimetric optics
/// are in the beam and the waveplate pattern is known.
pub fn polarization(setup: &SetupRecord) -> Result<Option<Polarization>> {
    let config = setup.text(fields::POLARIZATION_CONFIG).unwrap_or("OPEN");
    if config.trim().eq_ignore_ascii_case("OPEN") {
        return Ok(None);
    }
    let Some(pattern) = setup.text(fields::WAVEPLATE_PATTERN) else {
        warn!(polarization_config = %config, "Polarimetric exposure without waveplate pattern");
        return Ok(None);
    };
    match stokes_parameters(pattern) {
        Some(parameters) => Ok(Some(Polarization::new(parameters.iter().copied())?)),
        None => {
            warn!(waveplate_pattern = %pattern, "Unknown waveplate pattern");
            Ok(None)
        }
    }
}
