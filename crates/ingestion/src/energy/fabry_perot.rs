//! RSS Fabry-Pérot imaging.
//!
//! The passband is centred on the etalon wavelength and its width is the
//! etalon FWHM, interpolated from a reference table for the etalon mode.

use archive_common::Energy;
use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::error::{IngestionError, Result};

const NANOMETRE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EtalonMode {
    FrameTransfer,
    LowResolution,
    MediumResolution,
    HighResolution,
}

impl EtalonMode {
    /// Parse an `ET1MODE`/`ET2MODE` value.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "FRAME TRANSFER" | "TF" => Some(EtalonMode::FrameTransfer),
            "LOW RESOLUTION" | "LR" => Some(EtalonMode::LowResolution),
            "MEDIUM RESOLUTION" | "MR" => Some(EtalonMode::MediumResolution),
            "HIGH RESOLUTION" | "HR" => Some(EtalonMode::HighResolution),
            _ => None,
        }
    }
}

/// Which etalon defines the passband, from the `ET-STATE` keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtalonState {
    Open,
    First,
    Second,
    Both,
}

impl EtalonState {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "s1 - etalon open" => Some(EtalonState::Open),
            "s2 - etalon 1" => Some(EtalonState::First),
            "s3 - etalon 2" => Some(EtalonState::Second),
            "s4 - etalon 1 & 2" => Some(EtalonState::Both),
            _ => None,
        }
    }
}

/// (wavelength nm, FWHM nm) per mode, sorted by wavelength.
static FWHM_TABLE: Lazy<HashMap<EtalonMode, Vec<(f64, f64)>>> = Lazy::new(|| {
    HashMap::from([
        (
            EtalonMode::FrameTransfer,
            vec![(430.0, 1.10), (500.0, 1.25), (600.0, 1.45), (700.0, 1.70), (860.0, 2.05)],
        ),
        (
            EtalonMode::LowResolution,
            vec![(430.0, 0.72), (500.0, 0.80), (600.0, 0.93), (700.0, 1.05), (860.0, 1.25)],
        ),
        (
            EtalonMode::MediumResolution,
            vec![(430.0, 0.32), (500.0, 0.36), (600.0, 0.42), (700.0, 0.49), (860.0, 0.60)],
        ),
        (
            EtalonMode::HighResolution,
            vec![(430.0, 0.052), (500.0, 0.060), (600.0, 0.071), (700.0, 0.083), (860.0, 0.101)],
        ),
    ])
});

/// FWHM in nm at a wavelength in nm; `None` outside the tabulated range.
pub fn fwhm(mode: EtalonMode, wavelength: f64) -> Option<f64> {
    let table = FWHM_TABLE.get(&mode)?;
    let (first, last) = (table.first()?, table.last()?);
    if wavelength < first.0 || wavelength > last.0 {
        return None;
    }
    if wavelength == last.0 {
        return Some(last.1);
    }
    table.windows(2).find_map(|pair| {
        let ((x1, f1), (x2, f2)) = (pair[0], pair[1]);
        if wavelength >= x1 && wavelength < x2 {
            let m = (f2 - f1) / (x2 - x1);
            Some(f1 + m * (wavelength - x1))
        } else {
            None
        }
    })
}

/// Energy for a Fabry-Pérot exposure given the mode and centre wavelength
/// (nm) of the selected etalon.
pub fn fabry_perot_energy(mode: EtalonMode, wavelength_nm: f64) -> Result<Option<Energy>> {
    let Some(width_nm) = fwhm(mode, wavelength_nm) else {
        return Ok(None);
    };
    let center = wavelength_nm * NANOMETRE;
    let width = width_nm * NANOMETRE;
    let energy = Energy {
        min_wavelength: center - width / 2.0,
        max_wavelength: center + width / 2.0,
        dimension: 1,
        resolving_power: Some(wavelength_nm / width_nm),
        sample_size: width,
    };
    energy.validate().map_err(IngestionError::from)?;
    Ok(Some(energy))
}
