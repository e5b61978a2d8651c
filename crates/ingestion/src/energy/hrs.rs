//! HRS fixed-format spectroscopy: static tables per (arm, mode).

use archive_common::Energy;

use crate::error::{IngestionError, Result};

const NANOMETRE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HrsArm {
    Blue,
    Red,
}

impl HrsArm {
    /// Arm from the file name: `H...` files come from the blue CCD and
    /// `R...` files from the red one.
    pub fn from_file_name(name: &str) -> Option<Self> {
        match name.chars().next() {
            Some('H') => Some(HrsArm::Blue),
            Some('R') => Some(HrsArm::Red),
            _ => None,
        }
    }

    /// Wavelength interval in nm.
    fn interval(&self) -> (f64, f64) {
        match self {
            HrsArm::Blue => (370.0, 555.0),
            HrsArm::Red => (555.0, 890.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HrsMode {
    LowResolution,
    MediumResolution,
    HighResolution,
    HighStabilityP,
    HighStabilityO,
}

impl HrsMode {
    /// Parse the `OBSMODE` value of an HRS exposure.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "LOW RESOLUTION" | "LR" => Some(HrsMode::LowResolution),
            "MEDIUM RESOLUTION" | "MR" => Some(HrsMode::MediumResolution),
            "HIGH RESOLUTION" | "HR" => Some(HrsMode::HighResolution),
            "HIGH STABILITY" | "HIGH STABILITY (P)" | "HS" | "HS-P" => Some(HrsMode::HighStabilityP),
            "HIGH STABILITY (O)" | "HS-O" => Some(HrsMode::HighStabilityO),
            _ => None,
        }
    }
}

/// Resolving power and unbinned sample size (nm per pixel).
fn characteristics(arm: HrsArm, mode: HrsMode) -> (f64, f64) {
    match (arm, mode) {
        (HrsArm::Blue, HrsMode::LowResolution) => (15000.0, 0.01233),
        (HrsArm::Blue, HrsMode::MediumResolution) => (43400.0, 0.004263),
        (HrsArm::Blue, HrsMode::HighResolution) => (66700.0, 0.002774),
        (HrsArm::Blue, HrsMode::HighStabilityP) => (66900.0, 0.002765),
        (HrsArm::Blue, HrsMode::HighStabilityO) => (94600.0, 0.001956),
        (HrsArm::Red, HrsMode::LowResolution) => (14000.0, 0.02064),
        (HrsArm::Red, HrsMode::MediumResolution) => (39600.0, 0.007298),
        (HrsArm::Red, HrsMode::HighResolution) => (73700.0, 0.003921),
        (HrsArm::Red, HrsMode::HighStabilityP) => (64600.0, 0.004474),
        (HrsArm::Red, HrsMode::HighStabilityO) => (84200.0, 0.003432),
    }
}

pub fn hrs_energy(arm: HrsArm, mode: HrsMode, binning: u32) -> Result<Energy> {
    if binning == 0 {
        return Err(IngestionError::invalid("CCDSUM", "binning must be positive"));
    }
    let (low, high) = arm.interval();
    let (resolving_power, unbinned_sample) = characteristics(arm, mode);
    let sample = unbinned_sample * binning as f64;
    let dimension = ((high - low) / sample).round().max(1.0) as u32;
    let energy = Energy::from_interval(
        low * NANOMETRE,
        high * NANOMETRE,
        dimension,
        Some(resolving_power),
        sample * NANOMETRE,
    )?;
    Ok(energy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arm_from_file_name() {
        assert_eq!(HrsArm::from_file_name("H201907010012.fits"), Some(HrsArm::Blue));
        assert_eq!(HrsArm::from_file_name("R201907010012.fits"), Some(HrsArm::Red));
        assert_eq!(HrsArm::from_file_name("P201907010012.fits"), None);
    }

    #[test]
    fn test_red_high_resolution() {
        let energy = hrs_energy(HrsArm::Red, HrsMode::HighResolution, 1).unwrap();
        assert!((energy.min_wavelength - 555e-9).abs() < 1e-18);
        assert!((energy.max_wavelength - 890e-9).abs() < 1e-18);
        assert_eq!(energy.resolving_power, Some(73700.0));
    }

    #[test]
    fn test_binning_reduces_dimension() {
        let unbinned = hrs_energy(HrsArm::Blue, HrsMode::LowResolution, 1).unwrap();
        let binned = hrs_energy(HrsArm::Blue, HrsMode::LowResolution, 2).unwrap();
        assert!(binned.dimension < unbinned.dimension);
        assert!((binned.sample_size - 2.0 * unbinned.sample_size).abs() < 1e-20);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(HrsMode::parse("High Stability (O)"), Some(HrsMode::HighStabilityO));
        assert_eq!(HrsMode::parse("medium resolution"), Some(HrsMode::MediumResolution));
        assert_eq!(HrsMode::parse("ECHELLE"), None);
    }
}
