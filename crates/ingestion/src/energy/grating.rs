//! RSS longslit spectroscopy: the grating equation.
//!
//! The wavelength reaching detector column `x` (pixels from the centre of the
//! middle CCD) is `λ(x) = Λ·(sin α + sin β(x))`, with `Λ` the groove spacing,
//! `α` the grating angle and `β(x)` the camera angle corrected for the
//! offset of `x` from the optical axis.

use archive_common::Energy;

use crate::error::{IngestionError, Result};

/// Focal length of the RSS camera, mm.
const CAMERA_FOCAL_LENGTH: f64 = 328.0;
/// Column of the optical axis relative to the centre of the middle CCD, mm.
const OPTICAL_AXIS_ON_CCD: f64 = 0.3066;
/// Detector pixel size, mm.
const PIXEL_SIZE: f64 = 0.015;
/// Empirical offset of the optical axis, pixels.
const AXIS_OFFSET_PIXELS: f64 = 20.9;
const TELESCOPE_FOCAL_LENGTH: f64 = 46200.0;
const COLLIMATOR_FOCAL_LENGTH: f64 = 630.0;

/// Grating rotation home error, degrees.
const ALPHA_HOME: f64 = 0.0;
/// Articulation home alignment error, degrees.
const BETA_ALIGNMENT: f64 = -0.063;
/// Articulation detent ring placement correction.
const ARTICULATION_CORRECTION: f64 = -4.2e-5;

/// Half-width of the usable detector, unbinned pixels.
pub const DETECTOR_HALF_WIDTH: f64 = 3162.0;
/// Usable unbinned pixels along the dispersion axis.
pub const DETECTOR_PIXELS: u32 = 6096;

/// Grooves per mm for the RSS gratings.
pub fn grating_frequency(grating: &str) -> Option<f64> {
    let frequency = match grating.trim().to_ascii_lowercase().as_str() {
        "pg0300" => 300.0,
        "pg0900" => 903.89,
        "pg1300" => 1299.6,
        "pg1800" => 1801.89,
        "pg2300" => 2302.60,
        "pg3000" => 3000.55,
        _ => return None,
    };
    Some(frequency)
}

/// Grating setup of an exposure. Angles in degrees, frequency in grooves/mm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GratingSetup {
    pub grating_angle: f64,
    pub camera_angle: f64,
    pub frequency: f64,
}

impl GratingSetup {
    /// Groove spacing in Ångström.
    fn period(&self) -> f64 {
        1e7 / self.frequency
    }

    /// Wavelength in metres at column `x` (unbinned pixels).
    pub fn wavelength(&self, x: f64) -> f64 {
        let alpha = (self.grating_angle + ALPHA_HOME).to_radians();
        let beta0 = ((1.0 + ARTICULATION_CORRECTION) * self.camera_angle + BETA_ALIGNMENT
            - (self.grating_angle + ALPHA_HOME))
            .to_radians();
        let x = x - OPTICAL_AXIS_ON_CCD / PIXEL_SIZE + AXIS_OFFSET_PIXELS;
        let dbeta = (x * PIXEL_SIZE / CAMERA_FOCAL_LENGTH).atan();
        self.period() * (alpha.sin() + (beta0 + dbeta).sin()) * 1e-10
    }

    /// Smallest resolvable wavelength difference for a slit, in metres.
    pub fn resolution_element(&self, slit_width_arcsec: f64) -> f64 {
        let slit = (slit_width_arcsec / 3600.0).to_radians();
        slit * self.period()
            * self.grating_angle.to_radians().cos()
            * (TELESCOPE_FOCAL_LENGTH / COLLIMATOR_FOCAL_LENGTH)
            * 1e-10
    }

    /// Resolving power at the detector centre.
    pub fn resolving_power(&self, slit_width_arcsec: f64) -> f64 {
        self.wavelength(0.0) / self.resolution_element(slit_width_arcsec)
    }

    pub fn energy(&self, binning: u32, slit_width_arcsec: f64) -> Result<Energy> {
        if binning == 0 {
            return Err(IngestionError::invalid("CCDSUM", "binning must be positive"));
        }
        let low = self.wavelength(-DETECTOR_HALF_WIDTH);
        let high = self.wavelength(DETECTOR_HALF_WIDTH);
        let sample_size = (self.wavelength(binning as f64) - self.wavelength(0.0)).abs();
        let energy = Energy::from_interval(
            low,
            high,
            DETECTOR_PIXELS / binning,
            Some(self.resolving_power(slit_width_arcsec)),
            sample_size,
        )?;
        Ok(energy)
    }
}

/// Slit width in arcseconds encoded in a mask barcode such as `PL0150N001`.
pub fn slit_width_from_barcode(barcode: &str) -> Option<f64> {
    let barcode = barcode.trim();
    match barcode {
        "P000000N02" => return Some(0.333333),
        "P000000P08" | "P000000P09" => return Some(1.5),
        _ => {}
    }
    barcode
        .get(2..6)
        .and_then(|digits| digits.parse::<f64>().ok())
        .map(|hundredths| hundredths / 100.0)
        .filter(|width| *width > 0.0)
}

/// Whether a mask barcode is a longslit rather than a multi-object mask.
pub fn is_longslit(barcode: &str) -> bool {
    let barcode = barcode.trim();
    barcode.starts_with("PL") || barcode.starts_with("P000000")
}
