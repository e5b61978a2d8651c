use archive_common::{DataProductType, Energy, Instrument};

use super::{DerivationContext, Exposure, InstrumentHandler};
use crate::energy::{hrs_energy, HrsArm, HrsMode};
use crate::error::{IngestionError, Result};
use crate::keywords::{fields, SetupRecord};

/// High Resolution Spectrograph. The arm is encoded in the file name.
#[derive(Debug, Default)]
pub struct HrsHandler;

impl InstrumentHandler for HrsHandler {
    fn instrument(&self) -> Instrument {
        Instrument::Hrs
    }

    fn energy(&self, exposure: &Exposure<'_>, _context: &DerivationContext) -> Result<Option<Energy>> {
        let arm = HrsArm::from_file_name(exposure.file_name).ok_or_else(|| {
            IngestionError::invalid(
                "file name",
                format!("cannot tell HRS arm from '{}'", exposure.file_name),
            )
        })?;
        let setup = exposure.setup;
        let mode_value = setup.required_text(fields::OBSERVATION_MODE)?;
        let mode = HrsMode::parse(mode_value).ok_or_else(|| {
            IngestionError::invalid(
                setup.keyword(fields::OBSERVATION_MODE),
                format!("unknown HRS mode '{}'", mode_value),
            )
        })?;
        let binning = setup.spectral_binning()?;
        Ok(Some(hrs_energy(arm, mode, binning)?))
    }

    fn data_product_type(&self, _setup: &SetupRecord) -> DataProductType {
        DataProductType::Spectrum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::energy::FilterCurveLibrary;

    #[test]
    fn test_blue_arm_energy() {
        let setup = SetupRecord::from_pairs([
            ("observation_mode", "MEDIUM RESOLUTION"),
            ("detector_summation", "1 1"),
        ]);
        let exposure = Exposure {
            file_name: "H202106150012.fits",
            setup: &setup,
        };
        let context = DerivationContext::new(FilterCurveLibrary::new("/nonexistent"));
        let energy = HrsHandler.energy(&exposure, &context).unwrap().unwrap();
        assert!((energy.min_wavelength - 370e-9).abs() < 1e-18);
        assert_eq!(energy.resolving_power, Some(43400.0));
    }

    #[test]
    fn test_unknown_arm() {
        let setup = SetupRecord::from_pairs([("observation_mode", "LOW RESOLUTION")]);
        let exposure = Exposure {
            file_name: "X202106150012.fits",
            setup: &setup,
        };
        let context = DerivationContext::new(FilterCurveLibrary::new("/nonexistent"));
        assert!(HrsHandler.energy(&exposure, &context).is_err());
    }
}
