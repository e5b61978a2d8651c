use archive_common::{DataProductType, Energy, Instrument};

use super::{DerivationContext, Exposure, InstrumentHandler};
use crate::energy::filter_energy;
use crate::error::Result;
use crate::keywords::{fields, SetupRecord};

/// Filters without a usable transmission curve.
const FILTERS_WITHOUT_ENERGY: &[&str] = &["OPEN", "CLR-S1", "SDSSz-S1"];

/// Filter imaging cameras (Salticam and BCAM).
#[derive(Debug)]
pub struct ImagingCameraHandler {
    instrument: Instrument,
}

impl ImagingCameraHandler {
    pub fn salticam() -> Self {
        Self {
            instrument: Instrument::Salticam,
        }
    }

    pub fn bcam() -> Self {
        Self {
            instrument: Instrument::Bcam,
        }
    }
}

impl InstrumentHandler for ImagingCameraHandler {
    fn instrument(&self) -> Instrument {
        self.instrument
    }

    fn energy(&self, exposure: &Exposure<'_>, context: &DerivationContext) -> Result<Option<Energy>> {
        let Some(filter) = exposure.setup.text(fields::FILTER) else {
            return Ok(None);
        };
        if FILTERS_WITHOUT_ENERGY.contains(&filter) {
            return Ok(None);
        }
        let curve = context.filter_curves.load(self.instrument, filter)?;
        filter_energy(&curve)
    }

    fn data_product_type(&self, _setup: &SetupRecord) -> DataProductType {
        DataProductType::Image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::energy::FilterCurveLibrary;
    use crate::error::IngestionError;

    fn context(root: &std::path::Path) -> DerivationContext {
        DerivationContext::new(FilterCurveLibrary::new(root))
    }

    #[test]
    fn test_bcam_uses_salticam_curves() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("salticam")).unwrap();
        std::fs::write(
            dir.path().join("salticam/Johnson_V.txt"),
            "# V\n4500 0.0\n5000 0.9\n6000 0.9\n6500 0.0\n",
        )
        .unwrap();

        let setup = SetupRecord::from_pairs([("filter", "V-S1")]);
        let exposure = Exposure {
            file_name: "B202106150001.fits",
            setup: &setup,
        };
        let energy = ImagingCameraHandler::bcam()
            .energy(&exposure, &context(dir.path()))
            .unwrap()
            .unwrap();
        assert!(energy.min_wavelength > 4.5e-7 && energy.min_wavelength < 5e-7);
        assert!(energy.max_wavelength > 6e-7 && energy.max_wavelength < 6.5e-7);
    }

    #[test]
    fn test_clear_filter_has_no_energy() {
        let setup = SetupRecord::from_pairs([("filter", "CLR-S1")]);
        let exposure = Exposure {
            file_name: "S202106150001.fits",
            setup: &setup,
        };
        let dir = tempfile::tempdir().unwrap();
        let energy = ImagingCameraHandler::salticam()
            .energy(&exposure, &context(dir.path()))
            .unwrap();
        assert!(energy.is_none());
    }

    #[test]
    fn test_missing_curve_is_error() {
        let setup = SetupRecord::from_pairs([("filter", "B-S1")]);
        let exposure = Exposure {
            file_name: "S202106150001.fits",
            setup: &setup,
        };
        let dir = tempfile::tempdir().unwrap();
        let result = ImagingCameraHandler::salticam().energy(&exposure, &context(dir.path()));
        assert!(matches!(result, Err(IngestionError::FilterCurve(_))));
    }
}
