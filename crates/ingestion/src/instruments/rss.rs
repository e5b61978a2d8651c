use archive_common::{DataProductType, Energy, Instrument, Polarization};
use tracing::debug;

use super::{DerivationContext, Exposure, InstrumentHandler};
use crate::energy::{
    fabry_perot_energy, filter_energy, grating_frequency, is_longslit, slit_width_from_barcode,
    EtalonMode, EtalonState, GratingSetup,
};
use crate::error::{IngestionError, Result};
use crate::keywords::{fields, SetupRecord};
use crate::polarization;

/// Order-blocking filters used for spectroscopy; not bandpasses.
const ORDER_BLOCKING_FILTERS: &[&str] = &["PC00000", "PC03200", "PC03400", "PC03850", "PC04600"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RssMode {
    Imaging,
    Spectroscopy,
    FabryPerot,
}

fn mode(setup: &SetupRecord) -> Result<RssMode> {
    let value = setup.required_text(fields::OBSERVATION_MODE)?;
    match value.trim().to_ascii_uppercase().as_str() {
        "IMAGING" => Ok(RssMode::Imaging),
        "SPECTROSCOPY" => Ok(RssMode::Spectroscopy),
        "FABRY-PEROT" => Ok(RssMode::FabryPerot),
        other => Err(IngestionError::invalid(
            setup.keyword(fields::OBSERVATION_MODE),
            format!("unsupported observation mode '{}'", other),
        )),
    }
}

/// MASKTYP decides when present; older headers only carry the barcode.
fn is_multi_object(setup: &SetupRecord) -> Result<bool> {
    match setup.text(fields::MASK_TYPE) {
        Some(mask_type) => Ok(mask_type.trim().eq_ignore_ascii_case("MOS")),
        None => Ok(!is_longslit(setup.required_text(fields::SLIT_BARCODE)?)),
    }
}

/// Robert Stobie Spectrograph.
#[derive(Debug, Default)]
pub struct RssHandler;

impl RssHandler {
    fn imaging_energy(&self, setup: &SetupRecord, context: &DerivationContext) -> Result<Option<Energy>> {
        let filter = match setup.text(fields::FILTER) {
            None => return Ok(None),
            Some(f) if f.eq_ignore_ascii_case("EMPTY") => return Ok(None),
            Some(f) if ORDER_BLOCKING_FILTERS.contains(&f) => return Ok(None),
            Some(f) => f,
        };
        let curve = context.filter_curves.load(Instrument::Rss, filter)?;
        filter_energy(&curve)
    }

    fn spectroscopy_energy(&self, setup: &SetupRecord) -> Result<Option<Energy>> {
        if is_multi_object(setup)? {
            debug!(mask_type = ?setup.text(fields::MASK_TYPE), "Multi-object mask, no energy");
            return Ok(None);
        }
        let barcode = setup.required_text(fields::SLIT_BARCODE)?;
        let grating = setup.required_text(fields::GRATING)?;
        let frequency = grating_frequency(grating).ok_or_else(|| {
            IngestionError::invalid(setup.keyword(fields::GRATING), format!("unknown grating '{}'", grating))
        })?;
        let slit_width = slit_width_from_barcode(barcode).ok_or_else(|| {
            IngestionError::invalid(
                setup.keyword(fields::SLIT_BARCODE),
                format!("cannot decode slit width from '{}'", barcode),
            )
        })?;
        let grating = GratingSetup {
            grating_angle: setup.required_f64(fields::GRATING_ANGLE)?,
            camera_angle: setup.required_f64(fields::CAMERA_ANGLE)?,
            frequency,
        };
        let binning = setup.spectral_binning()?;
        Ok(Some(grating.energy(binning, slit_width)?))
    }

    fn fabry_perot_energy(&self, setup: &SetupRecord) -> Result<Option<Energy>> {
        let state_value = setup.required_text(fields::ETALON_STATE)?;
        let state = EtalonState::parse(state_value).ok_or_else(|| {
            IngestionError::invalid(
                setup.keyword(fields::ETALON_STATE),
                format!("unknown etalon state '{}'", state_value),
            )
        })?;
        let (mode_field, wavelength_field) = match state {
            EtalonState::Open => return Ok(None),
            EtalonState::Second => (fields::ETALON2_MODE, fields::ETALON2_WAVELENGTH),
            EtalonState::First | EtalonState::Both => (fields::ETALON1_MODE, fields::ETALON1_WAVELENGTH),
        };
        let mode_value = setup.required_text(mode_field)?;
        let mode = EtalonMode::parse(mode_value).ok_or_else(|| {
            IngestionError::invalid(setup.keyword(mode_field), format!("unknown etalon mode '{}'", mode_value))
        })?;
        let wavelength = setup.required_f64(wavelength_field)?;
        let energy = fabry_perot_energy(mode, wavelength)?;
        if energy.is_none() {
            debug!(wavelength, "Etalon wavelength outside FWHM table");
        }
        Ok(energy)
    }
}

impl InstrumentHandler for RssHandler {
    fn instrument(&self) -> Instrument {
        Instrument::Rss
    }

    fn energy(&self, exposure: &Exposure<'_>, context: &DerivationContext) -> Result<Option<Energy>> {
        match mode(exposure.setup)? {
            RssMode::Imaging => self.imaging_energy(exposure.setup, context),
            RssMode::Spectroscopy => self.spectroscopy_energy(exposure.setup),
            RssMode::FabryPerot => self.fabry_perot_energy(exposure.setup),
        }
    }

    fn data_product_type(&self, setup: &SetupRecord) -> DataProductType {
        match mode(setup) {
            Ok(RssMode::Imaging) | Ok(RssMode::FabryPerot) => DataProductType::Image,
            Ok(RssMode::Spectroscopy) => DataProductType::Spectrum,
            Err(_) => DataProductType::Unknown,
        }
    }

    fn polarization(&self, setup: &SetupRecord) -> Result<Option<Polarization>> {
        polarization::polarization(setup)
    }
}
