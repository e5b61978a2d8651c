//! Per-file derivation: header → setup record → observational properties.

use archive_common::{
    Artifact, DataProductType, Energy, Instrument, ObservationTime, Polarization, Position,
    ProductType,
};
use chrono::NaiveDate;
use fits_header::FitsFile;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::classify::{is_calibration_proposal, is_ignored_proposal};
use crate::error::{IngestionError, Result};
use crate::instruments::{DerivationContext, Exposure};
use crate::keywords::{fields, SetupRecord};
use crate::registry::InstrumentRegistry;
use crate::time::observation_date;

/// Everything derived from one exposure file without consulting a database.
#[derive(Debug, Clone)]
pub struct DerivedExposure {
    pub instrument: Instrument,
    pub setup: SetupRecord,
    pub proposal_code: Option<String>,
    pub block_visit_id: Option<i64>,
    pub observation_date: NaiveDate,
    pub product_id: String,
    pub product_type: ProductType,
    pub data_product_type: DataProductType,
    pub energy: Option<Energy>,
    pub polarization: Option<Polarization>,
    pub position: Option<Position>,
    pub time: Option<ObservationTime>,
    pub artifact: Artifact,
}

#[derive(Debug, Clone)]
pub enum Derivation {
    Derived(Box<DerivedExposure>),
    /// The file is deliberately not archived.
    Ignored { reason: String },
}

/// Derives observation properties from exposure files.
#[derive(Debug, Clone)]
pub struct ExposureDeriver {
    registry: InstrumentRegistry,
    context: DerivationContext,
    fits_base_dir: PathBuf,
}

impl ExposureDeriver {
    pub fn new(
        registry: InstrumentRegistry,
        context: DerivationContext,
        fits_base_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            context,
            fits_base_dir: fits_base_dir.into(),
        }
    }

    pub fn registry(&self) -> &InstrumentRegistry {
        &self.registry
    }

    /// Storage path of a file relative to the FITS base directory.
    pub fn artifact_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.fits_base_dir).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Read a file and derive all of its properties.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn derive(&self, path: &Path) -> Result<Derivation> {
        let file = FitsFile::open(path)?;
        self.derive_file(&file)
    }

    pub fn derive_file(&self, file: &FitsFile) -> Result<Derivation> {
        let instrument_name = file.header.get("INSTRUME").ok_or_else(|| IngestionError::MissingKeyword {
            keyword: "INSTRUME".to_string(),
            field: fields::INSTRUMENT.to_string(),
        })?;
        let profile = self.registry.resolve(instrument_name)?;
        let handler = profile.handler.as_ref();
        let setup = profile.keywords.map(&file.header);

        let proposal_code = setup.text(fields::PROPOSAL_CODE).map(str::to_string);
        if let Some(code) = &proposal_code {
            if is_ignored_proposal(code) {
                return Ok(Derivation::Ignored {
                    reason: format!("proposal code {}", code),
                });
            }
        }

        let file_name = file.file_name();
        let exposure = Exposure {
            file_name: &file_name,
            setup: &setup,
        };

        let energy = match &proposal_code {
            Some(code) if is_calibration_proposal(code) => None,
            _ => handler.energy(&exposure, &self.context)?,
        };
        let product_type = handler.product_type(&setup)?;
        let block_visit_id = block_visit_id(&setup)?;

        let derived = DerivedExposure {
            instrument: handler.instrument(),
            proposal_code,
            block_visit_id,
            observation_date: observation_date(&setup)?,
            product_id: file.product_id(),
            product_type,
            data_product_type: handler.data_product_type(&setup),
            energy,
            polarization: handler.polarization(&setup)?,
            position: handler.position(&setup)?,
            time: handler.time(&setup)?,
            artifact: Artifact {
                identifier: Uuid::new_v4(),
                name: file_name.clone(),
                path: self.artifact_path(&file.path),
                content_length: file.size,
                content_checksum: file.checksum.clone(),
                product_type,
            },
            setup,
        };
        debug!(
            instrument = %derived.instrument,
            product_type = %derived.product_type,
            has_energy = derived.energy.is_some(),
            has_position = derived.position.is_some(),
            "Derived exposure properties"
        );
        Ok(Derivation::Derived(Box::new(derived)))
    }
}

fn block_visit_id(setup: &SetupRecord) -> Result<Option<i64>> {
    let Some(value) = setup.text(fields::BLOCK_VISIT_ID) else {
        return Ok(None);
    };
    let id = value.parse::<i64>().map_err(|_| {
        IngestionError::invalid(
            setup.keyword(fields::BLOCK_VISIT_ID),
            format!("'{}' is not a block visit id", value),
        )
    })?;
    Ok((id > 0).then_some(id))
}
