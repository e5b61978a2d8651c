//! Per-instrument capability bundles.
//!
//! Every supported instrument has a handler implementing
//! [`InstrumentHandler`]. Shared derivations (time, position, product type)
//! are provided as defaults; handlers override what differs.

mod hrs;
mod imaging;
mod rss;

pub use hrs::HrsHandler;
pub use imaging::ImagingCameraHandler;
pub use rss::RssHandler;

use archive_common::{
    DataProductType, Energy, Instrument, ObservationTime, Polarization, Position, ProductType,
};
use std::fmt;

use crate::classify;
use crate::energy::FilterCurveLibrary;
use crate::error::Result;
use crate::keywords::SetupRecord;
use crate::position;
use crate::time;

/// Resources the calculators may consult.
#[derive(Debug, Clone)]
pub struct DerivationContext {
    pub filter_curves: FilterCurveLibrary,
}

impl DerivationContext {
    pub fn new(filter_curves: FilterCurveLibrary) -> Self {
        Self { filter_curves }
    }
}

/// One exposure as seen by the calculators.
#[derive(Debug, Clone, Copy)]
pub struct Exposure<'a> {
    /// File name without directories.
    pub file_name: &'a str,
    pub setup: &'a SetupRecord,
}

pub trait InstrumentHandler: Send + Sync + fmt::Debug {
    fn instrument(&self) -> Instrument;

    /// Spectral coverage; `Ok(None)` when undefined for this setup.
    fn energy(&self, exposure: &Exposure<'_>, context: &DerivationContext) -> Result<Option<Energy>>;

    fn data_product_type(&self, setup: &SetupRecord) -> DataProductType;

    fn polarization(&self, _setup: &SetupRecord) -> Result<Option<Polarization>> {
        Ok(None)
    }

    fn position(&self, setup: &SetupRecord) -> Result<Option<Position>> {
        position::position(setup)
    }

    fn time(&self, setup: &SetupRecord) -> Result<Option<ObservationTime>> {
        time::observation_time(setup)
    }

    fn product_type(&self, setup: &SetupRecord) -> Result<ProductType> {
        classify::product_type(setup)
    }
}
