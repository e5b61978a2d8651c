//! SALT exposure metadata derivation.
//!
//! Turns a raw exposure file into the observation graph stored by the
//! archive:
//!
//! - the instrument named in the header is resolved to a handler
//!   ([`InstrumentRegistry`])
//! - the header is mapped through the instrument's keyword table into a
//!   [`SetupRecord`]
//! - the handler derives energy, polarization, position and time
//! - [`DerivedExposure::into_graph`] adds release dates, proposal and target
//!   from the science database
//!
//! Derivation is pure per file and holds no state across files.

pub mod classify;
pub mod derive;
pub mod energy;
pub mod error;
mod graph;
pub mod instruments;
pub mod keywords;
pub mod polarization;
pub mod position;
pub mod registry;
pub mod time;

// Re-exports
pub use derive::{Derivation, DerivedExposure, ExposureDeriver};
pub use energy::FilterCurveLibrary;
pub use error::{IngestionError, Result};
pub use instruments::{DerivationContext, Exposure, InstrumentHandler};
pub use keywords::{KeywordTable, SetupRecord};
pub use registry::{InstrumentProfile, InstrumentRegistry};
