//! Common types shared by the ingestion pipeline and the archive store.

pub mod error;
pub mod model;
pub mod time;

pub use error::{ArchiveError, ArchiveResult};
pub use model::{
    Artifact, BlockVisit, DataProductType, Energy, Institution, Instrument, Intent, Observation,
    ObservationGraph, ObservationGroup, ObservationStatus, ObservationTime, Plane, Polarization,
    Position, ProductType, ProposalRecord, StokesParameter, Target, Telescope,
    UNKNOWN_TARGET_TYPE,
};
pub use time::{night_of, parse_date, DateRange, DateRangeError};
