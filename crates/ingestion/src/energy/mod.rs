//! Spectral coverage calculators.
//!
//! Each strategy returns `Ok(None)` when an exposure has no meaningful
//! spectral properties; that is an expected outcome and the plane is then
//! written without an Energy record.

pub mod fabry_perot;
pub mod filter;
pub mod grating;
pub mod hrs;

pub use fabry_perot::{fabry_perot_energy, EtalonMode, EtalonState};
pub use filter::{filter_energy, FilterCurveLibrary, TransmissionCurve};
pub use grating::{grating_frequency, is_longslit, slit_width_from_barcode, GratingSetup};
pub use hrs::{hrs_energy, HrsArm, HrsMode};
