//! Pure-Rust reader for the primary header of FITS exposure files.

pub mod error;
pub mod file;
pub mod header;

pub use error::{FitsError, Result};
pub use file::{read_primary_header, FitsFile};
pub use header::{FitsHeader, BLOCK_SIZE, CARD_SIZE};
