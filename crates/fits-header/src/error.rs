//! Error types for FITS header reading.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FitsError>;

#[derive(Debug, Error)]
pub enum FitsError {
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a FITS file: {0}")]
    InvalidFormat(String),

    #[error("Header has no END card within {0} bytes")]
    MissingEnd(usize),

    #[error("Invalid header card {index}: {reason}")]
    InvalidCard { index: usize, reason: String },
}
