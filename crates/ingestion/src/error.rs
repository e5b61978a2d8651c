//! Error types for the ingestion crate.

use archive_common::ArchiveError;
use fits_header::FitsError;
use thiserror::Error;

/// Errors that can occur while deriving an observation from a file.
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("Missing header keyword {keyword} (needed for {field})")]
    MissingKeyword { keyword: String, field: String },

    #[error("Invalid value for {keyword}: {message}")]
    InvalidHeaderValue { keyword: String, message: String },

    #[error("Filter curve error: {0}")]
    FilterCurve(String),

    #[error("Invalid keyword table: {0}")]
    KeywordTable(String),

    #[error("Failed to read header: {0}")]
    Header(#[from] FitsError),

    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid record: {0}")]
    InvalidRecord(#[from] ArchiveError),
}

impl IngestionError {
    pub(crate) fn invalid(keyword: impl Into<String>, message: impl Into<String>) -> Self {
        IngestionError::InvalidHeaderValue {
            keyword: keyword.into(),
            message: message.into(),
        }
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;
