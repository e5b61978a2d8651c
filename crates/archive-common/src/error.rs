//! Error types for the archive.

use thiserror::Error;

/// Result type alias using ArchiveError.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Errors raised while validating or persisting observation records.
#[derive(Debug, Error)]
pub enum ArchiveError {
    // === Record Errors ===
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Unknown {kind}: {value}")]
    UnknownValue { kind: &'static str, value: String },

    // === Write Errors ===
    #[error("No observation found for artifact path: {0}")]
    ObservationNotFound(String),

    // === Storage Errors ===
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Science database error: {0}")]
    ScienceDatabaseError(String),
}

impl ArchiveError {
    /// Shorthand for an invalid-record error.
    pub fn invalid(message: impl Into<String>) -> Self {
        ArchiveError::InvalidRecord(message.into())
    }

    /// Whether retrying the same write could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ArchiveError::DatabaseError(_) | ArchiveError::ScienceDatabaseError(_)
        )
    }
}
