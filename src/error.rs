//! Error types for annodiff.

use thiserror::Error;

/// Result type for annodiff operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for annodiff operations.
///
/// All errors are fatal for the current document/type computation and are
/// never retried internally: the engine is deterministic, so a retry would
/// reproduce the identical failure. "Not enough data" is *not* an error;
/// agreement measures report it as a NaN score with diagnostic counters.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A feature has a range type the comparator cannot handle.
    ///
    /// Carries the offending range-type name. Aborts the diff for the
    /// current document/type without corrupting state for others.
    #[error("Unsupported feature range type: {0}")]
    UnsupportedFeatureType(String),

    /// A referenced layer or feature is absent from the supplied schema.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Create an unsupported-feature-type error from a range-type name.
    pub fn unsupported_feature_type(range_type: impl Into<String>) -> Self {
        Error::UnsupportedFeatureType(range_type.into())
    }

    /// Create a schema mismatch error.
    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Error::SchemaMismatch(msg.into())
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }
}
