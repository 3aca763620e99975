//! Error types for xsecfit

use thiserror::Error;

/// xsecfit error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (bad names, missing references, duplicates).
    /// Fatal: recoverable only by fixing the configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error (internal inconsistency between components)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error (non-finite or otherwise invalid numeric result)
    #[error("Computation error: {0}")]
    Computation(String),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
