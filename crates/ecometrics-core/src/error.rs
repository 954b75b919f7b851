use thiserror::Error;

use crate::api::ApiError;
use crate::models::PayloadError;

/// Failures surfaced by the data manager and the metrics source.
///
/// Storage problems never appear here: the local cache recovers from them
/// and reports `false` instead.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Clearing all data requires explicit confirmation")]
    ConfirmationRequired,

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Electricity price must be a positive number, got {0}")]
    InvalidPrice(f64),

    #[error("Import failed: {0}")]
    Import(#[from] PayloadError),

    #[error("Failed to read import file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Not supported by the {backend} backend: {operation}")]
    Unsupported {
        backend: &'static str,
        operation: String,
    },
}

impl DataError {
    pub fn is_auth_error(&self) -> bool {
        matches!(self, DataError::Api(e) if e.is_auth_error())
    }
}
