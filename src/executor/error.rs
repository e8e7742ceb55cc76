use crate::storage::StorageError;

use thiserror::Error;

/// Every way a request can fail.
///
/// Protocol, validation and unknown-operation errors are raised before a request reaches
/// storage. Storage errors abort only the request that hit them.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The envelope itself is malformed (not JSON, not an object, bad version, no `api`).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The payload does not match the shape the operation requires.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unknown api: {0}")]
    UnknownOperation(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The executor was terminated before the request started.
    #[error("request canceled")]
    Canceled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Stable lowercase marker used in error bodies and events.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Protocol(_) => "protocol",
            ApiError::Validation(_) => "validation",
            ApiError::UnknownOperation(_) => "unknown_operation",
            ApiError::Storage(_) => "storage",
            ApiError::Canceled => "canceled",
            ApiError::Internal(_) => "internal",
        }
    }
}
