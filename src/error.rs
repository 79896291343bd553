use std::time::Duration;

use crate::resp_value::RespError;

/// Failure talking to either backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Unreachable(#[from] std::io::Error),
    #[error("backend did not answer within {0:?}")]
    Timeout(Duration),
    #[error("protocol error: {0}")]
    Protocol(#[from] RespError),
    #[error("command failed: {0}")]
    Command(String),
}

impl BackendError {
    /// Whether the failure means the backend could not be reached at all,
    /// as opposed to answering with something unexpected.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, BackendError::Unreachable(_) | BackendError::Timeout(_))
    }
}

/// Errors surfaced by the gateway to its callers.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("unknown dataset {0:?}")]
    NotFound(String),
    #[error("malformed payload: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Backend(#[from] BackendError),
}
