use kratos_cluster::ClusterError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Failure classes reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotInitialized,
    NotFound,
    InvalidParameter,
    ConnectivityFailure,
    PartialApplyFailure,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotInitialized => "not_initialized",
            Self::NotFound => "not_found",
            Self::InvalidParameter => "invalid_parameter",
            Self::ConnectivityFailure => "connectivity_failure",
            Self::PartialApplyFailure => "partial_apply_failure",
        }
    }
}

/// Operation-level failure. `payload` carries partial results when the
/// operation got part of the way through.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct OperationError {
    pub kind: ErrorKind,
    pub message: String,
    pub payload: Option<Value>,
}

impl OperationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            payload: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParameter, message)
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

impl From<ClusterError> for OperationError {
    fn from(error: ClusterError) -> Self {
        let kind = match &error {
            ClusterError::NotFound { .. } | ClusterError::ResourceNotFound(_) => ErrorKind::NotFound,
            ClusterError::InvalidResource(_) => ErrorKind::InvalidParameter,
            ClusterError::Discovery(_)
            | ClusterError::AlreadyExists(_)
            | ClusterError::Connectivity(_)
            | ClusterError::Timeout { .. }
            | ClusterError::Api { .. } => ErrorKind::ConnectivityFailure,
        };
        Self::new(kind, error.to_string())
    }
}
