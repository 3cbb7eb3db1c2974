use thiserror::Error;

/// Failure taxonomy for everything that talks to, or reasons about, a cluster.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClusterError {
    #[error("no reachable cluster configuration: {0}")]
    Discovery(String),
    #[error("cluster '{name}' not found; registered clusters: {}", .available.join(", "))]
    NotFound { name: String, available: Vec<String> },
    /// Carries the API server's message, which already names the object.
    #[error("{0}")]
    ResourceNotFound(String),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("cluster connectivity failed: {0}")]
    Connectivity(String),
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
    #[error("cluster API returned status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("invalid resource: {0}")]
    InvalidResource(String),
}

impl ClusterError {
    /// True for failures where the API server was never (or not fully) reached.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_) | Self::Timeout { .. })
    }
}
