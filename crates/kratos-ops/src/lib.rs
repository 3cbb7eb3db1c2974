//! Cluster-scoped resource operations.
//!
//! Every operation takes a [`kratos_cluster::ClusterSession`], so it runs on
//! the cluster the session was opened for, and reports failures as
//! [`OperationError`] values instead of propagating cluster errors.

pub mod deployments;
pub mod error;
pub mod health;
pub mod logs;
pub mod manifest;
pub mod nodes;
pub mod pods;

pub use deployments::{restart_deployment, scale_deployment, RestartOutcome, ScaleOutcome};
pub use error::{ErrorKind, OperationError};
pub use health::{compute_health, health_score, ClusterHealth, NodeReadiness, PodReadiness};
pub use logs::{pod_logs, PodLogs, DEFAULT_TAIL_LINES};
pub use manifest::{
    apply_manifest, parse_manifest, ApplyAction, ApplyReport, AppliedResource, ManifestDocument,
    SkippedDocument,
};
pub use nodes::{node_metrics, NodeMetrics, NodeMetricsReport, ResourceFigures};
pub use pods::{list_pods, ContainerSummary, PodList, PodSummary, ALL_NAMESPACES};
