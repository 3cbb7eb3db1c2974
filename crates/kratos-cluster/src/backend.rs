use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Node, Pod};
use serde_json::Value;

use crate::ClusterError;

/// Namespaced resource kinds accepted by manifest apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Deployment,
    Service,
}

impl ResourceKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "Deployment" => Some(Self::Deployment),
            "Service" => Some(Self::Service),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deployment => "Deployment",
            Self::Service => "Service",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cluster-access capability the operations layer depends on.
///
/// A backend holds one active context at a time. Every call after
/// [`ClusterBackend::activate`] targets that context until the next
/// activation, so callers must serialize activate-then-call sequences.
/// Inside the workspace only [`crate::ClusterSession`] does that.
#[async_trait]
pub trait ClusterBackend: Send + Sync {
    /// Points the backend at `context`. On failure the previous context stays active.
    async fn activate(&self, context: &str) -> Result<(), ClusterError>;

    /// Git version reported by the API server; used as the connectivity probe.
    async fn server_version(&self) -> Result<String, ClusterError>;

    /// Lists pods in `namespace`, or in every namespace when `None`.
    async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<Pod>, ClusterError>;

    /// Applies a JSON merge patch to a deployment and returns the updated object.
    async fn patch_deployment(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<Deployment, ClusterError>;

    async fn scale_deployment(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> Result<(), ClusterError>;

    /// Creates the resource described by `manifest`. Reports
    /// [`ClusterError::AlreadyExists`] when an object with the same name exists.
    async fn create_resource(
        &self,
        kind: ResourceKind,
        namespace: &str,
        manifest: &Value,
    ) -> Result<(), ClusterError>;

    /// Merge-patches an existing resource with the full manifest body.
    async fn patch_resource(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        manifest: &Value,
    ) -> Result<(), ClusterError>;

    async fn list_nodes(&self) -> Result<Vec<Node>, ClusterError>;

    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        tail_lines: i64,
    ) -> Result<String, ClusterError>;
}
