use k8s_openapi::api::core::v1::Pod;
use kratos_cluster::ClusterSession;
use serde::Serialize;
use tracing::{info, warn};

use crate::OperationError;

/// Namespace value that lists pods across every namespace.
pub const ALL_NAMESPACES: &str = "all";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSummary {
    pub name: String,
    pub image: Option<String>,
    pub ready: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PodSummary {
    pub name: String,
    pub namespace: String,
    pub status: String,
    pub node: Option<String>,
    pub created_at: Option<String>,
    pub containers: Vec<ContainerSummary>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PodList {
    pub namespace: String,
    pub pod_count: usize,
    pub pods: Vec<PodSummary>,
}

pub async fn list_pods(
    session: &ClusterSession<'_>,
    namespace: &str,
) -> Result<PodList, OperationError> {
    let scope = (namespace != ALL_NAMESPACES).then_some(namespace);
    let pods = session.list_pods(scope).await.map_err(|error| {
        warn!(cluster = session.cluster_name(), namespace, error = %error, "failed to list pods");
        OperationError::from(error)
    })?;
    let pods = pods.iter().map(summarize_pod).collect::<Vec<_>>();
    info!(
        cluster = session.cluster_name(),
        namespace,
        count = pods.len(),
        "listed pods"
    );
    Ok(PodList {
        namespace: namespace.to_string(),
        pod_count: pods.len(),
        pods,
    })
}

/// Projects a pod onto its summary. A container is ready only when a status
/// entry with the same name reports ready.
pub fn summarize_pod(pod: &Pod) -> PodSummary {
    let statuses = pod
        .status
        .as_ref()
        .and_then(|status| status.container_statuses.as_deref())
        .unwrap_or_default();
    let containers = pod
        .spec
        .as_ref()
        .map(|spec| {
            spec.containers
                .iter()
                .map(|container| ContainerSummary {
                    name: container.name.clone(),
                    image: container.image.clone(),
                    ready: statuses
                        .iter()
                        .any(|status| status.name == container.name && status.ready),
                })
                .collect()
        })
        .unwrap_or_default();

    PodSummary {
        name: pod.metadata.name.clone().unwrap_or_default(),
        namespace: pod.metadata.namespace.clone().unwrap_or_default(),
        status: pod_phase(pod).to_string(),
        node: pod.spec.as_ref().and_then(|spec| spec.node_name.clone()),
        created_at: pod
            .metadata
            .creation_timestamp
            .as_ref()
            .map(|time| time.0.to_rfc3339()),
        containers,
    }
}

pub(crate) fn pod_phase(pod: &Pod) -> &str {
    pod.status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        .unwrap_or("Unknown")
}
