//! Cluster health score from node readiness and system pod phases.

use kratos_cluster::ClusterSession;
use serde::Serialize;
use tracing::{info, warn};

use crate::nodes::is_node_ready;
use crate::pods::pod_phase;
use crate::OperationError;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct NodeReadiness {
    pub ready: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct PodReadiness {
    pub running: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterHealth {
    pub cluster_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubernetes_version: Option<String>,
    pub health_score: f64,
    pub nodes: NodeReadiness,
    pub system_namespace: String,
    pub system_pods: PodReadiness,
}

/// `100 * ready/total nodes * running/total pods`, rounded to two decimals.
/// An empty node or pod set contributes a factor of one.
pub fn health_score(nodes: NodeReadiness, system_pods: PodReadiness) -> f64 {
    let mut score = 100.0_f64;
    if nodes.total > 0 {
        score *= nodes.ready as f64 / nodes.total as f64;
    }
    if system_pods.total > 0 {
        score *= system_pods.running as f64 / system_pods.total as f64;
    }
    (score * 100.0).round() / 100.0
}

/// Reads nodes and system-namespace pods from the session's cluster and
/// scores them. The API server version is refreshed best-effort.
pub async fn compute_health(session: &mut ClusterSession<'_>) -> Result<ClusterHealth, OperationError> {
    let kubernetes_version = session.refresh_server_version().await;
    let system_namespace = session.system_namespace().to_string();

    let nodes = session.list_nodes().await.map_err(|error| {
        warn!(cluster = session.cluster_name(), error = %error, "health check failed to list nodes");
        OperationError::from(error)
    })?;
    let pods = session
        .list_pods(Some(system_namespace.as_str()))
        .await
        .map_err(|error| {
            warn!(
                cluster = session.cluster_name(),
                namespace = %system_namespace,
                error = %error,
                "health check failed to list system pods"
            );
            OperationError::from(error)
        })?;

    let node_readiness = NodeReadiness {
        ready: nodes.iter().filter(|node| is_node_ready(node)).count(),
        total: nodes.len(),
    };
    let pod_readiness = PodReadiness {
        running: pods.iter().filter(|pod| pod_phase(pod) == "Running").count(),
        total: pods.len(),
    };
    let health_score = health_score(node_readiness, pod_readiness);
    info!(
        cluster = session.cluster_name(),
        health_score,
        ready_nodes = node_readiness.ready,
        total_nodes = node_readiness.total,
        "computed cluster health"
    );
    Ok(ClusterHealth {
        cluster_name: session.cluster_name().to_string(),
        kubernetes_version,
        health_score,
        nodes: node_readiness,
        system_namespace,
        system_pods: pod_readiness,
    })
}
