use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kratos_cluster::ClusterSession;
use serde::Serialize;
use tracing::{info, warn};

use crate::OperationError;

const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResourceFigures {
    pub cpu: String,
    pub memory: String,
    pub pods: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetrics {
    pub name: String,
    pub ready_status: String,
    pub kubelet_version: String,
    pub os: String,
    pub kernel: String,
    pub container_runtime: String,
    pub capacity: ResourceFigures,
    pub allocatable: ResourceFigures,
}

impl NodeMetrics {
    pub fn is_ready(&self) -> bool {
        self.ready_status == "Ready"
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetricsReport {
    pub node_count: usize,
    pub nodes: Vec<NodeMetrics>,
}

pub async fn node_metrics(session: &ClusterSession<'_>) -> Result<NodeMetricsReport, OperationError> {
    let nodes = session.list_nodes().await.map_err(|error| {
        warn!(cluster = session.cluster_name(), error = %error, "failed to list nodes");
        OperationError::from(error)
    })?;
    let nodes = nodes.iter().map(summarize_node).collect::<Vec<_>>();
    info!(cluster = session.cluster_name(), count = nodes.len(), "read node metrics");
    Ok(NodeMetricsReport {
        node_count: nodes.len(),
        nodes,
    })
}

pub fn summarize_node(node: &Node) -> NodeMetrics {
    let status = node.status.as_ref();
    let info = status.and_then(|status| status.node_info.as_ref());
    let os = info
        .map(|info| format!("{} {}", info.operating_system, info.os_image))
        .map(|os| os.trim().to_string())
        .filter(|os| !os.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string());

    NodeMetrics {
        name: node.metadata.name.clone().unwrap_or_default(),
        ready_status: if is_node_ready(node) { "Ready" } else { "NotReady" }.to_string(),
        kubelet_version: known(info.map(|info| &info.kubelet_version)),
        os,
        kernel: known(info.map(|info| &info.kernel_version)),
        container_runtime: known(info.map(|info| &info.container_runtime_version)),
        capacity: figures(status.and_then(|status| status.capacity.as_ref())),
        allocatable: figures(status.and_then(|status| status.allocatable.as_ref())),
    }
}

/// True iff a `Ready` condition reports status `True`.
pub fn is_node_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|condition| condition.type_ == "Ready" && condition.status == "True")
        })
}

fn known(value: Option<&String>) -> String {
    value
        .filter(|value| !value.is_empty())
        .cloned()
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn figures(source: Option<&BTreeMap<String, Quantity>>) -> ResourceFigures {
    let read = |key: &str| {
        source
            .and_then(|quantities| quantities.get(key))
            .map(|quantity| quantity.0.clone())
            .unwrap_or_else(|| UNKNOWN.to_string())
    };
    ResourceFigures {
        cpu: read("cpu"),
        memory: read("memory"),
        pods: read("pods"),
    }
}
