use serde::Serialize;

/// Snapshot exported to dashboards and the CLI.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatus {
    pub initialized: bool,
    pub active_cluster: String,
    pub available_clusters: Vec<String>,
    pub running_task_count: usize,
    pub history_count: usize,
}
