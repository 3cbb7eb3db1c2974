use kratos_cluster::{ClusterError, ClusterSession};
use serde::Serialize;
use tracing::{info, warn};

use crate::OperationError;

pub const DEFAULT_TAIL_LINES: i64 = 100;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PodLogs {
    pub pod_name: String,
    pub namespace: String,
    pub container_name: Option<String>,
    pub tail_lines: i64,
    pub line_count: usize,
    pub logs: String,
}

/// Reads the last `tail_lines` lines of a container log. `container` may be
/// omitted for single-container pods.
pub async fn pod_logs(
    session: &ClusterSession<'_>,
    pod: &str,
    namespace: &str,
    container: Option<&str>,
    tail_lines: i64,
) -> Result<PodLogs, OperationError> {
    let logs = session
        .pod_logs(namespace, pod, container, tail_lines)
        .await
        .map_err(|error| {
            warn!(
                cluster = session.cluster_name(),
                pod,
                namespace,
                error = %error,
                "failed to read pod logs"
            );
            match error {
                ClusterError::ResourceNotFound(_) => OperationError::not_found(format!(
                    "pod '{pod}' not found in namespace '{namespace}'"
                )),
                other => other.into(),
            }
        })?;
    let line_count = logs.lines().count();
    info!(cluster = session.cluster_name(), pod, namespace, line_count, "read pod logs");
    Ok(PodLogs {
        pod_name: pod.to_string(),
        namespace: namespace.to_string(),
        container_name: container.map(str::to_string),
        tail_lines,
        line_count,
        logs,
    })
}
