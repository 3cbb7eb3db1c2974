//! Short human-readable projections of operation results.

use serde_json::Value;

use crate::request::OperationKind;
use crate::result::OperationResult;

const POD_PREVIEW_LIMIT: usize = 10;

/// Renders a one-glance summary of `result`. Never mutates anything.
pub fn render_summary(result: &OperationResult) -> String {
    if !result.is_success() {
        let message = result.message.as_deref().unwrap_or("operation failed");
        let mut summary = format!("Error: {message}");
        if let Some(applied) = result.payload.get("results").and_then(Value::as_array) {
            summary.push_str(&format!("\nApplied before failure: {}", applied.len()));
            push_applied(&mut summary, applied);
        }
        return summary;
    }

    let payload = &result.payload;
    let mut summary = match OperationKind::parse(&result.operation) {
        Some(OperationKind::ListClusters) => {
            let clusters = array(payload, "clusters");
            let mut lines = format!(
                "Found {} clusters (active: {})",
                clusters.len(),
                text_of(payload, "activeCluster")
            );
            for cluster in clusters {
                let marker = if cluster.get("isActive").and_then(Value::as_bool) == Some(true) {
                    "*"
                } else {
                    " "
                };
                lines.push_str(&format!("\n{marker} {}", text_of(cluster, "name")));
            }
            lines
        }
        Some(OperationKind::SwitchCluster) => {
            if payload.get("switched").and_then(Value::as_bool) == Some(true) {
                format!(
                    "Switched to cluster {} (previous: {})",
                    text_of(payload, "cluster"),
                    text_of(payload, "previousCluster")
                )
            } else {
                format!("Cluster {} is already active", text_of(payload, "cluster"))
            }
        }
        Some(OperationKind::ListPods) => {
            let pods = array(payload, "pods");
            let mut lines = format!(
                "Found {} pods in namespace {}",
                pods.len(),
                text_of(payload, "namespace")
            );
            for pod in pods.iter().take(POD_PREVIEW_LIMIT) {
                lines.push_str(&format!(
                    "\n- {}/{} ({})",
                    text_of(pod, "namespace"),
                    text_of(pod, "name"),
                    text_of(pod, "status")
                ));
            }
            if pods.len() > POD_PREVIEW_LIMIT {
                lines.push_str(&format!("\n... and {} more", pods.len() - POD_PREVIEW_LIMIT));
            }
            lines
        }
        Some(OperationKind::RestartDeployment) => format!(
            "Restarted deployment {} in namespace {}",
            text_of(payload, "deploymentName"),
            text_of(payload, "namespace")
        ),
        Some(OperationKind::ApplyManifest) => {
            let applied = array(payload, "results");
            let skipped = array(payload, "skipped");
            let mut lines = format!("Applied {} resources", applied.len());
            push_applied(&mut lines, applied);
            if !skipped.is_empty() {
                lines.push_str(&format!("\nSkipped {} unsupported documents", skipped.len()));
            }
            lines
        }
        Some(OperationKind::ScaleDeployment) => format!(
            "Scaled deployment {} in namespace {} to {} replicas",
            text_of(payload, "deploymentName"),
            text_of(payload, "namespace"),
            number(payload, "replicas")
        ),
        Some(OperationKind::GetNodeMetrics) => {
            let nodes = array(payload, "nodes");
            let ready = nodes
                .iter()
                .filter(|node| node.get("readyStatus").and_then(Value::as_str) == Some("Ready"))
                .count();
            format!("Found {} nodes ({ready} ready)", nodes.len())
        }
        Some(OperationKind::GetClusterHealth) => format!(
            "Cluster health: {}% ({}/{} nodes ready, {}/{} system pods running)",
            payload
                .get("healthScore")
                .and_then(Value::as_f64)
                .unwrap_or_default(),
            number(&payload["nodes"], "ready"),
            number(&payload["nodes"], "total"),
            number(&payload["systemPods"], "running"),
            number(&payload["systemPods"], "total")
        ),
        Some(OperationKind::GetLogs) => format!(
            "Retrieved {} log lines from pod {}",
            number(payload, "lineCount"),
            text_of(payload, "podName")
        ),
        None => format!("{} completed", result.operation),
    };

    if let Some(warning) = payload
        .get("warning")
        .or_else(|| payload.pointer("/clusterSwitch/warning"))
        .and_then(Value::as_str)
    {
        summary.push_str(&format!("\nWarning: {warning}"));
    }
    summary
}

fn push_applied(summary: &mut String, applied: &[Value]) {
    for resource in applied {
        summary.push_str(&format!(
            "\n- {}: {}",
            text_of(resource, "resource"),
            text_of(resource, "action")
        ));
    }
}

fn array<'a>(payload: &'a Value, key: &str) -> &'a [Value] {
    payload
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn text_of<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("?")
}

fn number(payload: &Value, key: &str) -> i64 {
    payload.get(key).and_then(Value::as_i64).unwrap_or_default()
}
