//! Single entry point turning `operation name + parameters` into results.

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use kratos_cluster::{ClusterError, ClusterRouter};
use kratos_core::{current_rfc3339_timestamp, next_sequence_id, JsonlAuditFile, LogRotationPolicy};
use kratos_ops::{
    apply_manifest, compute_health, list_pods, node_metrics, pod_logs, restart_deployment,
    scale_deployment, ErrorKind, OperationError,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::catalog::OPERATION_SPECS;
use crate::history::{HistoryEntry, OperationHistory};
use crate::request::{OperationKind, OperationRequest};
use crate::result::OperationResult;
use crate::status::BridgeStatus;
use crate::summary::render_summary;
use crate::tasks::{TaskLedger, TaskRecord};

pub const DEFAULT_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Optional NDJSON mirror of the history log.
    pub audit_log: Option<PathBuf>,
    /// Entries shown by history views when the caller gives no limit.
    pub history_limit_default: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            audit_log: None,
            history_limit_default: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// Result plus its text rendering, for text-oriented callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedResult {
    pub result: OperationResult,
    pub summary: String,
}

pub struct OperationBridge {
    router: ArcSwapOption<ClusterRouter>,
    history: OperationHistory,
    tasks: TaskLedger,
    audit: Option<JsonlAuditFile>,
    config: BridgeConfig,
}

impl OperationBridge {
    /// Creates a bridge with no router attached; dispatches fail with
    /// `not_initialized` until [`OperationBridge::attach`] is called.
    pub fn new(config: BridgeConfig) -> Self {
        let audit = config
            .audit_log
            .clone()
            .map(|path| JsonlAuditFile::new(path, LogRotationPolicy::from_env()));
        Self {
            router: ArcSwapOption::empty(),
            history: OperationHistory::default(),
            tasks: TaskLedger::default(),
            audit,
            config,
        }
    }

    pub fn with_router(router: ClusterRouter, config: BridgeConfig) -> Self {
        let bridge = Self::new(config);
        bridge.attach(router);
        bridge
    }

    pub fn attach(&self, router: ClusterRouter) {
        info!(clusters = router.registry().len(), "operation bridge initialized");
        self.router.store(Some(Arc::new(router)));
    }

    pub fn is_initialized(&self) -> bool {
        self.router.load().is_some()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Runs one operation. Never fails: every problem is reported through the
    /// returned result, which is also appended to the history.
    ///
    /// Each call is tracked as its own task, named after the operation.
    pub async fn dispatch(&self, operation: &str, parameters: Value) -> OperationResult {
        self.dispatch_for(operation, operation, parameters).await
    }

    /// [`OperationBridge::dispatch`] with the caller's raw request recorded as
    /// the task input.
    pub async fn dispatch_for(
        &self,
        input_message: &str,
        operation: &str,
        parameters: Value,
    ) -> OperationResult {
        let task_id = self.begin_task(input_message, &[operation]);
        let result = self.dispatch_in_task(operation, parameters).await;
        self.tasks.complete(&task_id);
        result
    }

    /// [`OperationBridge::dispatch`] plus a short text summary.
    pub async fn dispatch_text(&self, operation: &str, parameters: Value) -> RenderedResult {
        self.dispatch_text_for(operation, operation, parameters).await
    }

    pub async fn dispatch_text_for(
        &self,
        input_message: &str,
        operation: &str,
        parameters: Value,
    ) -> RenderedResult {
        let result = self.dispatch_for(input_message, operation, parameters).await;
        let summary = render_summary(&result);
        RenderedResult { result, summary }
    }

    async fn dispatch_in_task(&self, operation: &str, parameters: Value) -> OperationResult {
        let operation_id = next_sequence_id("op");
        let (name, cluster_context, execution) = match OperationKind::parse(operation) {
            Some(kind) => {
                let (cluster_context, execution) = self.execute(kind, &parameters).await;
                (kind.name().to_string(), cluster_context, execution)
            }
            None => (
                operation.to_string(),
                self.active_cluster_name().await,
                Err(unknown_operation(operation)),
            ),
        };
        if let Err(error) = &execution {
            warn!(
                operation = %name,
                cluster = %cluster_context,
                kind = error.kind.as_str(),
                error = %error.message,
                "operation failed"
            );
        }

        let timestamp = current_rfc3339_timestamp();
        let result = OperationResult::from_execution(
            &name,
            operation_id,
            timestamp.clone(),
            cluster_context,
            execution,
        );
        self.record(HistoryEntry {
            timestamp,
            operation_name: name,
            parameters,
            result: result.clone(),
        });
        result
    }

    pub fn begin_task(&self, input_message: &str, operations: &[&str]) -> String {
        let selected = operations
            .iter()
            .map(|name| {
                OperationKind::parse(name)
                    .map(|kind| kind.name().to_string())
                    .unwrap_or_else(|| (*name).to_string())
            })
            .collect();
        self.tasks.begin(input_message, selected)
    }

    pub fn complete_task(&self, task_id: &str) -> bool {
        self.tasks.complete(task_id)
    }

    /// Marks a task cancelled. Operations already running are not interrupted.
    pub fn cancel_task(&self, task_id: &str) -> bool {
        let cancelled = self.tasks.cancel(task_id);
        if cancelled {
            info!(task_id, "task cancelled");
        }
        cancelled
    }

    /// Dispatches `calls` in order under a task opened with
    /// [`OperationBridge::begin_task`], then completes it. A task cancelled
    /// while its calls run stays cancelled; operation-level errors still
    /// complete it.
    pub async fn run_task(&self, task_id: &str, calls: Vec<(String, Value)>) -> Vec<OperationResult> {
        let mut results = Vec::with_capacity(calls.len());
        for (name, parameters) in calls {
            results.push(self.dispatch_in_task(&name, parameters).await);
        }
        if !self.tasks.complete(task_id) {
            debug!(task_id, "task already finished before its operations returned");
        }
        results
    }

    pub fn task(&self, task_id: &str) -> Option<TaskRecord> {
        self.tasks.get(task_id)
    }

    pub fn tasks(&self) -> Vec<TaskRecord> {
        self.tasks.snapshot()
    }

    /// Last `limit` history entries, oldest first.
    pub fn recent_history(&self, limit: usize) -> Vec<HistoryEntry> {
        self.history.recent(limit)
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub async fn status(&self) -> BridgeStatus {
        let (initialized, active_cluster, available_clusters) = match self.router.load_full() {
            Some(router) => (true, router.active_cluster().await, router.registry().names()),
            None => (false, String::new(), Vec::new()),
        };
        BridgeStatus {
            initialized,
            active_cluster,
            available_clusters,
            running_task_count: self.tasks.running_count(),
            history_count: self.history.len(),
        }
    }

    /// Cancels processing tasks and detaches the router. Returns the number
    /// of tasks cancelled.
    pub fn shutdown(&self) -> usize {
        let cancelled = self.tasks.cancel_all();
        self.router.store(None);
        info!(cancelled_tasks = cancelled, "operation bridge shut down");
        cancelled
    }

    async fn active_cluster_name(&self) -> String {
        match self.router.load_full() {
            Some(router) => router.active_cluster().await,
            None => String::new(),
        }
    }

    async fn execute(
        &self,
        kind: OperationKind,
        parameters: &Value,
    ) -> (String, Result<Value, OperationError>) {
        let Some(router) = self.router.load_full() else {
            return (
                String::new(),
                Err(OperationError::new(
                    ErrorKind::NotInitialized,
                    "operation bridge is not initialized",
                )),
            );
        };
        match OperationRequest::from_parameters(kind, parameters) {
            Ok(request) => run_request(&router, request).await,
            Err(error) => (router.active_cluster().await, Err(error)),
        }
    }

    fn record(&self, entry: HistoryEntry) {
        if let Some(audit) = &self.audit {
            if let Err(error) = audit.append(&entry) {
                warn!(
                    path = %audit.path().display(),
                    error = %error,
                    "failed to append audit record"
                );
            }
        }
        self.history.append(entry);
    }
}

async fn run_request(
    router: &ClusterRouter,
    request: OperationRequest,
) -> (String, Result<Value, OperationError>) {
    match request {
        OperationRequest::ListClusters => {
            let clusters = router.clusters().await;
            let active = clusters
                .iter()
                .find(|cluster| cluster.is_active)
                .map(|cluster| cluster.name.clone())
                .unwrap_or_default();
            let payload = json!({
                "activeCluster": active,
                "clusterCount": clusters.len(),
                "clusters": clusters,
            });
            (active, Ok(payload))
        }
        OperationRequest::SwitchCluster(params) => match router.switch_to(&params.cluster_name).await {
            Ok(report) => (report.cluster.clone(), Ok(to_payload(&report))),
            Err(error) => (router.active_cluster().await, Err(cluster_failure(error))),
        },
        request => run_in_session(router, request).await,
    }
}

/// Runs a cluster-scoped request while holding the router session, so the
/// optional switch and the operation form one exclusive sequence.
async fn run_in_session(
    router: &ClusterRouter,
    request: OperationRequest,
) -> (String, Result<Value, OperationError>) {
    let mut session = match router.session(request.target_cluster()).await {
        Ok(session) => session,
        Err(error) => return (router.active_cluster().await, Err(cluster_failure(error))),
    };
    let cluster_context = session.cluster_name().to_string();

    let mut execution = match &request {
        OperationRequest::ListPods(params) => list_pods(&session, &params.namespace)
            .await
            .map(|pods| to_payload(&pods)),
        OperationRequest::RestartDeployment(params) => {
            restart_deployment(&session, &params.deployment_name, &params.namespace)
                .await
                .map(|outcome| to_payload(&outcome))
        }
        OperationRequest::ApplyManifest(params) => apply_manifest(&session, &params.yaml_content)
            .await
            .map(|report| to_payload(&report)),
        OperationRequest::ScaleDeployment(params) => scale_deployment(
            &session,
            &params.deployment_name,
            &params.namespace,
            params.replicas,
        )
        .await
        .map(|outcome| to_payload(&outcome)),
        OperationRequest::GetNodeMetrics(_) => node_metrics(&session)
            .await
            .map(|report| to_payload(&report)),
        OperationRequest::GetClusterHealth(_) => compute_health(&mut session)
            .await
            .map(|health| to_payload(&health)),
        OperationRequest::GetLogs(params) => pod_logs(
            &session,
            &params.pod_name,
            &params.namespace,
            params.container_name.as_deref(),
            params.tail_lines,
        )
        .await
        .map(|logs| to_payload(&logs)),
        OperationRequest::ListClusters | OperationRequest::SwitchCluster(_) => {
            Err(OperationError::invalid_parameter(format!(
                "'{}' does not run against a single cluster",
                request.kind().name()
            )))
        }
    };

    if let Some(report) = session
        .switch_report()
        .filter(|report| report.switched || report.warning.is_some())
    {
        let report = to_payload(report);
        match &mut execution {
            Ok(Value::Object(fields)) => {
                fields.insert("clusterSwitch".to_string(), report);
            }
            Err(error) => {
                let mut payload = error.payload.take().unwrap_or_else(|| json!({}));
                if let Value::Object(fields) = &mut payload {
                    fields.insert("clusterSwitch".to_string(), report);
                }
                error.payload = Some(payload);
            }
            Ok(_) => {}
        }
    }
    drop(session);
    (cluster_context, execution)
}

fn to_payload<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_default()
}

fn cluster_failure(error: ClusterError) -> OperationError {
    match error {
        ClusterError::NotFound { name, available } => {
            let error = ClusterError::NotFound {
                name,
                available: available.clone(),
            };
            OperationError::not_found(error.to_string())
                .with_payload(json!({ "availableClusters": available }))
        }
        other => other.into(),
    }
}

fn unknown_operation(operation: &str) -> OperationError {
    let available = OPERATION_SPECS
        .iter()
        .map(|spec| spec.name)
        .collect::<Vec<_>>()
        .join(", ");
    OperationError::not_found(format!(
        "unknown operation '{operation}'; available operations: {available}"
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use kratos_cluster::testing::{fake_pod, FakeBackend, FakeCluster};
    use kratos_cluster::{ClusterContextEntry, ClusterRegistry, ClusterRouter, RouterConfig};
    use serde_json::{json, Value};

    use super::{BridgeConfig, OperationBridge};
    use crate::history::HistoryEntry;
    use crate::result::Outcome;
    use crate::tasks::TaskStatus;
    use crate::ErrorKind;

    async fn bridge_with(config: BridgeConfig) -> (Arc<FakeBackend>, OperationBridge) {
        let backend = Arc::new(
            FakeBackend::new()
                .with_cluster(
                    "dev",
                    FakeCluster::default().with_pod(fake_pod("api", "default", "Running", &[])),
                )
                .with_cluster("prod", FakeCluster::default()),
        );
        let registry = ClusterRegistry::from_entries(
            vec![
                ClusterContextEntry::new("dev", "dev-cluster"),
                ClusterContextEntry::new("prod", "prod-cluster"),
            ],
            Some("dev"),
        )
        .expect("registry");
        let router = ClusterRouter::connect(registry, backend.clone(), RouterConfig::default())
            .await
            .expect("router");
        (backend, OperationBridge::with_router(router, config))
    }

    #[tokio::test]
    async fn unit_dispatch_before_attach_reports_not_initialized() {
        let bridge = OperationBridge::new(BridgeConfig::default());
        let result = bridge.dispatch("listPods", json!({})).await;
        assert_eq!(result.outcome, Outcome::Error);
        assert_eq!(result.error_kind, Some(ErrorKind::NotInitialized));
        assert_eq!(result.cluster_context, "");
        assert_eq!(bridge.history_len(), 1);
        assert!(!bridge.status().await.initialized);
    }

    #[tokio::test]
    async fn unit_unknown_operation_is_not_found_result() {
        let (_backend, bridge) = bridge_with(BridgeConfig::default()).await;
        let result = bridge.dispatch("deletePod", json!({"podName": "x"})).await;
        assert_eq!(result.error_kind, Some(ErrorKind::NotFound));
        assert_eq!(result.operation, "deletePod");
        assert!(result
            .message
            .as_deref()
            .unwrap_or_default()
            .contains("listPods"));
    }

    #[tokio::test]
    async fn functional_success_result_carries_metadata_and_history() {
        let (_backend, bridge) = bridge_with(BridgeConfig::default()).await;
        let result = bridge.dispatch("get_pods", json!({"namespace": "default"})).await;
        assert!(result.is_success());
        assert_eq!(result.operation, "listPods");
        assert!(result.operation_id.starts_with("op-"));
        assert!(result.timestamp.ends_with('Z'));
        assert_eq!(result.cluster_context, "dev");
        assert_eq!(result.payload["podCount"], 1);

        let history = bridge.recent_history(5);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].operation_name, "listPods");
        assert_eq!(history[0].parameters, json!({"namespace": "default"}));
        assert_eq!(history[0].result, result);
    }

    #[tokio::test]
    async fn functional_implicit_switch_is_reported_in_payload() {
        let (_backend, bridge) = bridge_with(BridgeConfig::default()).await;
        let result = bridge
            .dispatch("getNodeMetrics", json!({"cluster": "prod"}))
            .await;
        assert_eq!(result.cluster_context, "prod");
        assert_eq!(result.payload["clusterSwitch"]["switched"], true);
        assert_eq!(result.payload["clusterSwitch"]["previousCluster"], "dev");
        assert_eq!(bridge.status().await.active_cluster, "prod");
    }

    #[tokio::test]
    async fn functional_dispatch_text_renders_summary() {
        let (_backend, bridge) = bridge_with(BridgeConfig::default()).await;
        let rendered = bridge.dispatch_text("listClusters", Value::Null).await;
        assert!(rendered.result.is_success());
        assert!(rendered.summary.starts_with("Found 2 clusters (active: dev)"));
    }

    #[tokio::test]
    async fn functional_audit_log_mirrors_history_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("audit").join("operations.jsonl");
        let (_backend, bridge) = bridge_with(BridgeConfig {
            audit_log: Some(path.clone()),
            ..BridgeConfig::default()
        })
        .await;
        bridge.dispatch("listClusters", json!({})).await;
        bridge.dispatch("switchCluster", json!({"clusterName": "nope"})).await;

        let raw = std::fs::read_to_string(&path).expect("audit file");
        let entries = raw
            .lines()
            .map(|line| serde_json::from_str::<HistoryEntry>(line).expect("entry"))
            .collect::<Vec<_>>();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].operation_name, "switchCluster");
        assert_eq!(entries[1].result.error_kind, Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn functional_run_task_completes_even_with_operation_errors() {
        let (_backend, bridge) = bridge_with(BridgeConfig::default()).await;
        let task_id = bridge.begin_task(
            "restart the ghost deployment",
            &["listPods", "restart_deployment"],
        );
        let results = bridge
            .run_task(
                &task_id,
                vec![
                    ("listPods".to_string(), json!({})),
                    (
                        "restart_deployment".to_string(),
                        json!({"deploymentName": "ghost"}),
                    ),
                ],
            )
            .await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].error_kind, Some(ErrorKind::NotFound));
        let record = bridge.task(&task_id).expect("task");
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.selected_operations, vec!["listPods", "restartDeployment"]);
        assert_eq!(bridge.tasks().len(), 1);
        assert_eq!(bridge.history_len(), 2);
    }

    #[tokio::test]
    async fn regression_each_dispatch_is_tracked_as_a_completed_task() {
        let (_backend, bridge) = bridge_with(BridgeConfig::default()).await;
        bridge.dispatch_text("listPods", json!({})).await;
        bridge
            .dispatch_for(
                "scale web to -1",
                "scale_deployment",
                json!({"deploymentName": "web", "replicas": -1}),
            )
            .await;

        let tasks = bridge.tasks();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].input_message, "listPods");
        assert_eq!(tasks[0].selected_operations, vec!["listPods"]);
        assert_eq!(tasks[1].input_message, "scale web to -1");
        assert_eq!(tasks[1].selected_operations, vec!["scaleDeployment"]);
        assert!(tasks
            .iter()
            .all(|task| task.status == TaskStatus::Completed && task.end_time_unix_ms.is_some()));
        assert_eq!(bridge.status().await.running_task_count, 0);
    }

    #[tokio::test]
    async fn regression_task_cancelled_mid_flight_stays_cancelled() {
        let (backend, bridge) = bridge_with(BridgeConfig::default()).await;
        backend.set_call_delay(Duration::from_millis(200));
        let bridge = Arc::new(bridge);
        let task_id = bridge.begin_task("pods then nodes", &["listPods", "getNodeMetrics"]);

        let runner = {
            let bridge = Arc::clone(&bridge);
            let task_id = task_id.clone();
            tokio::spawn(async move {
                bridge
                    .run_task(
                        &task_id,
                        vec![
                            ("listPods".to_string(), json!({})),
                            ("getNodeMetrics".to_string(), json!({})),
                        ],
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            bridge.task(&task_id).map(|task| task.status),
            Some(TaskStatus::Processing)
        );
        assert!(bridge.cancel_task(&task_id));

        let results = runner.await.expect("runner");
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|result| result.is_success()));
        let record = bridge.task(&task_id).expect("task");
        assert_eq!(record.status, TaskStatus::Cancelled);
        assert!(record.end_time_unix_ms.is_some());
        assert!(!bridge.complete_task(&task_id));
    }

    #[tokio::test]
    async fn functional_shutdown_cancels_processing_tasks_and_detaches_router() {
        let (_backend, bridge) = bridge_with(BridgeConfig::default()).await;
        let open = bridge.begin_task("long running", &["getClusterHealth"]);
        let done = bridge.begin_task("quick", &["listClusters"]);
        assert!(bridge.complete_task(&done));
        assert_eq!(bridge.status().await.running_task_count, 1);

        assert_eq!(bridge.shutdown(), 1);
        assert_eq!(bridge.task(&open).map(|task| task.status), Some(TaskStatus::Cancelled));
        assert_eq!(bridge.task(&done).map(|task| task.status), Some(TaskStatus::Completed));
        let result = bridge.dispatch("listClusters", json!({})).await;
        assert_eq!(result.error_kind, Some(ErrorKind::NotInitialized));
    }
}
