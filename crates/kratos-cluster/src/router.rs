//! Active-cluster state and the switch-then-operate serialization boundary.
//!
//! [`ClusterRouter`] owns the only mutable cross-request state: the name of the
//! active context. Backend calls are reachable only through a
//! [`ClusterSession`], which holds the state lock from the "does the requested
//! cluster match the active one" check until the session is dropped. A
//! concurrent caller asking for another cluster waits for the whole sequence.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Node, Pod};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::backend::{ClusterBackend, ResourceKind};
use crate::registry::{ClusterDescriptor, ClusterRegistry};
use crate::ClusterError;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SYSTEM_NAMESPACE: &str = "kube-system";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Upper bound applied to every backend call.
    pub request_timeout: Duration,
    /// Namespace whose pods feed the health score.
    pub system_namespace: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            system_namespace: DEFAULT_SYSTEM_NAMESPACE.to_string(),
        }
    }
}

/// Outcome of a switch request.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SwitchReport {
    pub cluster: String,
    pub previous_cluster: String,
    pub switched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug)]
struct ActiveClusterState {
    active: String,
    switch_count: u64,
    server_version: Option<String>,
}

pub struct ClusterRouter {
    registry: ClusterRegistry,
    backend: Arc<dyn ClusterBackend>,
    state: Mutex<ActiveClusterState>,
    config: RouterConfig,
}

impl ClusterRouter {
    /// Activates the registry's initial context on `backend`.
    ///
    /// Fails when the initial context cannot be activated. A failed version
    /// probe is only logged.
    pub async fn connect(
        registry: ClusterRegistry,
        backend: Arc<dyn ClusterBackend>,
        config: RouterConfig,
    ) -> Result<Self, ClusterError> {
        let initial = registry.initial_active().to_string();
        bounded(&config, "activate", backend.activate(&initial)).await?;
        let server_version = match bounded(&config, "version probe", backend.server_version()).await {
            Ok(version) => Some(version),
            Err(error) => {
                warn!(cluster = %initial, error = %error, "initial connectivity probe failed");
                None
            }
        };
        info!(cluster = %initial, clusters = registry.len(), "cluster router ready");
        Ok(Self {
            registry,
            backend,
            state: Mutex::new(ActiveClusterState {
                active: initial,
                switch_count: 0,
                server_version,
            }),
            config,
        })
    }

    pub fn registry(&self) -> &ClusterRegistry {
        &self.registry
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Name of the active context. Waits for any in-flight session.
    pub async fn active_cluster(&self) -> String {
        self.state.lock().await.active.clone()
    }

    /// Number of effective switches since startup.
    pub async fn switch_count(&self) -> u64 {
        self.state.lock().await.switch_count
    }

    /// Registry descriptors with `is_active` reflecting the live state.
    pub async fn clusters(&self) -> Vec<ClusterDescriptor> {
        let state = self.state.lock().await;
        self.registry
            .list()
            .iter()
            .map(|descriptor| ClusterDescriptor {
                is_active: descriptor.name == state.active,
                ..descriptor.clone()
            })
            .collect()
    }

    /// Makes `name` the active context.
    ///
    /// Unknown names and activation failures leave the active context
    /// unchanged. A failed probe after a successful activation keeps the
    /// switch and is reported through [`SwitchReport::warning`].
    pub async fn switch_to(&self, name: &str) -> Result<SwitchReport, ClusterError> {
        let mut state = self.state.lock().await;
        self.switch_locked(&mut state, name).await
    }

    /// Opens a session on `target`, switching first when it differs from the
    /// active context. `None` operates on whatever is active.
    ///
    /// The returned session keeps the state lock until dropped.
    pub async fn session(&self, target: Option<&str>) -> Result<ClusterSession<'_>, ClusterError> {
        let mut guard = self.state.lock().await;
        let switch_report = match target {
            Some(name) => Some(self.switch_locked(&mut guard, name).await?),
            None => None,
        };
        let descriptor = ClusterDescriptor {
            is_active: true,
            ..self.registry.get(&guard.active)?.clone()
        };
        Ok(ClusterSession {
            guard,
            router: self,
            descriptor,
            switch_report,
        })
    }

    async fn switch_locked(
        &self,
        state: &mut ActiveClusterState,
        name: &str,
    ) -> Result<SwitchReport, ClusterError> {
        self.registry.get(name)?;
        let previous = state.active.clone();
        if previous == name {
            debug!(cluster = name, "requested cluster already active");
            return Ok(SwitchReport {
                cluster: name.to_string(),
                previous_cluster: previous,
                switched: false,
                server_version: state.server_version.clone(),
                warning: None,
            });
        }

        if let Err(error) = bounded(&self.config, "activate", self.backend.activate(name)).await {
            warn!(cluster = name, active = %previous, error = %error, "cluster switch failed");
            return Err(match error {
                ClusterError::Timeout { .. } | ClusterError::Connectivity(_) => error,
                other => ClusterError::Connectivity(other.to_string()),
            });
        }
        state.active = name.to_string();
        state.switch_count += 1;

        let (server_version, warning) =
            match bounded(&self.config, "version probe", self.backend.server_version()).await {
                Ok(version) => (Some(version), None),
                Err(error) => {
                    warn!(cluster = name, error = %error, "connectivity probe failed after switch");
                    (
                        None,
                        Some(format!("switched to '{name}' but the API server did not answer: {error}")),
                    )
                }
            };
        state.server_version = server_version.clone();
        info!(cluster = name, previous = %previous, "switched active cluster");
        Ok(SwitchReport {
            cluster: name.to_string(),
            previous_cluster: previous,
            switched: true,
            server_version,
            warning,
        })
    }
}

/// Exclusive handle on the active cluster.
///
/// Every backend call is bounded by the router's request timeout.
pub struct ClusterSession<'a> {
    guard: MutexGuard<'a, ActiveClusterState>,
    router: &'a ClusterRouter,
    descriptor: ClusterDescriptor,
    switch_report: Option<SwitchReport>,
}

impl ClusterSession<'_> {
    pub fn cluster_name(&self) -> &str {
        &self.guard.active
    }

    pub fn descriptor(&self) -> &ClusterDescriptor {
        &self.descriptor
    }

    /// Present when the session was opened with an explicit target.
    pub fn switch_report(&self) -> Option<&SwitchReport> {
        self.switch_report.as_ref()
    }

    pub fn system_namespace(&self) -> &str {
        &self.router.config.system_namespace
    }

    /// Last version reported by the API server, if the latest probe succeeded.
    pub fn server_version(&self) -> Option<&str> {
        self.guard.server_version.as_deref()
    }

    /// Re-probes the API server; failures clear the cached version.
    pub async fn refresh_server_version(&mut self) -> Option<String> {
        let probed = self.bounded("version probe", self.backend().server_version()).await;
        let version = match probed {
            Ok(version) => Some(version),
            Err(error) => {
                warn!(cluster = %self.guard.active, error = %error, "version probe failed");
                None
            }
        };
        self.guard.server_version = version.clone();
        version
    }

    pub async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<Pod>, ClusterError> {
        self.bounded("list pods", self.backend().list_pods(namespace))
            .await
    }

    pub async fn patch_deployment(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<Deployment, ClusterError> {
        self.bounded(
            "patch deployment",
            self.backend().patch_deployment(namespace, name, patch),
        )
        .await
    }

    pub async fn scale_deployment(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> Result<(), ClusterError> {
        self.bounded(
            "scale deployment",
            self.backend().scale_deployment(namespace, name, replicas),
        )
        .await
    }

    pub async fn create_resource(
        &self,
        kind: ResourceKind,
        namespace: &str,
        manifest: &Value,
    ) -> Result<(), ClusterError> {
        self.bounded(
            "create resource",
            self.backend().create_resource(kind, namespace, manifest),
        )
        .await
    }

    pub async fn patch_resource(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        manifest: &Value,
    ) -> Result<(), ClusterError> {
        self.bounded(
            "patch resource",
            self.backend().patch_resource(kind, namespace, name, manifest),
        )
        .await
    }

    pub async fn list_nodes(&self) -> Result<Vec<Node>, ClusterError> {
        self.bounded("list nodes", self.backend().list_nodes()).await
    }

    pub async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        tail_lines: i64,
    ) -> Result<String, ClusterError> {
        self.bounded(
            "read pod logs",
            self.backend().pod_logs(namespace, pod, container, tail_lines),
        )
        .await
    }

    fn backend(&self) -> &dyn ClusterBackend {
        self.router.backend.as_ref()
    }

    async fn bounded<T, F>(&self, operation: &str, call: F) -> Result<T, ClusterError>
    where
        F: Future<Output = Result<T, ClusterError>>,
    {
        bounded(&self.router.config, operation, call).await
    }
}

async fn bounded<T, F>(config: &RouterConfig, operation: &str, call: F) -> Result<T, ClusterError>
where
    F: Future<Output = Result<T, ClusterError>>,
{
    match tokio::time::timeout(config.request_timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ClusterError::Timeout {
            operation: operation.to_string(),
            timeout_ms: u64::try_from(config.request_timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::{ClusterRouter, RouterConfig};
    use crate::testing::{fake_pod, FakeBackend, FakeCluster};
    use crate::{ClusterContextEntry, ClusterError, ClusterRegistry};

    fn registry() -> ClusterRegistry {
        ClusterRegistry::from_entries(
            vec![
                ClusterContextEntry::new("dev", "dev-cluster"),
                ClusterContextEntry::new("prod", "prod-cluster"),
            ],
            Some("dev"),
        )
        .expect("registry")
    }

    fn backend() -> Arc<FakeBackend> {
        Arc::new(
            FakeBackend::new()
                .with_cluster(
                    "dev",
                    FakeCluster::default().with_pod(fake_pod("api", "default", "Running", &[])),
                )
                .with_cluster("prod", FakeCluster::default()),
        )
    }

    async fn router(backend: Arc<FakeBackend>, config: RouterConfig) -> ClusterRouter {
        ClusterRouter::connect(registry(), backend, config)
            .await
            .expect("router")
    }

    #[tokio::test]
    async fn unit_connect_activates_initial_context() {
        let backend = backend();
        let router = router(backend.clone(), RouterConfig::default()).await;
        assert_eq!(router.active_cluster().await, "dev");
        assert_eq!(backend.active_context().as_deref(), Some("dev"));
        let clusters = router.clusters().await;
        assert!(clusters[0].is_active);
        assert!(!clusters[1].is_active);
    }

    #[tokio::test]
    async fn functional_switch_to_known_cluster_updates_state_and_reports_previous() {
        let backend = backend();
        let router = router(backend.clone(), RouterConfig::default()).await;
        let report = router.switch_to("prod").await.expect("switch");
        assert!(report.switched);
        assert_eq!(report.previous_cluster, "dev");
        assert!(report.warning.is_none());
        assert_eq!(router.active_cluster().await, "prod");
        assert_eq!(router.switch_count().await, 1);
        assert_eq!(backend.active_context().as_deref(), Some("prod"));
    }

    #[tokio::test]
    async fn unit_switch_to_active_cluster_is_noop() {
        let router = router(backend(), RouterConfig::default()).await;
        let report = router.switch_to("dev").await.expect("noop");
        assert!(!report.switched);
        assert_eq!(router.switch_count().await, 0);
    }

    #[tokio::test]
    async fn regression_switch_to_unknown_cluster_leaves_state_unchanged() {
        let router = router(backend(), RouterConfig::default()).await;
        let error = router.switch_to("unknown-cluster").await.expect_err("unknown");
        match error {
            ClusterError::NotFound { name, available } => {
                assert_eq!(name, "unknown-cluster");
                assert_eq!(available, vec!["dev", "prod"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(router.active_cluster().await, "dev");
    }

    #[tokio::test]
    async fn functional_failed_activation_is_connectivity_error_and_keeps_active() {
        let backend = backend();
        backend.fail_activation("prod");
        let router = router(backend.clone(), RouterConfig::default()).await;
        let error = router.switch_to("prod").await.expect_err("unreachable");
        assert!(error.is_connectivity());
        assert_eq!(router.active_cluster().await, "dev");
        assert_eq!(backend.active_context().as_deref(), Some("dev"));
    }

    #[tokio::test]
    async fn functional_failed_probe_keeps_switch_and_warns() {
        let backend = backend();
        backend.fail_probe("prod");
        let router = router(backend, RouterConfig::default()).await;
        let report = router.switch_to("prod").await.expect("switch");
        assert!(report.switched);
        assert!(report.server_version.is_none());
        assert!(report.warning.as_deref().unwrap_or_default().contains("prod"));
        assert_eq!(router.active_cluster().await, "prod");
    }

    #[tokio::test]
    async fn functional_session_with_target_switches_before_operating() {
        let backend = backend();
        let router = router(backend.clone(), RouterConfig::default()).await;
        {
            let session = router.session(Some("prod")).await.expect("session");
            assert_eq!(session.cluster_name(), "prod");
            assert!(session.switch_report().map(|r| r.switched).unwrap_or(false));
            let pods = session.list_pods(None).await.expect("pods");
            assert!(pods.is_empty());
        }
        let calls = backend.calls();
        assert_eq!(calls.last().map(|call| call.context.as_str()), Some("prod"));
    }

    #[tokio::test]
    async fn unit_session_without_target_uses_active_cluster() {
        let router = router(backend(), RouterConfig::default()).await;
        let session = router.session(None).await.expect("session");
        assert_eq!(session.cluster_name(), "dev");
        assert!(session.switch_report().is_none());
        assert_eq!(session.list_pods(Some("default")).await.expect("pods").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn regression_slow_backend_call_surfaces_timeout() {
        let backend = backend();
        let config = RouterConfig {
            request_timeout: Duration::from_millis(50),
            ..RouterConfig::default()
        };
        let router = router(backend.clone(), config).await;
        backend.set_call_delay(Duration::from_secs(5));
        let session = router.session(None).await.expect("session");
        let error = session.list_nodes().await.expect_err("timeout");
        assert_eq!(
            error,
            ClusterError::Timeout {
                operation: "list nodes".to_string(),
                timeout_ms: 50,
            }
        );
    }
}
