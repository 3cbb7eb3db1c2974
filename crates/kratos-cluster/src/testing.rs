//! Instrumented in-memory [`ClusterBackend`] for tests.
//!
//! Every recorded call captures the context that was active when the call
//! finished, after any configured delay, so an interleaved switch from another
//! task shows up as a wrong context in [`FakeBackend::calls`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    Container, ContainerStatus, Node, NodeCondition, NodeStatus, NodeSystemInfo, Pod, PodSpec,
    PodStatus,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::{json, Map, Value};

use crate::backend::{ClusterBackend, ResourceKind};
use crate::ClusterError;

const FAKE_SERVER_VERSION: &str = "v1.30.2";
const FAKE_CREATED_AT: &str = "2024-05-01T12:00:00Z";

/// One backend call and the context it ran against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub context: String,
    pub call: String,
}

/// In-memory content of one fake cluster.
#[derive(Debug, Clone, Default)]
pub struct FakeCluster {
    pub pods: Vec<Pod>,
    pub nodes: Vec<Node>,
    pub deployments: BTreeMap<(String, String), Value>,
    pub services: BTreeMap<(String, String), Value>,
    pub logs: BTreeMap<(String, String), String>,
    pub server_version: Option<String>,
}

impl FakeCluster {
    pub fn with_pod(mut self, pod: Pod) -> Self {
        self.pods.push(pod);
        self
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_deployment(mut self, namespace: &str, name: &str, replicas: i32) -> Self {
        self.deployments.insert(
            (namespace.to_string(), name.to_string()),
            fake_deployment(namespace, name, replicas),
        );
        self
    }

    pub fn with_logs(mut self, namespace: &str, pod: &str, text: &str) -> Self {
        self.logs
            .insert((namespace.to_string(), pod.to_string()), text.to_string());
        self
    }

    pub fn with_server_version(mut self, version: &str) -> Self {
        self.server_version = Some(version.to_string());
        self
    }

    fn objects(&self, kind: ResourceKind) -> &BTreeMap<(String, String), Value> {
        match kind {
            ResourceKind::Deployment => &self.deployments,
            ResourceKind::Service => &self.services,
        }
    }

    fn objects_mut(&mut self, kind: ResourceKind) -> &mut BTreeMap<(String, String), Value> {
        match kind {
            ResourceKind::Deployment => &mut self.deployments,
            ResourceKind::Service => &mut self.services,
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    active: Option<String>,
    clusters: BTreeMap<String, FakeCluster>,
    calls: Vec<RecordedCall>,
    activations: Vec<String>,
    unreachable: BTreeSet<String>,
    failing_probes: BTreeSet<String>,
    create_failures: BTreeMap<(ResourceKind, String), ClusterError>,
    call_delay: Duration,
}

impl FakeState {
    fn active_name(&self) -> String {
        self.active.clone().unwrap_or_default()
    }

    fn active_cluster(&mut self) -> &mut FakeCluster {
        let name = self.active_name();
        self.clusters.entry(name).or_default()
    }

    fn record(&mut self, call: impl Into<String>) {
        let context = self.active_name();
        self.calls.push(RecordedCall {
            context,
            call: call.into(),
        });
    }
}

#[derive(Debug, Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cluster(self, name: &str, cluster: FakeCluster) -> Self {
        self.lock().clusters.insert(name.to_string(), cluster);
        self
    }

    pub fn with_call_delay(self, delay: Duration) -> Self {
        self.set_call_delay(delay);
        self
    }

    /// Delay applied before every data call (not activation).
    pub fn set_call_delay(&self, delay: Duration) {
        self.lock().call_delay = delay;
    }

    pub fn fail_activation(&self, context: &str) {
        self.lock().unreachable.insert(context.to_string());
    }

    pub fn fail_probe(&self, context: &str) {
        self.lock().failing_probes.insert(context.to_string());
    }

    /// Makes the next creates of `kind`/`name` fail with `error`.
    pub fn fail_create(&self, kind: ResourceKind, name: &str, error: ClusterError) {
        self.lock()
            .create_failures
            .insert((kind, name.to_string()), error);
    }

    pub fn active_context(&self) -> Option<String> {
        self.lock().active.clone()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Recorded calls whose name starts with `prefix`.
    pub fn calls_named(&self, prefix: &str) -> Vec<RecordedCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.call.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Recorded calls whose name is exactly `call`.
    pub fn calls_exact(&self, call: &str) -> Vec<RecordedCall> {
        self.lock()
            .calls
            .iter()
            .filter(|recorded| recorded.call == call)
            .cloned()
            .collect()
    }

    /// Contexts successfully activated, in order.
    pub fn activations(&self) -> Vec<String> {
        self.lock().activations.clone()
    }

    pub fn deployment(&self, cluster: &str, namespace: &str, name: &str) -> Option<Value> {
        self.object(cluster, ResourceKind::Deployment, namespace, name)
    }

    pub fn service(&self, cluster: &str, namespace: &str, name: &str) -> Option<Value> {
        self.object(cluster, ResourceKind::Service, namespace, name)
    }

    fn object(
        &self,
        cluster: &str,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Option<Value> {
        self.lock()
            .clusters
            .get(cluster)
            .and_then(|cluster| {
                cluster
                    .objects(kind)
                    .get(&(namespace.to_string(), name.to_string()))
            })
            .cloned()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        lock_unpoisoned(&self.state)
    }

    async fn pause(&self) {
        let delay = self.lock().call_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ClusterBackend for FakeBackend {
    async fn activate(&self, context: &str) -> Result<(), ClusterError> {
        let mut state = self.lock();
        if state.unreachable.contains(context) {
            return Err(ClusterError::Connectivity(format!(
                "context '{context}' is unreachable"
            )));
        }
        state.active = Some(context.to_string());
        state.activations.push(context.to_string());
        Ok(())
    }

    async fn server_version(&self) -> Result<String, ClusterError> {
        let mut state = self.lock();
        state.record("server_version");
        let active = state.active_name();
        if state.failing_probes.contains(&active) {
            return Err(ClusterError::Connectivity(format!(
                "version probe against '{active}' failed"
            )));
        }
        Ok(state
            .active_cluster()
            .server_version
            .clone()
            .unwrap_or_else(|| FAKE_SERVER_VERSION.to_string()))
    }

    async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<Pod>, ClusterError> {
        self.pause().await;
        let mut state = self.lock();
        state.record(format!("list_pods:{}", namespace.unwrap_or("*")));
        Ok(state
            .active_cluster()
            .pods
            .iter()
            .filter(|pod| match namespace {
                Some(namespace) => pod.metadata.namespace.as_deref() == Some(namespace),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn patch_deployment(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<Deployment, ClusterError> {
        self.pause().await;
        let mut state = self.lock();
        state.record(format!("patch_deployment:{namespace}/{name}"));
        let object = state
            .active_cluster()
            .deployments
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| not_found("deployments.apps", name))?;
        json_merge_patch(object, patch);
        serde_json::from_value(object.clone())
            .map_err(|error| ClusterError::InvalidResource(error.to_string()))
    }

    async fn scale_deployment(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> Result<(), ClusterError> {
        self.pause().await;
        let mut state = self.lock();
        state.record(format!("scale_deployment:{namespace}/{name}={replicas}"));
        let object = state
            .active_cluster()
            .deployments
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| not_found("deployments.apps", name))?;
        json_merge_patch(object, &json!({ "spec": { "replicas": replicas } }));
        Ok(())
    }

    async fn create_resource(
        &self,
        kind: ResourceKind,
        namespace: &str,
        manifest: &Value,
    ) -> Result<(), ClusterError> {
        self.pause().await;
        let name = manifest_name(manifest)?;
        let mut state = self.lock();
        state.record(format!("create:{kind}:{namespace}/{name}"));
        if let Some(error) = state.create_failures.get(&(kind, name.clone())) {
            return Err(error.clone());
        }
        let key = (namespace.to_string(), name.clone());
        let objects = state.active_cluster().objects_mut(kind);
        if objects.contains_key(&key) {
            return Err(ClusterError::AlreadyExists(format!(
                "{} \"{name}\" already exists",
                kind.as_str().to_ascii_lowercase()
            )));
        }
        objects.insert(key, manifest.clone());
        Ok(())
    }

    async fn patch_resource(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        manifest: &Value,
    ) -> Result<(), ClusterError> {
        self.pause().await;
        let mut state = self.lock();
        state.record(format!("patch:{kind}:{namespace}/{name}"));
        let object = state
            .active_cluster()
            .objects_mut(kind)
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| not_found(kind.as_str(), name))?;
        json_merge_patch(object, manifest);
        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, ClusterError> {
        self.pause().await;
        let mut state = self.lock();
        state.record("list_nodes");
        Ok(state.active_cluster().nodes.clone())
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        tail_lines: i64,
    ) -> Result<String, ClusterError> {
        self.pause().await;
        let mut state = self.lock();
        state.record(format!(
            "pod_logs:{namespace}/{pod}:{}:{tail_lines}",
            container.unwrap_or("-")
        ));
        let text = state
            .active_cluster()
            .logs
            .get(&(namespace.to_string(), pod.to_string()))
            .cloned()
            .ok_or_else(|| not_found("pods", pod))?;
        let lines = text.lines().collect::<Vec<_>>();
        let keep = usize::try_from(tail_lines.max(0)).unwrap_or(usize::MAX);
        let start = lines.len().saturating_sub(keep);
        Ok(lines[start..].join("\n"))
    }
}

fn not_found(resource: &str, name: &str) -> ClusterError {
    ClusterError::ResourceNotFound(format!("{resource} \"{name}\" not found"))
}

fn manifest_name(manifest: &Value) -> Result<String, ClusterError> {
    manifest
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ClusterError::InvalidResource("metadata.name is required".to_string()))
}

/// RFC 7386 JSON merge patch.
pub fn json_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_fields) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_fields) = target {
        for (key, value) in patch_fields {
            if value.is_null() {
                target_fields.remove(key);
            } else {
                json_merge_patch(target_fields.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// Pod with one container per `(name, image, ready)` entry.
pub fn fake_pod(name: &str, namespace: &str, phase: &str, containers: &[(&str, &str, bool)]) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            creation_timestamp: serde_json::from_value(json!(FAKE_CREATED_AT)).ok(),
            ..ObjectMeta::default()
        },
        spec: Some(PodSpec {
            node_name: Some("node-a".to_string()),
            containers: containers
                .iter()
                .map(|(container, image, _)| Container {
                    name: (*container).to_string(),
                    image: Some((*image).to_string()),
                    ..Container::default()
                })
                .collect(),
            ..PodSpec::default()
        }),
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            container_statuses: Some(
                containers
                    .iter()
                    .map(|(container, image, ready)| ContainerStatus {
                        name: (*container).to_string(),
                        image: (*image).to_string(),
                        ready: *ready,
                        ..ContainerStatus::default()
                    })
                    .collect(),
            ),
            ..PodStatus::default()
        }),
    }
}

/// Node with a Ready condition and typical capacity figures.
pub fn fake_node(name: &str, ready: bool) -> Node {
    let resources = |cpu: &str, memory: &str| {
        BTreeMap::from([
            ("cpu".to_string(), Quantity(cpu.to_string())),
            ("memory".to_string(), Quantity(memory.to_string())),
            ("pods".to_string(), Quantity("110".to_string())),
        ])
    };
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..ObjectMeta::default()
        },
        spec: None,
        status: Some(NodeStatus {
            conditions: Some(vec![NodeCondition {
                type_: "Ready".to_string(),
                status: if ready { "True" } else { "False" }.to_string(),
                ..NodeCondition::default()
            }]),
            node_info: Some(NodeSystemInfo {
                kubelet_version: "v1.30.2".to_string(),
                operating_system: "linux".to_string(),
                os_image: "Ubuntu 22.04.4 LTS".to_string(),
                kernel_version: "5.15.0-1064-azure".to_string(),
                container_runtime_version: "containerd://1.7.15".to_string(),
                ..NodeSystemInfo::default()
            }),
            capacity: Some(resources("4", "16393892Ki")),
            allocatable: Some(resources("3860m", "12880548Ki")),
            ..NodeStatus::default()
        }),
    }
}

pub fn fake_deployment(namespace: &str, name: &str, replicas: i32) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": { "name": name, "namespace": namespace },
        "spec": {
            "replicas": replicas,
            "selector": { "matchLabels": { "app": name } },
            "template": {
                "metadata": { "labels": { "app": name } },
                "spec": { "containers": [{ "name": name, "image": "nginx:1.27" }] }
            }
        }
    })
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
