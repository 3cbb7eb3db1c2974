use std::{sync::Arc, time::Duration};

use kratos_bridge::{BridgeConfig, ErrorKind, OperationBridge, Outcome};
use kratos_cluster::{
    testing::{fake_node, fake_pod, FakeBackend, FakeCluster},
    ClusterContextEntry, ClusterError, ClusterRegistry, ClusterRouter, ResourceKind, RouterConfig,
};
use serde_json::{json, Value};

const MANIFEST: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: checkout
  namespace: shop
spec:
  replicas: 1
  selector:
    matchLabels: {app: checkout}
  template:
    metadata:
      labels: {app: checkout}
    spec:
      containers:
      - name: checkout
        image: ghcr.io/acme/checkout:2.1.0
---
apiVersion: v1
kind: Service
metadata:
  name: checkout
  namespace: shop
spec:
  selector: {app: checkout}
  ports:
  - port: 8080
"#;

fn registry() -> ClusterRegistry {
    ClusterRegistry::from_entries(
        vec![
            ClusterContextEntry::new("dev", "aks-dev"),
            ClusterContextEntry::new("prod", "aks-prod"),
            ClusterContextEntry::new("staging", "aks-staging"),
        ],
        Some("dev"),
    )
    .expect("registry should build")
}

fn degraded_cluster() -> FakeCluster {
    let mut cluster = FakeCluster::default()
        .with_node(fake_node("node-1", true))
        .with_node(fake_node("node-2", true))
        .with_node(fake_node("node-3", true))
        .with_node(fake_node("node-4", false));
    for index in 0..10 {
        let phase = if index == 0 { "Pending" } else { "Running" };
        cluster = cluster.with_pod(fake_pod(
            &format!("system-{index}"),
            "kube-system",
            phase,
            &[],
        ));
    }
    cluster
}

async fn bridge_over(backend: Arc<FakeBackend>) -> OperationBridge {
    let router = ClusterRouter::connect(registry(), backend, RouterConfig::default())
        .await
        .expect("router should connect");
    OperationBridge::with_router(router, BridgeConfig::default())
}

fn standard_backend() -> Arc<FakeBackend> {
    Arc::new(
        FakeBackend::new()
            .with_cluster("dev", FakeCluster::default())
            .with_cluster("prod", degraded_cluster())
            .with_cluster("staging", FakeCluster::default()),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn integration_concurrent_dispatches_run_against_their_requested_clusters() {
    let backend = Arc::new(
        FakeBackend::new()
            .with_cluster("dev", FakeCluster::default())
            .with_cluster("prod", FakeCluster::default())
            .with_call_delay(Duration::from_millis(5)),
    );
    let bridge = Arc::new(bridge_over(backend.clone()).await);

    let mut handles = Vec::new();
    for index in 0..24 {
        let bridge = Arc::clone(&bridge);
        let cluster = if index % 2 == 0 { "dev" } else { "prod" };
        handles.push(tokio::spawn(async move {
            let result = bridge
                .dispatch(
                    "listPods",
                    json!({"namespace": format!("ns-{index}"), "cluster": cluster}),
                )
                .await;
            (index, cluster, result)
        }));
    }

    for handle in handles {
        let (index, cluster, result) = handle.await.expect("task should join");
        assert_eq!(result.outcome, Outcome::Success, "request {index}");
        assert_eq!(result.cluster_context, cluster, "request {index}");
        let calls = backend.calls_exact(&format!("list_pods:ns-{index}"));
        assert_eq!(calls.len(), 1, "request {index}");
        assert_eq!(calls[0].context, cluster, "request {index} ran on the wrong cluster");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn integration_unqualified_calls_never_observe_a_half_switched_cluster() {
    let backend = Arc::new(
        FakeBackend::new()
            .with_cluster("dev", FakeCluster::default())
            .with_cluster("prod", FakeCluster::default())
            .with_call_delay(Duration::from_millis(3)),
    );
    let bridge = Arc::new(bridge_over(backend.clone()).await);

    let mut handles = Vec::new();
    for index in 0..16 {
        let bridge = Arc::clone(&bridge);
        handles.push(tokio::spawn(async move {
            let result = if index % 4 == 0 {
                let target = if index % 8 == 0 { "prod" } else { "dev" };
                bridge
                    .dispatch("switchCluster", json!({"clusterName": target}))
                    .await
            } else {
                bridge
                    .dispatch("listPods", json!({"namespace": format!("ns-{index}")}))
                    .await
            };
            (index, result)
        }));
    }
    for handle in handles {
        let (index, result) = handle.await.expect("task should join");
        assert!(result.is_success(), "request {index}");
        if index % 4 != 0 {
            let calls = backend.calls_exact(&format!("list_pods:ns-{index}"));
            assert_eq!(calls.len(), 1, "request {index}");
            assert_eq!(calls[0].context, result.cluster_context, "request {index}");
        }
    }
    assert_eq!(backend.calls_named("list_pods").len(), 12);
}

#[tokio::test]
async fn integration_health_of_empty_cluster_is_full_score() {
    let bridge = bridge_over(standard_backend()).await;
    let result = bridge.dispatch("getClusterHealth", json!({})).await;
    assert!(result.is_success());
    assert_eq!(result.payload["healthScore"], json!(100.0));
    assert_eq!(result.payload["nodes"], json!({"ready": 0, "total": 0}));
    assert_eq!(result.payload["systemPods"], json!({"running": 0, "total": 0}));
    assert_eq!(result.payload["clusterName"], "dev");
}

#[tokio::test]
async fn integration_health_composes_node_and_system_pod_ratios() {
    let bridge = bridge_over(standard_backend()).await;
    let rendered = bridge
        .dispatch_text("get_cluster_health", json!({"cluster": "prod"}))
        .await;
    let result = &rendered.result;
    assert!(result.is_success());
    assert_eq!(result.cluster_context, "prod");
    assert_eq!(result.payload["healthScore"], json!(67.5));
    assert_eq!(result.payload["nodes"], json!({"ready": 3, "total": 4}));
    assert_eq!(result.payload["systemPods"], json!({"running": 9, "total": 10}));
    assert!(rendered.summary.starts_with("Cluster health: 67.5% (3/4 nodes ready"));
}

#[tokio::test]
async fn integration_negative_replicas_are_rejected_without_cluster_calls() {
    let backend = Arc::new(
        FakeBackend::new()
            .with_cluster("dev", FakeCluster::default().with_deployment("default", "x", 2)),
    );
    let bridge = bridge_over(backend.clone()).await;
    let calls_before = backend.calls().len();

    let result = bridge
        .dispatch("scaleDeployment", json!({"deploymentName": "x", "replicas": -1}))
        .await;
    assert_eq!(result.outcome, Outcome::Error);
    assert_eq!(result.error_kind, Some(ErrorKind::InvalidParameter));
    assert_eq!(backend.calls().len(), calls_before);
    assert!(backend.calls_named("scale_deployment").is_empty());
    assert_eq!(
        backend
            .deployment("dev", "default", "x")
            .and_then(|deployment| deployment.pointer("/spec/replicas").cloned()),
        Some(json!(2))
    );
}

#[tokio::test]
async fn integration_missing_required_parameter_names_the_field() {
    let bridge = bridge_over(standard_backend()).await;
    let result = bridge.dispatch("getLogs", json!({"namespace": "default"})).await;
    assert_eq!(result.error_kind, Some(ErrorKind::InvalidParameter));
    assert_eq!(
        result.message.as_deref(),
        Some("missing required parameter 'podName'")
    );
}

#[tokio::test]
async fn integration_partial_apply_returns_results_accumulated_before_failure() {
    let backend = standard_backend();
    backend.fail_create(
        ResourceKind::Service,
        "checkout",
        ClusterError::Api {
            status: 500,
            message: "etcdserver: request timed out".to_string(),
        },
    );
    let bridge = bridge_over(backend.clone()).await;

    let result = bridge.dispatch("applyManifest", json!({"yamlContent": MANIFEST})).await;
    assert_eq!(result.outcome, Outcome::Error);
    assert_eq!(result.error_kind, Some(ErrorKind::PartialApplyFailure));
    let results = result.payload["results"].as_array().cloned().unwrap_or_default();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["resource"], "Deployment/checkout");
    assert_eq!(results[0]["action"], "created");
    assert!(backend.deployment("dev", "shop", "checkout").is_some());
    assert!(backend.service("dev", "shop", "checkout").is_none());
}

#[tokio::test]
async fn integration_apply_twice_creates_then_updates() {
    let bridge = bridge_over(standard_backend()).await;

    let first = bridge.dispatch("apply_yaml", json!({"yamlContent": MANIFEST})).await;
    let second = bridge.dispatch("applyManifest", json!({"yamlContent": MANIFEST})).await;
    let actions = |payload: &Value| {
        payload["results"]
            .as_array()
            .map(|results| {
                results
                    .iter()
                    .map(|result| {
                        format!(
                            "{}={}",
                            result["resource"].as_str().unwrap_or_default(),
                            result["action"].as_str().unwrap_or_default()
                        )
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
    };
    assert_eq!(
        actions(&first.payload),
        vec!["Deployment/checkout=created", "Service/checkout=created"]
    );
    assert_eq!(
        actions(&second.payload),
        vec!["Deployment/checkout=updated", "Service/checkout=updated"]
    );
    assert_eq!(first.operation, "applyManifest");
}

#[tokio::test]
async fn integration_switch_to_unknown_cluster_lists_names_and_keeps_state() {
    let bridge = bridge_over(standard_backend()).await;

    let result = bridge
        .dispatch("switchCluster", json!({"clusterName": "unknown-cluster"}))
        .await;
    assert_eq!(result.error_kind, Some(ErrorKind::NotFound));
    assert_eq!(
        result.payload["availableClusters"],
        json!(["dev", "prod", "staging"])
    );
    let message = result.message.unwrap_or_default();
    assert!(message.contains("dev, prod, staging"), "{message}");
    assert_eq!(result.cluster_context, "dev");

    let status = bridge.status().await;
    assert_eq!(status.active_cluster, "dev");
    assert_eq!(status.history_count, 1);
}

#[tokio::test]
async fn integration_operation_on_unknown_cluster_does_not_switch() {
    let backend = standard_backend();
    let bridge = bridge_over(backend.clone()).await;
    let result = bridge
        .dispatch("listPods", json!({"cluster": "qa", "namespace": "all"}))
        .await;
    assert_eq!(result.error_kind, Some(ErrorKind::NotFound));
    assert!(backend.calls_named("list_pods").is_empty());
    assert_eq!(backend.activations(), vec!["dev"]);
    assert_eq!(bridge.status().await.active_cluster, "dev");
}

#[tokio::test]
async fn integration_list_clusters_marks_exactly_one_active() {
    let bridge = bridge_over(standard_backend()).await;
    bridge
        .dispatch("switch_cluster", json!({"clusterName": "staging"}))
        .await;
    let result = bridge.dispatch("listClusters", json!({})).await;
    let clusters = result.payload["clusters"].as_array().cloned().unwrap_or_default();
    let active = clusters
        .iter()
        .filter(|cluster| cluster["isActive"] == json!(true))
        .map(|cluster| cluster["name"].as_str().unwrap_or_default().to_string())
        .collect::<Vec<_>>();
    assert_eq!(active, vec!["staging"]);
    assert_eq!(result.payload["activeCluster"], "staging");
    assert_eq!(clusters[1]["displayContext"], "aks-prod");
}

#[tokio::test]
async fn integration_custom_system_namespace_feeds_health() {
    let backend = Arc::new(
        FakeBackend::new().with_cluster(
            "dev",
            FakeCluster::default()
                .with_pod(fake_pod("agent", "platform", "Running", &[]))
                .with_pod(fake_pod("collector", "platform", "Failed", &[]))
                .with_pod(fake_pod("coredns", "kube-system", "Running", &[])),
        ),
    );
    let router = ClusterRouter::connect(
        registry(),
        backend,
        RouterConfig {
            system_namespace: "platform".to_string(),
            ..RouterConfig::default()
        },
    )
    .await
    .expect("router should connect");
    let bridge = OperationBridge::with_router(router, BridgeConfig::default());
    let result = bridge.dispatch("getClusterHealth", Value::Null).await;
    assert_eq!(result.payload["healthScore"], json!(50.0));
    assert_eq!(result.payload["systemNamespace"], "platform");
}

#[tokio::test(start_paused = true)]
async fn integration_slow_cluster_call_times_out_as_connectivity_failure() {
    let backend = Arc::new(
        FakeBackend::new()
            .with_cluster("dev", FakeCluster::default())
            .with_call_delay(Duration::from_secs(120)),
    );
    let router = ClusterRouter::connect(
        registry(),
        backend,
        RouterConfig {
            request_timeout: Duration::from_secs(30),
            ..RouterConfig::default()
        },
    )
    .await
    .expect("router should connect");
    let bridge = OperationBridge::with_router(router, BridgeConfig::default());
    let result = bridge.dispatch("getNodeMetrics", json!({})).await;
    assert_eq!(result.error_kind, Some(ErrorKind::ConnectivityFailure));
    assert!(result
        .message
        .as_deref()
        .unwrap_or_default()
        .contains("timed out after 30000ms"));
}
