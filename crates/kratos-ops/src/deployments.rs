use kratos_cluster::{ClusterError, ClusterSession};
use kratos_core::current_rfc3339_timestamp;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::OperationError;

pub const RESTARTED_AT_ANNOTATION: &str = "kubectl.kubernetes.io/restartedAt";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RestartOutcome {
    pub deployment_name: String,
    pub namespace: String,
    pub restarted_at: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScaleOutcome {
    pub deployment_name: String,
    pub namespace: String,
    pub replicas: i32,
}

/// Triggers a rollout by stamping the pod template's restart annotation.
pub async fn restart_deployment(
    session: &ClusterSession<'_>,
    name: &str,
    namespace: &str,
) -> Result<RestartOutcome, OperationError> {
    let restarted_at = current_rfc3339_timestamp();
    let patch = json!({
        "spec": {
            "template": {
                "metadata": {
                    "annotations": { RESTARTED_AT_ANNOTATION: restarted_at }
                }
            }
        }
    });
    session
        .patch_deployment(namespace, name, &patch)
        .await
        .map_err(|error| deployment_error(session, "restart", name, namespace, error))?;
    info!(
        cluster = session.cluster_name(),
        deployment = name,
        namespace,
        "restarted deployment"
    );
    Ok(RestartOutcome {
        deployment_name: name.to_string(),
        namespace: namespace.to_string(),
        restarted_at,
    })
}

/// Sets the desired replica count. Non-negative counts are enforced upstream.
pub async fn scale_deployment(
    session: &ClusterSession<'_>,
    name: &str,
    namespace: &str,
    replicas: i32,
) -> Result<ScaleOutcome, OperationError> {
    session
        .scale_deployment(namespace, name, replicas)
        .await
        .map_err(|error| deployment_error(session, "scale", name, namespace, error))?;
    info!(
        cluster = session.cluster_name(),
        deployment = name,
        namespace,
        replicas,
        "scaled deployment"
    );
    Ok(ScaleOutcome {
        deployment_name: name.to_string(),
        namespace: namespace.to_string(),
        replicas,
    })
}

fn deployment_error(
    session: &ClusterSession<'_>,
    action: &str,
    name: &str,
    namespace: &str,
    error: ClusterError,
) -> OperationError {
    warn!(
        cluster = session.cluster_name(),
        deployment = name,
        namespace,
        error = %error,
        "failed to {action} deployment"
    );
    match error {
        ClusterError::ResourceNotFound(_) => OperationError::not_found(format!(
            "deployment '{name}' not found in namespace '{namespace}'"
        )),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use kratos_cluster::testing::FakeCluster;

    use super::{restart_deployment, scale_deployment, RESTARTED_AT_ANNOTATION};
    use crate::test_support::router_with;
    use crate::ErrorKind;

    #[tokio::test]
    async fn functional_restart_writes_restarted_at_annotation() {
        let (backend, router) =
            router_with(FakeCluster::default().with_deployment("default", "web", 2)).await;
        let session = router.session(None).await.expect("session");
        let outcome = restart_deployment(&session, "web", "default")
            .await
            .expect("restart");
        drop(session);

        let deployment = backend.deployment("dev", "default", "web").expect("deployment");
        let annotation = deployment
            .pointer("/spec/template/metadata/annotations")
            .and_then(|annotations| annotations.get(RESTARTED_AT_ANNOTATION))
            .and_then(|value| value.as_str());
        assert_eq!(annotation, Some(outcome.restarted_at.as_str()));
        assert_eq!(deployment.pointer("/spec/replicas"), Some(&serde_json::json!(2)));
    }

    #[tokio::test]
    async fn regression_restart_missing_deployment_is_not_found() {
        let (_backend, router) = router_with(FakeCluster::default()).await;
        let session = router.session(None).await.expect("session");
        let error = restart_deployment(&session, "ghost", "apps")
            .await
            .expect_err("missing");
        assert_eq!(error.kind, ErrorKind::NotFound);
        assert_eq!(error.message, "deployment 'ghost' not found in namespace 'apps'");
    }

    #[tokio::test]
    async fn functional_scale_sets_replica_count() {
        let (backend, router) =
            router_with(FakeCluster::default().with_deployment("default", "web", 2)).await;
        let session = router.session(None).await.expect("session");
        let outcome = scale_deployment(&session, "web", "default", 0)
            .await
            .expect("scale");
        drop(session);
        assert_eq!(outcome.replicas, 0);
        let deployment = backend.deployment("dev", "default", "web").expect("deployment");
        assert_eq!(deployment.pointer("/spec/replicas"), Some(&serde_json::json!(0)));
    }
}
