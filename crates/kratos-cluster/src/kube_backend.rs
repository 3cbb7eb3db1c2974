//! [`ClusterBackend`] implementation backed by kube-rs.

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Node, Pod, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams, LogParams, Patch, PatchParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::backend::{ClusterBackend, ResourceKind};
use crate::ClusterError;

const FIELD_MANAGER: &str = "kratos";

/// Reads a kubeconfig from `path`, or via kube's standard lookup
/// (`KUBECONFIG`, then `~/.kube/config`) when `path` is `None`.
pub fn load_kubeconfig(path: Option<&Path>) -> Result<Kubeconfig, ClusterError> {
    let loaded = match path {
        Some(path) => Kubeconfig::read_from(path),
        None => Kubeconfig::read(),
    };
    loaded.map_err(|error| ClusterError::Discovery(error.to_string()))
}

/// Maps kube errors onto the cluster taxonomy.
pub fn map_kube_error(error: kube::Error) -> ClusterError {
    match error {
        kube::Error::Api(response) => match response.code {
            404 => ClusterError::ResourceNotFound(response.message),
            409 => ClusterError::AlreadyExists(response.message),
            status => ClusterError::Api {
                status,
                message: response.message,
            },
        },
        other => ClusterError::Connectivity(other.to_string()),
    }
}

struct ActiveClient {
    context: String,
    client: Client,
}

pub struct KubeBackend {
    kubeconfig: Kubeconfig,
    active: ArcSwapOption<ActiveClient>,
}

impl KubeBackend {
    pub fn new(kubeconfig: Kubeconfig) -> Self {
        Self {
            kubeconfig,
            active: ArcSwapOption::empty(),
        }
    }

    /// Context the backend currently targets, if any activation succeeded.
    pub fn active_context(&self) -> Option<String> {
        self.active
            .load_full()
            .map(|active| active.context.clone())
    }

    fn client(&self) -> Result<Client, ClusterError> {
        self.active
            .load_full()
            .map(|active| active.client.clone())
            .ok_or_else(|| ClusterError::Connectivity("no cluster context is active".to_string()))
    }
}

#[async_trait]
impl ClusterBackend for KubeBackend {
    async fn activate(&self, context: &str) -> Result<(), ClusterError> {
        let options = KubeConfigOptions {
            context: Some(context.to_string()),
            ..KubeConfigOptions::default()
        };
        let config = Config::from_custom_kubeconfig(self.kubeconfig.clone(), &options)
            .await
            .map_err(|error| {
                ClusterError::Connectivity(format!("failed to load context '{context}': {error}"))
            })?;
        let client = Client::try_from(config).map_err(map_kube_error)?;
        self.active.store(Some(Arc::new(ActiveClient {
            context: context.to_string(),
            client,
        })));
        debug!(context, "kube client activated");
        Ok(())
    }

    async fn server_version(&self) -> Result<String, ClusterError> {
        let info = self
            .client()?
            .apiserver_version()
            .await
            .map_err(map_kube_error)?;
        Ok(info.git_version)
    }

    async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<Pod>, ClusterError> {
        let client = self.client()?;
        let api: Api<Pod> = match namespace {
            Some(namespace) => Api::namespaced(client, namespace),
            None => Api::all(client),
        };
        let pods = api
            .list(&ListParams::default())
            .await
            .map_err(map_kube_error)?;
        Ok(pods.items)
    }

    async fn patch_deployment(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<Deployment, ClusterError> {
        let api: Api<Deployment> = Api::namespaced(self.client()?, namespace);
        api.patch(name, &patch_params(), &Patch::Merge(patch))
            .await
            .map_err(map_kube_error)
    }

    async fn scale_deployment(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> Result<(), ClusterError> {
        let api: Api<Deployment> = Api::namespaced(self.client()?, namespace);
        let patch = json!({ "spec": { "replicas": replicas } });
        api.patch_scale(name, &patch_params(), &Patch::Merge(&patch))
            .await
            .map_err(map_kube_error)?;
        Ok(())
    }

    async fn create_resource(
        &self,
        kind: ResourceKind,
        namespace: &str,
        manifest: &Value,
    ) -> Result<(), ClusterError> {
        let client = self.client()?;
        match kind {
            ResourceKind::Deployment => create_typed::<Deployment>(client, namespace, manifest).await,
            ResourceKind::Service => create_typed::<Service>(client, namespace, manifest).await,
        }
    }

    async fn patch_resource(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        manifest: &Value,
    ) -> Result<(), ClusterError> {
        let client = self.client()?;
        match kind {
            ResourceKind::Deployment => {
                patch_typed::<Deployment>(client, namespace, name, manifest).await
            }
            ResourceKind::Service => patch_typed::<Service>(client, namespace, name, manifest).await,
        }
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, ClusterError> {
        let api: Api<Node> = Api::all(self.client()?);
        let nodes = api
            .list(&ListParams::default())
            .await
            .map_err(map_kube_error)?;
        Ok(nodes.items)
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        tail_lines: i64,
    ) -> Result<String, ClusterError> {
        let api: Api<Pod> = Api::namespaced(self.client()?, namespace);
        let params = LogParams {
            container: container.map(str::to_string),
            tail_lines: Some(tail_lines),
            ..LogParams::default()
        };
        api.logs(pod, &params).await.map_err(map_kube_error)
    }
}

fn patch_params() -> PatchParams {
    PatchParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..PatchParams::default()
    }
}

async fn create_typed<K>(client: Client, namespace: &str, manifest: &Value) -> Result<(), ClusterError>
where
    K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
    <K as Resource>::DynamicType: Default,
{
    let object: K = serde_json::from_value(manifest.clone())
        .map_err(|error| ClusterError::InvalidResource(error.to_string()))?;
    let api: Api<K> = Api::namespaced(client, namespace);
    let params = PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..PostParams::default()
    };
    api.create(&params, &object).await.map_err(map_kube_error)?;
    Ok(())
}

async fn patch_typed<K>(
    client: Client,
    namespace: &str,
    name: &str,
    manifest: &Value,
) -> Result<(), ClusterError>
where
    K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
    <K as Resource>::DynamicType: Default,
{
    let api: Api<K> = Api::namespaced(client, namespace);
    api.patch(name, &patch_params(), &Patch::Merge(manifest))
        .await
        .map_err(map_kube_error)?;
    Ok(())
}
