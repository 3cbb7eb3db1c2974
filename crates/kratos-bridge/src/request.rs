//! Typed operation requests built from loosely-typed parameter maps.

use jsonschema::validator_for;
use kratos_ops::{OperationError, DEFAULT_TAIL_LINES};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::catalog::{OperationSpec, OPERATION_SPECS};

const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    ListClusters,
    SwitchCluster,
    ListPods,
    RestartDeployment,
    ApplyManifest,
    ScaleDeployment,
    GetNodeMetrics,
    GetClusterHealth,
    GetLogs,
}

impl OperationKind {
    pub const ALL: [Self; 9] = [
        Self::ListClusters,
        Self::SwitchCluster,
        Self::ListPods,
        Self::RestartDeployment,
        Self::ApplyManifest,
        Self::ScaleDeployment,
        Self::GetNodeMetrics,
        Self::GetClusterHealth,
        Self::GetLogs,
    ];

    /// Resolves canonical names and their snake_case aliases.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        OPERATION_SPECS
            .iter()
            .find(|spec| spec.name == name || spec.legacy_name == name)
            .map(|spec| spec.kind)
    }

    pub fn spec(self) -> &'static OperationSpec {
        let index = Self::ALL
            .iter()
            .position(|kind| *kind == self)
            .unwrap_or_default();
        &OPERATION_SPECS[index]
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchClusterParams {
    pub cluster_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPodsParams {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub cluster: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartDeploymentParams {
    pub deployment_name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub cluster: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyManifestParams {
    pub yaml_content: String,
    #[serde(default)]
    pub cluster: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleDeploymentParams {
    pub deployment_name: String,
    pub replicas: i32,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub cluster: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterParams {
    #[serde(default)]
    pub cluster: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetLogsParams {
    pub pod_name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub container_name: Option<String>,
    #[serde(default = "default_tail_lines")]
    pub tail_lines: i64,
    #[serde(default)]
    pub cluster: Option<String>,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_tail_lines() -> i64 {
    DEFAULT_TAIL_LINES
}

/// One validated invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationRequest {
    ListClusters,
    SwitchCluster(SwitchClusterParams),
    ListPods(ListPodsParams),
    RestartDeployment(RestartDeploymentParams),
    ApplyManifest(ApplyManifestParams),
    ScaleDeployment(ScaleDeploymentParams),
    GetNodeMetrics(ClusterParams),
    GetClusterHealth(ClusterParams),
    GetLogs(GetLogsParams),
}

impl OperationRequest {
    /// Validates `parameters` against the catalog entry for `kind` and
    /// decodes them. `null` values count as absent.
    pub fn from_parameters(kind: OperationKind, parameters: &Value) -> Result<Self, OperationError> {
        let spec = kind.spec();
        let parameters = normalize_parameters(spec, parameters)?;
        if let Some(missing) = spec
            .required_parameters()
            .find(|parameter| !parameters.contains_key(parameter.name))
        {
            return Err(OperationError::invalid_parameter(format!(
                "missing required parameter '{}'",
                missing.name
            )));
        }
        let parameters = Value::Object(parameters);
        validate_parameters(spec, &parameters)?;

        Ok(match kind {
            OperationKind::ListClusters => Self::ListClusters,
            OperationKind::SwitchCluster => Self::SwitchCluster(decode(spec, parameters)?),
            OperationKind::ListPods => Self::ListPods(decode(spec, parameters)?),
            OperationKind::RestartDeployment => Self::RestartDeployment(decode(spec, parameters)?),
            OperationKind::ApplyManifest => Self::ApplyManifest(decode(spec, parameters)?),
            OperationKind::ScaleDeployment => Self::ScaleDeployment(decode(spec, parameters)?),
            OperationKind::GetNodeMetrics => Self::GetNodeMetrics(decode(spec, parameters)?),
            OperationKind::GetClusterHealth => Self::GetClusterHealth(decode(spec, parameters)?),
            OperationKind::GetLogs => Self::GetLogs(decode(spec, parameters)?),
        })
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Self::ListClusters => OperationKind::ListClusters,
            Self::SwitchCluster(_) => OperationKind::SwitchCluster,
            Self::ListPods(_) => OperationKind::ListPods,
            Self::RestartDeployment(_) => OperationKind::RestartDeployment,
            Self::ApplyManifest(_) => OperationKind::ApplyManifest,
            Self::ScaleDeployment(_) => OperationKind::ScaleDeployment,
            Self::GetNodeMetrics(_) => OperationKind::GetNodeMetrics,
            Self::GetClusterHealth(_) => OperationKind::GetClusterHealth,
            Self::GetLogs(_) => OperationKind::GetLogs,
        }
    }

    /// Cluster the caller asked for, if any.
    pub fn target_cluster(&self) -> Option<&str> {
        let cluster = match self {
            Self::ListClusters => None,
            Self::SwitchCluster(params) => Some(&params.cluster_name),
            Self::ListPods(params) => params.cluster.as_ref(),
            Self::RestartDeployment(params) => params.cluster.as_ref(),
            Self::ApplyManifest(params) => params.cluster.as_ref(),
            Self::ScaleDeployment(params) => params.cluster.as_ref(),
            Self::GetNodeMetrics(params) | Self::GetClusterHealth(params) => params.cluster.as_ref(),
            Self::GetLogs(params) => params.cluster.as_ref(),
        };
        cluster.map(String::as_str).filter(|name| !name.is_empty())
    }
}

fn normalize_parameters(
    spec: &OperationSpec,
    parameters: &Value,
) -> Result<Map<String, Value>, OperationError> {
    match parameters {
        Value::Null => Ok(Map::new()),
        Value::Object(fields) => Ok(fields
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()),
        _ => Err(OperationError::invalid_parameter(format!(
            "parameters for '{}' must be a JSON object",
            spec.name
        ))),
    }
}

fn validate_parameters(spec: &OperationSpec, parameters: &Value) -> Result<(), OperationError> {
    let schema = spec.parameters_schema();
    let validator = validator_for(&schema).map_err(|error| {
        OperationError::invalid_parameter(format!("invalid schema for '{}': {error}", spec.name))
    })?;
    let mut errors = validator.iter_errors(parameters);
    if let Some(first) = errors.next() {
        return Err(OperationError::invalid_parameter(format!(
            "invalid parameters for '{}': {first}",
            spec.name
        )));
    }
    Ok(())
}

fn decode<T: DeserializeOwned>(spec: &OperationSpec, parameters: Value) -> Result<T, OperationError> {
    serde_json::from_value(parameters).map_err(|error| {
        OperationError::invalid_parameter(format!(
            "invalid parameters for '{}': {error}",
            spec.name
        ))
    })
}
