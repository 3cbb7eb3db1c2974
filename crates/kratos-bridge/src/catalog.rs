//! Static operation catalog and its exported forms.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::request::OperationKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Integer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterDefault {
    Text(&'static str),
    Integer(i64),
}

impl ParameterDefault {
    pub fn to_value(self) -> Value {
        match self {
            Self::Text(text) => Value::from(text),
            Self::Integer(number) => Value::from(number),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub kind: ParameterType,
    pub required: bool,
    pub default: Option<ParameterDefault>,
    pub minimum: Option<i64>,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSpec {
    pub kind: OperationKind,
    pub name: &'static str,
    pub legacy_name: &'static str,
    pub description: &'static str,
    pub parameters: &'static [ParameterSpec],
}

impl OperationSpec {
    pub fn parameter(&self, name: &str) -> Option<&'static ParameterSpec> {
        self.parameters.iter().find(|parameter| parameter.name == name)
    }

    pub fn required_parameters(&self) -> impl Iterator<Item = &'static ParameterSpec> {
        self.parameters.iter().filter(|parameter| parameter.required)
    }

    pub fn descriptor(&self) -> OperationDescriptor {
        OperationDescriptor {
            name: self.name.to_string(),
            description: self.description.to_string(),
            parameter_schema: self
                .parameters
                .iter()
                .map(|parameter| {
                    (
                        parameter.name.to_string(),
                        ParameterDescriptor {
                            kind: parameter.kind,
                            required: parameter.required,
                            default: parameter.default.map(ParameterDefault::to_value),
                            minimum: parameter.minimum,
                            description: parameter.description.to_string(),
                        },
                    )
                })
                .collect(),
        }
    }

    /// JSON-schema function definition for tool-calling callers.
    pub fn function_definition(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters_schema(),
        })
    }

    /// Object schema used both for export and for argument validation.
    pub fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        for parameter in self.parameters {
            let mut property = json!({
                "type": parameter.kind,
                "description": parameter.description,
            });
            if let Some(default) = parameter.default {
                property["default"] = default.to_value();
            }
            if let Some(minimum) = parameter.minimum {
                property["minimum"] = Value::from(minimum);
            }
            if parameter.required && parameter.kind == ParameterType::String {
                property["minLength"] = Value::from(1);
            }
            properties.insert(parameter.name.to_string(), property);
        }
        let required = self
            .required_parameters()
            .map(|parameter| parameter.name)
            .collect::<Vec<_>>();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Serializable catalog entry.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationDescriptor {
    pub name: String,
    pub description: String,
    pub parameter_schema: BTreeMap<String, ParameterDescriptor>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ParameterDescriptor {
    #[serde(rename = "type")]
    pub kind: ParameterType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<i64>,
    pub description: String,
}

const CLUSTER: ParameterSpec = ParameterSpec {
    name: "cluster",
    kind: ParameterType::String,
    required: false,
    default: None,
    minimum: None,
    description: "Cluster context to run against; defaults to the active cluster",
};

const NAMESPACE: ParameterSpec = ParameterSpec {
    name: "namespace",
    kind: ParameterType::String,
    required: false,
    default: Some(ParameterDefault::Text("default")),
    minimum: None,
    description: "Kubernetes namespace",
};

const DEPLOYMENT_NAME: ParameterSpec = ParameterSpec {
    name: "deploymentName",
    kind: ParameterType::String,
    required: true,
    default: None,
    minimum: None,
    description: "Name of the deployment",
};

pub const OPERATION_SPECS: &[OperationSpec] = &[
    OperationSpec {
        kind: OperationKind::ListClusters,
        name: "listClusters",
        legacy_name: "list_clusters",
        description: "List all available cluster contexts and mark the active one",
        parameters: &[],
    },
    OperationSpec {
        kind: OperationKind::SwitchCluster,
        name: "switchCluster",
        legacy_name: "switch_cluster",
        description: "Switch the active cluster context",
        parameters: &[ParameterSpec {
            name: "clusterName",
            kind: ParameterType::String,
            required: true,
            default: None,
            minimum: None,
            description: "Name of the cluster context to activate",
        }],
    },
    OperationSpec {
        kind: OperationKind::ListPods,
        name: "listPods",
        legacy_name: "get_pods",
        description: "List pods in a namespace; use namespace 'all' for every namespace",
        parameters: &[
            ParameterSpec {
                description: "Kubernetes namespace, or 'all' for every namespace",
                ..NAMESPACE
            },
            CLUSTER,
        ],
    },
    OperationSpec {
        kind: OperationKind::RestartDeployment,
        name: "restartDeployment",
        legacy_name: "restart_deployment",
        description: "Restart a deployment by rolling its pods",
        parameters: &[DEPLOYMENT_NAME, NAMESPACE, CLUSTER],
    },
    OperationSpec {
        kind: OperationKind::ApplyManifest,
        name: "applyManifest",
        legacy_name: "apply_yaml",
        description: "Apply a multi-document YAML manifest (Deployments and Services)",
        parameters: &[
            ParameterSpec {
                name: "yamlContent",
                kind: ParameterType::String,
                required: true,
                default: None,
                minimum: None,
                description: "YAML manifest text",
            },
            CLUSTER,
        ],
    },
    OperationSpec {
        kind: OperationKind::ScaleDeployment,
        name: "scaleDeployment",
        legacy_name: "scale_deployment",
        description: "Set the replica count of a deployment",
        parameters: &[
            DEPLOYMENT_NAME,
            ParameterSpec {
                name: "replicas",
                kind: ParameterType::Integer,
                required: true,
                default: None,
                minimum: Some(0),
                description: "Desired number of replicas",
            },
            NAMESPACE,
            CLUSTER,
        ],
    },
    OperationSpec {
        kind: OperationKind::GetNodeMetrics,
        name: "getNodeMetrics",
        legacy_name: "get_node_metrics",
        description: "Report readiness, versions and capacity for every node",
        parameters: &[CLUSTER],
    },
    OperationSpec {
        kind: OperationKind::GetClusterHealth,
        name: "getClusterHealth",
        legacy_name: "get_cluster_health",
        description: "Score cluster health from node readiness and system pod status",
        parameters: &[CLUSTER],
    },
    OperationSpec {
        kind: OperationKind::GetLogs,
        name: "getLogs",
        legacy_name: "get_logs",
        description: "Read the tail of a pod's container log",
        parameters: &[
            ParameterSpec {
                name: "podName",
                kind: ParameterType::String,
                required: true,
                default: None,
                minimum: None,
                description: "Name of the pod",
            },
            NAMESPACE,
            ParameterSpec {
                name: "containerName",
                kind: ParameterType::String,
                required: false,
                default: None,
                minimum: None,
                description: "Container to read; optional for single-container pods",
            },
            ParameterSpec {
                name: "tailLines",
                kind: ParameterType::Integer,
                required: false,
                default: Some(ParameterDefault::Integer(100)),
                minimum: Some(1),
                description: "Number of trailing log lines to return",
            },
            CLUSTER,
        ],
    },
];

pub fn operation_descriptors() -> Vec<OperationDescriptor> {
    OPERATION_SPECS.iter().map(OperationSpec::descriptor).collect()
}

pub fn function_definitions() -> Vec<Value> {
    OPERATION_SPECS
        .iter()
        .map(OperationSpec::function_definition)
        .collect()
}
