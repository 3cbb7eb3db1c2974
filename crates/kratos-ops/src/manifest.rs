//! Multi-document manifest apply for Deployments and Services.

use kratos_cluster::{ClusterError, ClusterSession, ResourceKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::{ErrorKind, OperationError};

/// One non-empty document of a manifest stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestDocument {
    pub index: usize,
    pub body: Value,
}

impl ManifestDocument {
    pub fn kind(&self) -> Option<&str> {
        self.body.get("kind").and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.body.pointer("/metadata/name").and_then(Value::as_str)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.body
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .filter(|namespace| !namespace.is_empty())
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApplyAction {
    Created,
    Updated,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppliedResource {
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub resource: String,
    pub action: ApplyAction,
}

/// Document that was parsed but not applied.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SkippedDocument {
    pub index: usize,
    pub kind: Option<String>,
    pub name: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub applied_count: usize,
    pub results: Vec<AppliedResource>,
    pub skipped: Vec<SkippedDocument>,
}

/// Splits a YAML stream into documents, dropping empty ones.
pub fn parse_manifest(yaml: &str) -> Result<Vec<ManifestDocument>, OperationError> {
    let mut documents = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(yaml).enumerate() {
        let value = serde_yaml::Value::deserialize(document).map_err(|error| {
            OperationError::invalid_parameter(format!(
                "manifest document {} is not valid YAML: {error}",
                index + 1
            ))
        })?;
        if value.is_null() {
            continue;
        }
        let body = serde_json::to_value(value).map_err(|error| {
            OperationError::invalid_parameter(format!(
                "manifest document {} cannot be represented as JSON: {error}",
                index + 1
            ))
        })?;
        documents.push(ManifestDocument { index, body });
    }
    Ok(documents)
}

/// Creates each supported document, falling back to a merge patch when the
/// object already exists. The first other failure aborts the apply and the
/// error payload carries everything applied before it.
pub async fn apply_manifest(
    session: &ClusterSession<'_>,
    yaml: &str,
) -> Result<ApplyReport, OperationError> {
    let documents = parse_manifest(yaml)?;
    let mut results = Vec::new();
    let mut skipped = Vec::new();

    for document in &documents {
        let Some(kind) = document.kind().and_then(ResourceKind::parse) else {
            let reason = match document.kind() {
                Some(kind) => format!("unsupported kind '{kind}'"),
                None => "document has no kind".to_string(),
            };
            debug!(
                cluster = session.cluster_name(),
                index = document.index,
                reason = %reason,
                "skipping manifest document"
            );
            skipped.push(SkippedDocument {
                index: document.index,
                kind: document.kind().map(str::to_string),
                name: document.name().map(str::to_string),
                reason,
            });
            continue;
        };
        let namespace = document
            .namespace()
            .unwrap_or(session.descriptor().default_namespace.as_str())
            .to_string();

        match apply_document(session, kind, &namespace, document).await {
            Ok(applied) => results.push(applied),
            Err(error) => {
                let resource = format!("{kind}/{}", document.name().unwrap_or("<unnamed>"));
                warn!(
                    cluster = session.cluster_name(),
                    resource = %resource,
                    applied = results.len(),
                    error = %error,
                    "manifest apply aborted"
                );
                let payload = json!({
                    "results": results,
                    "skipped": skipped,
                    "failed": { "resource": resource, "error": error.to_string() },
                });
                return Err(OperationError::new(
                    ErrorKind::PartialApplyFailure,
                    format!(
                        "apply aborted at {resource} after {} applied resource(s): {error}",
                        results.len()
                    ),
                )
                .with_payload(payload));
            }
        }
    }

    info!(
        cluster = session.cluster_name(),
        applied = results.len(),
        skipped = skipped.len(),
        "applied manifest"
    );
    Ok(ApplyReport {
        applied_count: results.len(),
        results,
        skipped,
    })
}

async fn apply_document(
    session: &ClusterSession<'_>,
    kind: ResourceKind,
    namespace: &str,
    document: &ManifestDocument,
) -> Result<AppliedResource, ClusterError> {
    let name = document
        .name()
        .ok_or_else(|| ClusterError::InvalidResource(format!("{kind} has no metadata.name")))?;
    let action = match session.create_resource(kind, namespace, &document.body).await {
        Ok(()) => ApplyAction::Created,
        Err(ClusterError::AlreadyExists(_)) => {
            session
                .patch_resource(kind, namespace, name, &document.body)
                .await?;
            ApplyAction::Updated
        }
        Err(error) => return Err(error),
    };
    Ok(AppliedResource {
        kind: kind.as_str().to_string(),
        name: name.to_string(),
        namespace: namespace.to_string(),
        resource: format!("{kind}/{name}"),
        action,
    })
}
