use kratos_ops::{ErrorKind, OperationError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Error,
}

/// Structured reply to one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub outcome: Outcome,
    pub operation: String,
    pub operation_id: String,
    pub timestamp: String,
    pub cluster_context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub payload: Value,
}

impl OperationResult {
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    pub(crate) fn from_execution(
        operation: &str,
        operation_id: String,
        timestamp: String,
        cluster_context: String,
        execution: Result<Value, OperationError>,
    ) -> Self {
        match execution {
            Ok(payload) => Self {
                outcome: Outcome::Success,
                operation: operation.to_string(),
                operation_id,
                timestamp,
                cluster_context,
                message: None,
                error_kind: None,
                payload,
            },
            Err(error) => Self {
                outcome: Outcome::Error,
                operation: operation.to_string(),
                operation_id,
                timestamp,
                cluster_context,
                message: Some(error.message),
                error_kind: Some(error.kind),
                payload: error.payload.unwrap_or_else(|| json!({})),
            },
        }
    }
}
