//! Operation catalog, dispatcher and bookkeeping.
//!
//! [`OperationBridge::dispatch`] is the only mutation path exposed to callers.
//! It resolves an operation name against [`catalog::OPERATION_SPECS`],
//! validates parameters, runs the operation through a cluster session, and
//! records the result in the history log.

pub mod catalog;
pub mod dispatcher;
pub mod history;
pub mod request;
pub mod result;
pub mod status;
pub mod summary;
pub mod tasks;

pub use catalog::{
    function_definitions, operation_descriptors, OperationDescriptor, OperationSpec,
    ParameterDescriptor, ParameterType, OPERATION_SPECS,
};
pub use dispatcher::{BridgeConfig, OperationBridge, RenderedResult, DEFAULT_HISTORY_LIMIT};
pub use history::{HistoryEntry, OperationHistory};
pub use kratos_ops::{ErrorKind, OperationError};
pub use request::{OperationKind, OperationRequest};
pub use result::{OperationResult, Outcome};
pub use status::BridgeStatus;
pub use summary::render_summary;
pub use tasks::{TaskLedger, TaskRecord, TaskStatus};
