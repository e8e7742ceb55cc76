use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unique identifier for a single API request.
///
/// Wrapper around a UUID string. Carried by every event the request produces so
/// subscribers can correlate `start` with its result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generates a new random UUID v4-based RequestId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// A validated key/value operation together with its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Does nothing and touches no storage.
    Noop,
    /// Lists committed keys.
    List,
    /// Stores every entry. Values were checked to be strings before construction.
    Write(BTreeMap<String, String>),
    /// Reads the given keys; missing keys read as "".
    Read(Vec<String>),
    /// Deletes the given keys, skipping missing ones.
    Delete(Vec<String>),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Noop => "noop",
            Operation::List => "list",
            Operation::Write(_) => "write",
            Operation::Read(_) => "read",
            Operation::Delete(_) => "delete",
        }
    }
}

/// A request accepted by an executor.
///
/// Built once from a validated envelope and never modified afterwards.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub id: RequestId,
    pub operation: Operation,
    /// Optional private sub-directory under the tenant's storage root.
    pub namespace: Option<String>,
    /// The envelope as received, echoed back in events.
    pub envelope: serde_json::Value,
}

impl ApiRequest {
    pub fn new(operation: Operation) -> Self {
        Self {
            id: RequestId::new(),
            operation,
            namespace: None,
            envelope: serde_json::Value::Null,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// Lifecycle of an executor. `Terminated` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Running,
    Terminated,
}

/// Tunables shared by every executor created through a registry.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Per-subscriber event buffer. A subscriber that falls further behind loses the
    /// oldest events instead of stalling the worker.
    pub event_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            event_capacity: 256,
        }
    }
}
