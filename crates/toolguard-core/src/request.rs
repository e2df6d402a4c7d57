//! Inbound tool request.
//!
//! Identity and operation name are resolved by the host before the chain
//! runs; the chain never authenticates.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One inbound tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolRequest {
    /// Resolved caller identity (client/session).
    pub caller_id: String,
    /// Tool / operation name.
    pub operation: String,
    /// Operation arguments, forwarded unchanged on admission.
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolRequest {
    pub fn new(
        caller_id: impl Into<String>,
        operation: impl Into<String>,
        arguments: Map<String, Value>,
    ) -> Self {
        Self {
            caller_id: caller_id.into(),
            operation: operation.into(),
            arguments,
        }
    }

    /// Request without arguments.
    pub fn bare(caller_id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::new(caller_id, operation, Map::new())
    }

    /// Builder-style helper used by hosts and tests.
    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }
}
