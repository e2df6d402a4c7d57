use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use toolguard_core::error::{Result, ToolGuardError};
use toolguard_core::Admission;

/// Business-logic handler for one operation. Receives the admitted request,
/// including canonical paths, and must use those instead of re-resolving.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;
    async fn call(&self, admission: Admission) -> Result<Value>;
}

/// Registry of tool handlers keyed by operation name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: DashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: DashMap::new(),
        }
    }

    pub fn register(&self, tool: Arc<dyn ToolHandler>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn registered(&self) -> Vec<String> {
        self.tools.iter().map(|e| e.key().clone()).collect()
    }

    pub fn contains(&self, operation: &str) -> bool {
        self.tools.contains_key(operation)
    }

    pub async fn dispatch(&self, admission: Admission) -> Result<Value> {
        let handler = self
            .tools
            .get(admission.operation.as_str())
            .ok_or_else(|| ToolGuardError::UnknownTool(admission.operation.clone()))?
            .value()
            .clone();
        handler.call(admission).await
    }
}
