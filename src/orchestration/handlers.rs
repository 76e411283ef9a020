//! Tool result handlers.
//!
//! A handler inspects `tool_execution_end` events for one tool name. It may
//! pull structured data out of the call (collected per tool name into
//! [`AgentProgress::extracted_tool_data`](super::types::AgentProgress)) and
//! may ask the executor to end the task early.
//!
//! Termination is never immediate: the executor arms a pending termination and
//! only aborts after the next assistant `message_end`, so the usage reported
//! for that final message is still counted.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::session::ToolExecution;

/// Tool name of the built-in structured-result tool.
pub const SUBMIT_RESULT_TOOL: &str = "submit_result";

pub trait ToolResultHandler: Send + Sync {
    /// Data to record for this call, if any.
    fn extract_data(&self, execution: &ToolExecution) -> Option<Value>;

    /// Whether the task is finished once this call has completed.
    fn should_terminate(&self, _execution: &ToolExecution) -> bool {
        false
    }
}

/// Handlers keyed by tool name.
#[derive(Clone, Default)]
pub struct ToolHandlerRegistry {
    handlers: HashMap<String, Arc<dyn ToolResultHandler>>,
}

impl ToolHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `submit_result` handler.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(SUBMIT_RESULT_TOOL, Arc::new(SubmitResultHandler));
        registry
    }

    pub fn register(&mut self, tool_name: impl Into<String>, handler: Arc<dyn ToolResultHandler>) {
        self.handlers.insert(tool_name.into(), handler);
    }

    pub fn get(&self, tool_name: &str) -> Option<&Arc<dyn ToolResultHandler>> {
        self.handlers.get(tool_name)
    }
}

impl std::fmt::Debug for ToolHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("ToolHandlerRegistry")
            .field("tools", &names)
            .finish()
    }
}

/// Records the `data` a subagent submits and ends the task.
///
/// Failed calls are ignored so the agent can retry with corrected data.
pub struct SubmitResultHandler;

impl ToolResultHandler for SubmitResultHandler {
    fn extract_data(&self, execution: &ToolExecution) -> Option<Value> {
        if execution.is_error {
            return None;
        }
        execution
            .args
            .get("data")
            .cloned()
            .or_else(|| {
                execution
                    .result
                    .as_ref()
                    .and_then(|r| r.get("data").cloned())
            })
            .filter(|v| !v.is_null())
    }

    fn should_terminate(&self, execution: &ToolExecution) -> bool {
        !execution.is_error
    }
}
