//! Type definitions for the orchestration subsystem.
//!
//! These types form the shared vocabulary between the orchestrator, the
//! per-task executors, and whatever UI renders progress. All of them derive
//! [`serde::Serialize`] so hosts can forward them as JSON.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::agent::AgentSource;
use crate::session::{SessionEvent, Usage};

/// Number of completed tool calls retained in [`AgentProgress::recent_tools`].
pub const RECENT_TOOLS_CAPACITY: usize = 5;
/// Number of live output lines retained in [`AgentProgress::recent_output`].
pub const RECENT_OUTPUT_LINES: usize = 8;

/// One task in a batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskItem {
    /// Short display id, unique within the batch.
    pub id: String,
    pub task: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Overrides the batch agent for this task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

/// A batch of tasks for one agent, sharing one context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub agent: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub tasks: Vec<TaskItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
}

/// Lifecycle status of one task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Aborted,
}

impl AgentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AgentStatus::Completed | AgentStatus::Failed | AgentStatus::Aborted
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Pending => "pending",
            AgentStatus::Running => "running",
            AgentStatus::Completed => "completed",
            AgentStatus::Failed => "failed",
            AgentStatus::Aborted => "aborted",
        }
    }
}

/// A completed tool call, as shown in the progress ring.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecentTool {
    pub tool: String,
    pub args: String,
    pub end_ms: u64,
}

/// Live view of one running task.
///
/// Owned and mutated by exactly one executor; everyone else gets clones.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgentProgress {
    pub index: usize,
    pub id: String,
    pub agent: String,
    pub agent_source: AgentSource,
    pub status: AgentStatus,
    pub task: String,
    pub description: String,
    pub current_tool: Option<String>,
    pub current_tool_args: Option<String>,
    pub current_tool_start_ms: Option<u64>,
    /// Newest first.
    pub recent_tools: VecDeque<RecentTool>,
    /// Last lines of the message currently being streamed.
    pub recent_output: Vec<String>,
    pub tool_count: u32,
    pub tokens: u64,
    pub duration_ms: u64,
    pub model_override: Option<String>,
    pub extracted_tool_data: Option<HashMap<String, Vec<serde_json::Value>>>,
}

impl AgentProgress {
    pub fn pending(
        index: usize,
        id: &str,
        agent: &str,
        agent_source: AgentSource,
        task: &str,
        description: &str,
        model_override: Option<String>,
    ) -> Self {
        Self {
            index,
            id: id.to_string(),
            agent: agent.to_string(),
            agent_source,
            status: AgentStatus::Pending,
            task: task.to_string(),
            description: description.to_string(),
            current_tool: None,
            current_tool_args: None,
            current_tool_start_ms: None,
            recent_tools: VecDeque::with_capacity(RECENT_TOOLS_CAPACITY),
            recent_output: Vec::new(),
            tool_count: 0,
            tokens: 0,
            duration_ms: 0,
            model_override,
            extracted_tool_data: None,
        }
    }
}

/// Persisted artifact locations for one task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ArtifactPaths {
    pub input: PathBuf,
    pub output: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<PathBuf>,
}

/// Size of the full (untruncated) output, for retrieval by id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct OutputMeta {
    pub line_count: usize,
    pub byte_count: usize,
}

/// Terminal outcome of one task.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SingleResult {
    pub index: usize,
    pub id: String,
    pub agent: String,
    pub agent_source: AgentSource,
    pub task: String,
    pub description: String,
    pub exit_code: i32,
    pub output: String,
    pub stderr: String,
    pub truncated: bool,
    pub duration_ms: u64,
    /// Running token counter from progress; may exceed `usage` totals.
    pub tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_override: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub aborted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<ArtifactPaths>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_tool_data: Option<HashMap<String, Vec<serde_json::Value>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_meta: Option<OutputMeta>,
}

impl SingleResult {
    pub fn status(&self) -> AgentStatus {
        if self.aborted {
            AgentStatus::Aborted
        } else if self.exit_code == 0 {
            AgentStatus::Completed
        } else {
            AgentStatus::Failed
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status() == AgentStatus::Completed
    }

    /// Retrieval id for this task's artifacts: `<agent>_<index>`.
    pub fn output_id(&self) -> String {
        output_id(&self.agent, self.index)
    }
}

/// Retrieval id shared by artifacts and summaries.
pub fn output_id(agent: &str, index: usize) -> String {
    format!("{agent}_{index}")
}

/// Structured detail accompanying the summary text.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TaskDetails {
    pub results: Vec<SingleResult>,
    pub total_duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    pub output_paths: Vec<PathBuf>,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_agents_dir: Option<PathBuf>,
}

/// What one orchestration call returns: text for the caller plus detail.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TaskOutcome {
    pub content: String,
    pub details: TaskDetails,
}

impl TaskOutcome {
    pub fn message(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            details: TaskDetails::default(),
        }
    }
}

/// Observability events published once per forwarded session event and once
/// per progress update.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BusEvent {
    Session {
        index: usize,
        id: String,
        agent: String,
        event: SessionEvent,
    },
    Progress {
        index: usize,
        progress: AgentProgress,
    },
}

impl BusEvent {
    pub const SESSION_CHANNEL: &'static str = "task:subagent:event";
    pub const PROGRESS_CHANNEL: &'static str = "task:subagent:progress";

    pub fn channel(&self) -> &'static str {
        match self {
            BusEvent::Session { .. } => Self::SESSION_CHANNEL,
            BusEvent::Progress { .. } => Self::PROGRESS_CHANNEL,
        }
    }
}

/// Receives the merged progress of a batch, sorted by index, on every change.
pub type ProgressCallback = Arc<dyn Fn(&[AgentProgress]) + Send + Sync>;
