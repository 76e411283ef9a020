//! Per-task progress tracking.
//!
//! [`TaskTracker`] folds the forwarded session events of one task into its
//! [`AgentProgress`], its output buffers, its usage total and its
//! [`Termination`] state. It performs no I/O: the executor applies each
//! event and acts on the returned [`TrackerAction`].

use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use super::handlers::ToolHandlerRegistry;
use super::truncate::{tail_lines, truncate_chars};
use super::types::{
    AgentProgress, AgentStatus, RECENT_OUTPUT_LINES, RECENT_TOOLS_CAPACITY, RecentTool,
};
use crate::session::{AgentMessage, Role, SessionEvent, ToolExecution, Usage};

/// Argument keys shown in tool previews, most informative first.
const PREVIEW_ARG_KEYS: [&str; 8] = [
    "command",
    "file_path",
    "path",
    "pattern",
    "query",
    "url",
    "task",
    "prompt",
];
const PREVIEW_ARG_MAX_CHARS: usize = 60;

/// Deferred abort requested by a tool result handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    Idle,
    /// Waiting for the next assistant `message_end`, or for `deadline`.
    Pending { deadline: Instant },
    Issued,
}

/// What the executor must do after an event was applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerAction {
    None,
    /// A termination was armed; watch its deadline.
    ArmTermination,
    /// Send `Abort` to the unit now.
    IssueAbort,
}

pub struct TaskTracker {
    progress: AgentProgress,
    started: Instant,
    accumulated: String,
    final_output: String,
    usage: Usage,
    usage_present: bool,
    termination: Termination,
    termination_timeout: Duration,
    handlers: ToolHandlerRegistry,
}

impl TaskTracker {
    pub fn new(
        progress: AgentProgress,
        handlers: ToolHandlerRegistry,
        termination_timeout: Duration,
    ) -> Self {
        Self {
            progress,
            started: Instant::now(),
            accumulated: String::new(),
            final_output: String::new(),
            usage: Usage::default(),
            usage_present: false,
            termination: Termination::Idle,
            termination_timeout,
            handlers,
        }
    }

    pub fn progress(&self) -> &AgentProgress {
        &self.progress
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn set_status(&mut self, status: AgentStatus) {
        self.progress.status = status;
        self.progress.duration_ms = self.elapsed_ms();
    }

    pub fn termination(&self) -> Termination {
        self.termination
    }

    pub fn termination_deadline(&self) -> Option<Instant> {
        match self.termination {
            Termination::Pending { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// The safety deadline passed without a closing `message_end`.
    pub fn expire_termination(&mut self) -> TrackerAction {
        match self.termination {
            Termination::Pending { .. } => {
                self.termination = Termination::Issued;
                TrackerAction::IssueAbort
            }
            _ => TrackerAction::None,
        }
    }

    /// Final output if the session reported one, else everything streamed.
    pub fn output(&self) -> &str {
        if self.final_output.is_empty() {
            &self.accumulated
        } else {
            &self.final_output
        }
    }

    pub fn usage(&self) -> Option<Usage> {
        self.usage_present.then_some(self.usage)
    }

    pub fn into_progress(self) -> AgentProgress {
        self.progress
    }

    pub fn apply(&mut self, event: &SessionEvent) -> TrackerAction {
        self.progress.duration_ms = self.elapsed_ms();
        match event {
            SessionEvent::ToolExecutionStart(execution) => {
                self.tool_started(execution);
                TrackerAction::None
            }
            SessionEvent::ToolExecutionEnd(execution) => self.tool_ended(execution),
            SessionEvent::MessageUpdate { message } if message.role == Role::Assistant => {
                self.progress.recent_output = tail_lines(&message.text(), RECENT_OUTPUT_LINES);
                TrackerAction::None
            }
            SessionEvent::MessageEnd { message } => self.message_ended(message),
            SessionEvent::AgentEnd { messages } => {
                self.final_output = messages
                    .iter()
                    .filter(|m| m.role == Role::Assistant)
                    .flat_map(|m| m.text_blocks())
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n");
                TrackerAction::None
            }
            _ => TrackerAction::None,
        }
    }

    fn tool_started(&mut self, execution: &ToolExecution) {
        self.progress.tool_count += 1;
        self.progress.current_tool = Some(execution.tool_name.clone());
        self.progress.current_tool_args = Some(args_preview(&execution.args));
        self.progress.current_tool_start_ms = Some(self.elapsed_ms());
    }

    fn tool_ended(&mut self, execution: &ToolExecution) -> TrackerAction {
        let args = self
            .progress
            .current_tool_args
            .take()
            .unwrap_or_else(|| args_preview(&execution.args));
        self.progress.recent_tools.push_front(RecentTool {
            tool: execution.tool_name.clone(),
            args,
            end_ms: self.elapsed_ms(),
        });
        self.progress.recent_tools.truncate(RECENT_TOOLS_CAPACITY);
        self.progress.current_tool = None;
        self.progress.current_tool_start_ms = None;

        let Some(handler) = self.handlers.get(&execution.tool_name).cloned() else {
            return TrackerAction::None;
        };

        if let Some(data) = handler.extract_data(execution) {
            self.progress
                .extracted_tool_data
                .get_or_insert_with(Default::default)
                .entry(execution.tool_name.clone())
                .or_default()
                .push(data);
        }

        if handler.should_terminate(execution) && self.termination == Termination::Idle {
            self.termination = Termination::Pending {
                deadline: Instant::now() + self.termination_timeout,
            };
            return TrackerAction::ArmTermination;
        }
        TrackerAction::None
    }

    /// The token counter covers every usage-bearing message; text and the
    /// usage total only come from assistant messages.
    fn message_ended(&mut self, message: &AgentMessage) -> TrackerAction {
        if let Some(usage) = message.usage {
            self.progress.tokens += usage.normalized_tokens();
        }
        if message.role != Role::Assistant {
            return TrackerAction::None;
        }

        for text in message.text_blocks().filter(|t| !t.is_empty()) {
            if !self.accumulated.is_empty() {
                self.accumulated.push('\n');
            }
            self.accumulated.push_str(text);
        }

        if let Some(usage) = message.usage {
            if !message.is_abnormal() {
                self.usage += usage;
                self.usage_present = true;
            }
        }

        if matches!(self.termination, Termination::Pending { .. }) {
            self.termination = Termination::Issued;
            return TrackerAction::IssueAbort;
        }
        TrackerAction::None
    }
}

/// One-line preview of a tool call's arguments.
fn args_preview(args: &Value) -> String {
    let value = PREVIEW_ARG_KEYS
        .iter()
        .find_map(|key| args.get(*key).filter(|v| !v.is_null()));
    let Some(value) = value else {
        return String::new();
    };
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let first_line = text.lines().next().unwrap_or_default();
    truncate_chars(first_line, PREVIEW_ARG_MAX_CHARS)
}
