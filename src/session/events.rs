//! Session event vocabulary.
//!
//! These are the events an [`super::AgentSession`] publishes to its
//! subscribers. A subset of them crosses the execution unit boundary (see
//! [`SessionEvent::is_forwarded`]); everything here derives `Serialize` so it
//! can be written to transcripts and emitted on the event bus.

use serde::{Deserialize, Serialize};

use super::usage::Usage;

/// Who authored a message in the session transcript.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    ToolResult,
}

/// Why the model stopped producing an assistant message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Stop,
    Length,
    ToolUse,
    Error,
    Aborted,
}

/// One block of message content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
}

/// A message as seen by session subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AgentMessage {
    /// Assistant message with a single text block.
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::Text { text: text.into() }],
            usage: None,
            stop_reason: Some(StopReason::Stop),
            error_message: None,
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_stop_reason(mut self, reason: StopReason) -> Self {
        self.stop_reason = Some(reason);
        self
    }

    /// Iterate the text blocks of this message, skipping thinking and tool calls.
    pub fn text_blocks(&self) -> impl Iterator<Item = &str> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }

    /// All text blocks joined with newlines.
    pub fn text(&self) -> String {
        self.text_blocks().collect::<Vec<_>>().join("\n")
    }

    /// Whether this message ended abnormally (aborted or errored).
    pub fn is_abnormal(&self) -> bool {
        matches!(
            self.stop_reason,
            Some(StopReason::Aborted) | Some(StopReason::Error)
        )
    }
}

/// Payload shared by the three tool-execution events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolExecution {
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub args: serde_json::Value,
    /// Partial result on update events, final result on end events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub is_error: bool,
}

/// Everything an agent session publishes while it runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    AgentStart,
    AgentEnd { messages: Vec<AgentMessage> },
    TurnStart,
    TurnEnd { message: AgentMessage },
    MessageStart { message: AgentMessage },
    MessageUpdate { message: AgentMessage },
    MessageEnd { message: AgentMessage },
    ToolExecutionStart(ToolExecution),
    ToolExecutionUpdate(ToolExecution),
    ToolExecutionEnd(ToolExecution),
    AutoCompactionStart { reason: String },
    AutoCompactionEnd { aborted: bool },
    AutoRetryStart { attempt: u32, error_message: String },
    AutoRetryEnd { success: bool },
}

impl SessionEvent {
    /// Whether this event crosses the execution unit boundary.
    ///
    /// Lifecycle, turn, message and tool-execution events are forwarded;
    /// session housekeeping (compaction, retries) stays inside the unit.
    pub fn is_forwarded(&self) -> bool {
        matches!(
            self,
            SessionEvent::AgentStart
                | SessionEvent::AgentEnd { .. }
                | SessionEvent::TurnStart
                | SessionEvent::TurnEnd { .. }
                | SessionEvent::MessageStart { .. }
                | SessionEvent::MessageUpdate { .. }
                | SessionEvent::MessageEnd { .. }
                | SessionEvent::ToolExecutionStart(_)
                | SessionEvent::ToolExecutionUpdate(_)
                | SessionEvent::ToolExecutionEnd(_)
        )
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::AgentStart => "agent_start",
            SessionEvent::AgentEnd { .. } => "agent_end",
            SessionEvent::TurnStart => "turn_start",
            SessionEvent::TurnEnd { .. } => "turn_end",
            SessionEvent::MessageStart { .. } => "message_start",
            SessionEvent::MessageUpdate { .. } => "message_update",
            SessionEvent::MessageEnd { .. } => "message_end",
            SessionEvent::ToolExecutionStart(_) => "tool_execution_start",
            SessionEvent::ToolExecutionUpdate(_) => "tool_execution_update",
            SessionEvent::ToolExecutionEnd(_) => "tool_execution_end",
            SessionEvent::AutoCompactionStart { .. } => "auto_compaction_start",
            SessionEvent::AutoCompactionEnd { .. } => "auto_compaction_end",
            SessionEvent::AutoRetryStart { .. } => "auto_retry_start",
            SessionEvent::AutoRetryEnd { .. } => "auto_retry_end",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn housekeeping_events_are_not_forwarded() {
        assert!(!SessionEvent::AutoCompactionStart { reason: "threshold".into() }.is_forwarded());
        assert!(!SessionEvent::AutoRetryEnd { success: true }.is_forwarded());
        assert!(SessionEvent::AgentStart.is_forwarded());
        assert!(
            SessionEvent::MessageEnd {
                message: AgentMessage::assistant_text("x")
            }
            .is_forwarded()
        );
    }

    #[test]
    fn text_skips_non_text_blocks() {
        let msg = AgentMessage {
            role: Role::Assistant,
            content: vec![
                ContentBlock::Thinking { thinking: "hmm".into() },
                ContentBlock::Text { text: "one".into() },
                ContentBlock::ToolCall {
                    id: "c1".into(),
                    name: "read".into(),
                    arguments: serde_json::json!({}),
                },
                ContentBlock::Text { text: "two".into() },
            ],
            usage: None,
            stop_reason: None,
            error_message: None,
        };
        assert_eq!(msg.text(), "one\ntwo");
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = SessionEvent::ToolExecutionStart(ToolExecution {
            tool_call_id: "c1".into(),
            tool_name: "bash".into(),
            args: serde_json::json!({ "command": "ls" }),
            result: None,
            is_error: false,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool_execution_start");
        assert_eq!(json["tool_name"], "bash");
    }
}
