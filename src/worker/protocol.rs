//! Messages exchanged between an executor and its execution unit.
//!
//! Requests flow executor -> unit, responses flow unit -> executor. Every
//! message is owned and moved through a channel, so nothing mutable is shared
//! across the boundary. Exactly one [`WorkerResponse::Done`] is sent per unit
//! and all [`WorkerResponse::Event`]s precede it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::session::SessionEvent;

/// What a unit needs to rebuild a minimal session without consulting global
/// state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkerStartPayload {
    pub cwd: PathBuf,
    /// Fully composed task text (batch context + instruction).
    pub task: String,
    /// Role instructions appended to the default system prompt.
    pub system_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawns: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    Start { payload: Box<WorkerStartPayload> },
    Abort,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerResponse {
    Event {
        event: SessionEvent,
    },
    Done {
        exit_code: i32,
        duration_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default)]
        aborted: bool,
    },
}

impl WorkerResponse {
    pub fn done_ok(duration_ms: u64) -> Self {
        Self::Done {
            exit_code: 0,
            duration_ms,
            error: None,
            aborted: false,
        }
    }

    pub fn done_failed(duration_ms: u64, error: impl Into<String>) -> Self {
        Self::Done {
            exit_code: 1,
            duration_ms,
            error: Some(error.into()),
            aborted: false,
        }
    }

    pub fn done_aborted(duration_ms: u64, error: Option<String>) -> Self {
        Self::Done {
            exit_code: 1,
            duration_ms,
            error,
            aborted: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_request_has_no_payload() {
        let json = serde_json::to_value(WorkerRequest::Abort).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "abort" }));
    }

    #[test]
    fn done_omits_absent_error() {
        let json = serde_json::to_value(WorkerResponse::done_ok(12)).unwrap();
        assert_eq!(json["type"], "done");
        assert_eq!(json["exit_code"], 0);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn start_payload_parses_with_optional_fields_missing() {
        let req: WorkerRequest = serde_json::from_value(serde_json::json!({
            "type": "start",
            "payload": {
                "cwd": "/tmp",
                "task": "say hi",
                "system_prompt": "You echo."
            }
        }))
        .unwrap();
        match req {
            WorkerRequest::Start { payload } => {
                assert_eq!(payload.task, "say hi");
                assert!(payload.model.is_none());
                assert!(payload.tool_names.is_none());
            }
            WorkerRequest::Abort => panic!("expected start"),
        }
    }
}
