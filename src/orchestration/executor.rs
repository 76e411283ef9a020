//! Runs one task in its own execution unit.
//!
//! The executor owns the task's [`TaskTracker`], writes its artifacts, and
//! drives the unit through a single `select!` loop over four sources:
//!
//! - unit responses (events and the final `Done`)
//! - the caller's cancellation token
//! - the deadline of a pending handler-requested termination
//! - the grace deadline after an `Abort` was sent
//!
//! Abort is idempotent. The first request sends `Abort` and arms the grace
//! deadline; if the unit has not reported `Done` when it passes, the unit is
//! force-terminated and an aborted result is synthesized.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use super::artifacts::{ArtifactStore, TranscriptWriter};
use super::handlers::ToolHandlerRegistry;
use super::progress::{TaskTracker, Termination, TrackerAction};
use super::truncate::{output_meta, truncate_output};
use super::types::{AgentProgress, AgentStatus, BusEvent, SingleResult, output_id};
use crate::agent::AgentDefinition;
use crate::config::OrchestratorConfig;
use crate::session::SessionEvent;
use crate::worker::{UnitHandle, UnitRuntime, WorkerRequest, WorkerResponse, WorkerStartPayload};

/// Error reported when a unit's channel closes without a `Done`.
pub const UNIT_VANISHED: &str = "execution unit exited without reporting completion";

/// Per-task progress sink. Receives a copy after every change.
pub type TaskProgressFn = Arc<dyn Fn(&AgentProgress) + Send + Sync>;

/// Everything shared by the executors of one batch.
#[derive(Clone)]
pub struct ExecutorContext {
    pub runtime: UnitRuntime,
    pub config: Arc<OrchestratorConfig>,
    pub handlers: ToolHandlerRegistry,
    pub artifacts: Option<ArtifactStore>,
    pub cancel: CancellationToken,
    pub cwd: PathBuf,
    pub session_dir: Option<PathBuf>,
    pub settings: Option<serde_json::Value>,
    pub on_progress: Option<TaskProgressFn>,
    pub events: Option<UnboundedSender<BusEvent>>,
}

/// One scheduled task, with its prompt already composed.
#[derive(Clone, Debug)]
pub struct SubagentTask {
    pub index: usize,
    pub id: String,
    pub agent: AgentDefinition,
    /// The task's own instruction, as shown in progress and results.
    pub task: String,
    /// Context, instruction and output-format section, as sent to the agent.
    pub prompt: String,
    pub description: String,
    /// Explicit per-task or per-batch model override.
    pub model_override: Option<String>,
}

impl SubagentTask {
    pub fn output_id(&self) -> String {
        output_id(&self.agent.name, self.index)
    }

    pub fn pending_progress(&self) -> AgentProgress {
        AgentProgress::pending(
            self.index,
            &self.id,
            &self.agent.name,
            self.agent.source,
            &self.task,
            &self.description,
            self.model_override.clone(),
        )
    }

    fn start_payload(&self, ctx: &ExecutorContext) -> WorkerStartPayload {
        WorkerStartPayload {
            cwd: ctx.cwd.clone(),
            task: self.prompt.clone(),
            system_prompt: self.agent.system_prompt.clone(),
            model: self
                .model_override
                .clone()
                .or_else(|| self.agent.model.clone()),
            tool_names: self.agent.effective_tools(),
            session_file: ctx
                .session_dir
                .as_ref()
                .map(|dir| dir.join(format!("{}.session.jsonl", self.output_id()))),
            spawns: Some(self.agent.spawn_policy_string()),
            settings: ctx.settings.clone(),
        }
    }
}

/// Outcome reported by the unit, or synthesized when it never reported.
struct Completion {
    exit_code: i32,
    error: Option<String>,
    aborted: bool,
}

/// Run one task to completion. Never fails: every error ends up in the result.
pub async fn run_subagent(ctx: ExecutorContext, task: SubagentTask) -> SingleResult {
    let id = task.output_id();
    let mut tracker = TaskTracker::new(
        task.pending_progress(),
        ctx.handlers.clone(),
        ctx.config.termination_timeout,
    );

    if ctx.cancel.is_cancelled() {
        tracing::debug!(index = task.index, agent = %task.agent.name, "cancelled before start");
        return build_result(
            &ctx,
            &task,
            tracker,
            Completion {
                exit_code: 1,
                error: Some("Cancelled before start".into()),
                aborted: true,
            },
            None,
        )
        .await;
    }

    let mut input_written = false;
    let mut transcript = None;
    if let Some(store) = &ctx.artifacts {
        input_written = prepare_artifacts(store, &id, &task.prompt).await;
        if input_written && ctx.config.transcripts {
            transcript = match store.open_transcript(&id) {
                Ok(writer) => Some(writer),
                Err(e) => {
                    tracing::warn!(index = task.index, "Failed to open transcript: {}", e);
                    None
                }
            };
        }
    }

    tracing::info!(index = task.index, agent = %task.agent.name, id = %task.id, "starting subagent");
    tracker.set_status(AgentStatus::Running);
    emit_progress(&ctx, tracker.progress());

    let mut handle = ctx.runtime.spawn(id.clone());
    let payload = task.start_payload(&ctx);
    let completion = match handle.send(WorkerRequest::Start {
        payload: Box::new(payload),
    }) {
        Ok(()) => drive_unit(&ctx, &task, &mut handle, &mut tracker, transcript.as_mut()).await,
        Err(e) => Completion {
            exit_code: 1,
            error: Some(e.to_string()),
            aborted: false,
        },
    };
    drop(handle);

    let written = ctx.artifacts.as_ref().map(|_| ArtifactsWritten {
        input: input_written,
        transcript: transcript.is_some(),
    });
    build_result(&ctx, &task, tracker, completion, written).await
}

/// Result for a task whose executor never produced one.
pub fn failed_result(task: &SubagentTask, error: String) -> SingleResult {
    SingleResult {
        index: task.index,
        id: task.id.clone(),
        agent: task.agent.name.clone(),
        agent_source: task.agent.source,
        task: task.task.clone(),
        description: task.description.clone(),
        exit_code: 1,
        output: String::new(),
        stderr: error.clone(),
        truncated: false,
        duration_ms: 0,
        tokens: 0,
        model_override: task.model_override.clone(),
        usage: None,
        error: Some(error),
        aborted: false,
        artifacts: None,
        extracted_tool_data: None,
        output_meta: None,
    }
}

/// Which artifact files exist for a task that got an execution unit.
struct ArtifactsWritten {
    input: bool,
    transcript: bool,
}

/// Create the artifact directory and write the input file. Returns whether
/// the input file was written.
async fn prepare_artifacts(store: &ArtifactStore, id: &str, prompt: &str) -> bool {
    if let Err(e) = store.ensure_dir().await {
        tracing::warn!(id, "Failed to create artifact directory: {}", e);
        return false;
    }
    match store.write_input(id, prompt).await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(id, "Failed to write input artifact: {}", e);
            false
        }
    }
}

/// Abort bookkeeping for one unit.
#[derive(Default)]
struct AbortState {
    requested: bool,
    grace_deadline: Option<Instant>,
}

impl AbortState {
    fn request(&mut self, handle: &UnitHandle, ctx: &ExecutorContext, reason: &str) {
        if self.requested {
            return;
        }
        self.requested = true;
        tracing::debug!(reason, "requesting unit abort");
        if let Err(e) = handle.send(WorkerRequest::Abort) {
            tracing::debug!("abort not delivered: {}", e);
        }
        self.grace_deadline = Some(Instant::now() + ctx.config.abort_grace);
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn drive_unit(
    ctx: &ExecutorContext,
    task: &SubagentTask,
    handle: &mut UnitHandle,
    tracker: &mut TaskTracker,
    mut transcript: Option<&mut TranscriptWriter>,
) -> Completion {
    let mut abort = AbortState::default();

    loop {
        let termination_deadline = tracker.termination_deadline();
        let grace_deadline = abort.grace_deadline;

        tokio::select! {
            response = handle.recv() => match response {
                Some(WorkerResponse::Event { event }) => {
                    if let Some(writer) = transcript.as_deref_mut() {
                        if let Err(e) = writer.record(&event) {
                            tracing::warn!(index = task.index, "Failed to write transcript: {}", e);
                        }
                    }
                    tracing::debug!(index = task.index, kind = event.kind(), "session event");
                    let action = tracker.apply(&event);
                    emit_event(ctx, task, event);
                    emit_progress(ctx, tracker.progress());
                    if action == TrackerAction::IssueAbort {
                        abort.request(handle, ctx, "result handler requested termination");
                    }
                }
                Some(WorkerResponse::Done { exit_code, error, aborted, .. }) => {
                    return Completion { exit_code, error, aborted };
                }
                None => {
                    tracing::warn!(index = task.index, "{}", UNIT_VANISHED);
                    return Completion {
                        exit_code: 1,
                        error: Some(UNIT_VANISHED.into()),
                        aborted: false,
                    };
                }
            },
            _ = ctx.cancel.cancelled(), if !abort.requested => {
                abort.request(handle, ctx, "caller cancelled");
            }
            _ = sleep_until_opt(termination_deadline) => {
                if tracker.expire_termination() == TrackerAction::IssueAbort {
                    abort.request(handle, ctx, "termination deadline passed");
                }
            }
            _ = sleep_until_opt(grace_deadline) => {
                tracing::warn!(index = task.index, agent = %task.agent.name, "unit ignored abort; terminating");
                handle.terminate();
                return Completion {
                    exit_code: 1,
                    error: None,
                    aborted: true,
                };
            }
        }
    }
}

async fn build_result(
    ctx: &ExecutorContext,
    task: &SubagentTask,
    mut tracker: TaskTracker,
    completion: Completion,
    written: Option<ArtifactsWritten>,
) -> SingleResult {
    let id = task.output_id();

    // A termination we issued ourselves means the agent already delivered.
    let self_terminated = tracker.termination() == Termination::Issued && !ctx.cancel.is_cancelled();
    let aborted = !self_terminated && (completion.aborted || ctx.cancel.is_cancelled());
    let (exit_code, error) = if self_terminated && completion.aborted {
        (0, None)
    } else {
        (completion.exit_code, completion.error)
    };

    let raw_output = tracker.output().to_string();
    let (output, truncated) = truncate_output(
        &raw_output,
        ctx.config.max_output_bytes,
        ctx.config.max_output_lines,
    );

    // Paths are only reported for files that were actually written.
    let mut artifacts = None;
    let mut meta = None;
    if let (Some(store), Some(written)) = (&ctx.artifacts, written.filter(|w| w.input)) {
        match store.write_output(&id, &raw_output).await {
            Ok(_) => {
                artifacts = Some(store.paths(&id, written.transcript));
                meta = Some(output_meta(&raw_output));
            }
            Err(e) => {
                tracing::warn!(index = task.index, "Failed to write output artifact: {}", e);
            }
        }
    }

    let status = if aborted {
        AgentStatus::Aborted
    } else if exit_code == 0 {
        AgentStatus::Completed
    } else {
        AgentStatus::Failed
    };
    tracker.set_status(status);
    emit_progress(ctx, tracker.progress());

    let usage = tracker.usage();
    let duration_ms = tracker.elapsed_ms();
    let progress = tracker.into_progress();

    tracing::info!(
        index = task.index,
        agent = %task.agent.name,
        status = status.as_str(),
        duration_ms,
        "subagent finished"
    );

    let stderr = if status == AgentStatus::Completed {
        String::new()
    } else {
        error.clone().unwrap_or_default()
    };

    SingleResult {
        index: task.index,
        id: task.id.clone(),
        agent: task.agent.name.clone(),
        agent_source: task.agent.source,
        task: task.task.clone(),
        description: task.description.clone(),
        exit_code,
        output,
        stderr,
        truncated,
        duration_ms,
        tokens: progress.tokens,
        model_override: task.model_override.clone(),
        usage,
        error,
        aborted,
        artifacts,
        extracted_tool_data: progress.extracted_tool_data,
        output_meta: meta,
    }
}

fn emit_progress(ctx: &ExecutorContext, progress: &AgentProgress) {
    if let Some(on_progress) = &ctx.on_progress {
        on_progress(progress);
    }
    if let Some(events) = &ctx.events {
        let _ = events.send(BusEvent::Progress {
            index: progress.index,
            progress: progress.clone(),
        });
    }
}

fn emit_event(ctx: &ExecutorContext, task: &SubagentTask, event: SessionEvent) {
    if let Some(events) = &ctx.events {
        let _ = events.send(BusEvent::Session {
            index: task.index,
            id: task.id.clone(),
            agent: task.agent.name.clone(),
            event,
        });
    }
}
