//! Execution unit runtime.
//!
//! Each unit is a dedicated tokio task that owns one agent session for one
//! task. It talks to its executor only through the request/response channels
//! of [`UnitHandle`]; every message is moved, never shared.
//!
//! Lifecycle:
//! 1. Wait for the first `Start` (an `Abort` seen earlier is remembered).
//! 2. Resolve cwd, model and system prompt, create the session, subscribe.
//! 3. Prompt with the task text while forwarding whitelisted events and
//!    listening for `Abort`.
//! 4. Dispose the session (errors swallowed) and send exactly one `Done`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::protocol::{WorkerRequest, WorkerResponse, WorkerStartPayload};
use crate::agent::system_prompt::{compose_system_prompt, DEFAULT_SYSTEM_PROMPT};
use crate::error::WorkerError;
use crate::session::{
    AgentSession, ModelResolver, ResolvedModel, Role, SessionEvent, SessionFactory,
    SessionOptions, StopReason,
};

/// Shared, cheaply clonable context used to spawn execution units.
#[derive(Clone)]
pub struct UnitRuntime {
    sessions: Arc<dyn SessionFactory>,
    models: Arc<dyn ModelResolver>,
    default_system_prompt: Arc<str>,
}

impl UnitRuntime {
    pub fn new(sessions: Arc<dyn SessionFactory>, models: Arc<dyn ModelResolver>) -> Self {
        Self {
            sessions,
            models,
            default_system_prompt: Arc::from(DEFAULT_SYSTEM_PROMPT),
        }
    }

    /// Replace the base prompt that role instructions are appended to.
    pub fn with_default_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.default_system_prompt = Arc::from(prompt.into());
        self
    }

    /// Spawn a fresh, idle execution unit. Send it a `Start` to begin work.
    pub fn spawn(&self, label: impl Into<String>) -> UnitHandle {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let unit = Unit {
            runtime: self.clone(),
            label: label.into(),
        };
        let task = tokio::spawn(unit.run(request_rx, response_tx));

        UnitHandle {
            requests: request_tx,
            responses: response_rx,
            task,
        }
    }
}

/// The executor's end of one execution unit.
pub struct UnitHandle {
    requests: UnboundedSender<WorkerRequest>,
    responses: UnboundedReceiver<WorkerResponse>,
    task: JoinHandle<()>,
}

impl UnitHandle {
    pub fn send(&self, request: WorkerRequest) -> Result<(), WorkerError> {
        self.requests
            .send(request)
            .map_err(|_| WorkerError::Disconnected)
    }

    /// Next response, or `None` once the unit has gone away.
    pub async fn recv(&mut self) -> Option<WorkerResponse> {
        self.responses.recv().await
    }

    /// Force-terminate the unit without waiting for `Done`.
    pub fn terminate(&self) {
        self.task.abort();
    }
}

impl Drop for UnitHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Unit {
    runtime: UnitRuntime,
    label: String,
}

impl Unit {
    async fn run(
        self,
        mut requests: UnboundedReceiver<WorkerRequest>,
        responses: UnboundedSender<WorkerResponse>,
    ) {
        let abort = CancellationToken::new();

        let payload = loop {
            match requests.recv().await {
                Some(WorkerRequest::Start { payload }) => break *payload,
                Some(WorkerRequest::Abort) => {
                    tracing::debug!(unit = %self.label, "abort received before start");
                    abort.cancel();
                }
                None => return,
            }
        };

        if abort.is_cancelled() {
            let _ = responses.send(WorkerResponse::done_aborted(0, None));
            return;
        }

        tracing::debug!(unit = %self.label, cwd = %payload.cwd.display(), "execution unit started");

        let execution = self.execute(payload, &responses, &abort);
        tokio::pin!(execution);

        let mut requests_open = true;
        let done = loop {
            tokio::select! {
                done = &mut execution => break done,
                request = requests.recv(), if requests_open => match request {
                    Some(WorkerRequest::Abort) => {
                        tracing::debug!(unit = %self.label, "abort requested");
                        abort.cancel();
                    }
                    Some(WorkerRequest::Start { .. }) => {
                        tracing::warn!(unit = %self.label, "ignoring second start; units run one task");
                    }
                    None => {
                        // Executor is gone; nobody will read the result.
                        requests_open = false;
                        abort.cancel();
                    }
                },
            }
        };

        let _ = responses.send(done);
    }

    async fn execute(
        &self,
        payload: WorkerStartPayload,
        responses: &UnboundedSender<WorkerResponse>,
        abort: &CancellationToken,
    ) -> WorkerResponse {
        let started = Instant::now();
        let elapsed = || started.elapsed().as_millis() as u64;

        let task = payload.task.clone();
        let options = match self.session_options(payload).await {
            Ok(options) => options,
            Err(e) => return WorkerResponse::done_failed(elapsed(), e.to_string()),
        };

        let session = match self.runtime.sessions.create(options).await {
            Ok(session) => session,
            Err(e) => {
                let err = WorkerError::SessionCreate(format!("{e:#}"));
                return WorkerResponse::done_failed(elapsed(), err.to_string());
            }
        };

        let mut events = session.subscribe();
        let outcome = if abort.is_cancelled() {
            RunOutcome::default()
        } else {
            drive_session(session.as_ref(), task, &mut events, responses, abort).await
        };
        drop(events);

        if let Err(e) = session.dispose().await {
            tracing::debug!(unit = %self.label, error = %e, "session dispose failed");
        }

        if abort.is_cancelled() || outcome.aborted {
            return WorkerResponse::done_aborted(elapsed(), outcome.error);
        }
        match outcome.error {
            Some(error) => WorkerResponse::done_failed(elapsed(), error),
            None => WorkerResponse::done_ok(elapsed()),
        }
    }

    async fn session_options(&self, payload: WorkerStartPayload) -> Result<SessionOptions, WorkerError> {
        let cwd = resolve_cwd(payload.cwd).await?;

        let model = payload
            .model
            .as_deref()
            .and_then(|pattern| self.resolve_model(pattern));

        Ok(SessionOptions {
            cwd,
            model,
            system_prompt: compose_system_prompt(
                &self.runtime.default_system_prompt,
                &payload.system_prompt,
            ),
            tool_names: payload.tool_names,
            session_file: payload.session_file,
            spawns: payload.spawns,
            settings: payload.settings,
        })
    }

    fn resolve_model(&self, pattern: &str) -> Option<ResolvedModel> {
        let resolved = self.runtime.models.resolve(pattern);
        match &resolved {
            Some(r) => tracing::debug!(unit = %self.label, pattern, model = %r.model, "model override resolved"),
            None => tracing::warn!(unit = %self.label, pattern, "model override matched nothing; using session default"),
        }
        resolved
    }
}

async fn resolve_cwd(cwd: PathBuf) -> Result<PathBuf, WorkerError> {
    match tokio::fs::metadata(&cwd).await {
        Ok(meta) if meta.is_dir() => Ok(cwd),
        Ok(_) => Err(WorkerError::InvalidCwd {
            path: cwd,
            message: "not a directory".into(),
        }),
        Err(e) => Err(WorkerError::InvalidCwd {
            path: cwd,
            message: e.to_string(),
        }),
    }
}

#[derive(Default)]
struct RunOutcome {
    aborted: bool,
    error: Option<String>,
}

/// Prompt the session while forwarding its events and honouring abort.
async fn drive_session(
    session: &dyn AgentSession,
    task: String,
    events: &mut UnboundedReceiver<SessionEvent>,
    responses: &UnboundedSender<WorkerResponse>,
    abort: &CancellationToken,
) -> RunOutcome {
    let mut outcome = RunOutcome::default();
    let prompt = session.prompt(task);
    tokio::pin!(prompt);

    let mut abort_sent = false;
    let result = loop {
        tokio::select! {
            biased;
            Some(event) = events.recv() => {
                if !forward(event, responses, &mut outcome) {
                    abort.cancel();
                }
            }
            result = &mut prompt => break result,
            _ = abort.cancelled(), if !abort_sent => {
                abort_sent = true;
                session.abort().await;
            }
        }
    };

    // Events published right before the prompt resolved.
    while let Ok(event) = events.try_recv() {
        forward(event, responses, &mut outcome);
    }

    if let Err(e) = result {
        outcome.error = Some(format!("{e:#}"));
    }
    outcome
}

/// Forward one event if whitelisted. Returns `false` when the executor has
/// stopped listening.
fn forward(
    event: SessionEvent,
    responses: &UnboundedSender<WorkerResponse>,
    outcome: &mut RunOutcome,
) -> bool {
    if let SessionEvent::MessageEnd { message } = &event {
        if message.role == Role::Assistant {
            match message.stop_reason {
                Some(StopReason::Aborted) => outcome.aborted = true,
                Some(StopReason::Error) => {
                    outcome.error = Some(
                        message
                            .error_message
                            .clone()
                            .unwrap_or_else(|| "assistant message ended with an error".into()),
                    );
                }
                _ => outcome.error = None,
            }
        }
    }

    if !event.is_forwarded() {
        return true;
    }
    responses.send(WorkerResponse::Event { event }).is_ok()
}
