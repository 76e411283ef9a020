//! Scripted agent sessions for driving the orchestrator without a model.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

use fanout::agent::{AgentDefinition, AgentSource, Spawns};
use fanout::session::{
    AgentMessage, AgentSession, SessionEvent, SessionFactory, SessionOptions, StopReason,
    ToolExecution, Usage,
};

/// One step of a scripted session run.
#[derive(Clone, Debug)]
pub enum Step {
    Emit(SessionEvent),
    Sleep(Duration),
    /// Block until aborted (or forever when the script ignores aborts).
    WaitForAbort,
    Fail(String),
    Panic,
}

#[derive(Clone, Debug, Default)]
pub struct Script {
    pub steps: Vec<Step>,
    pub ignore_abort: bool,
}

impl Script {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            ignore_abort: false,
        }
    }

    pub fn ignoring_abort(mut self) -> Self {
        self.ignore_abort = true;
        self
    }
}

/// Agent that answers `text` in one message.
pub fn echo(text: &str, tokens: u64) -> Script {
    let message = AgentMessage::assistant_text(text).with_usage(usage(tokens));
    Script::new(vec![
        Step::Emit(SessionEvent::AgentStart),
        Step::Emit(SessionEvent::MessageEnd {
            message: message.clone(),
        }),
        Step::Emit(SessionEvent::AgentEnd {
            messages: vec![message],
        }),
    ])
}

pub fn usage(tokens: u64) -> Usage {
    Usage {
        input: tokens,
        total_tokens: tokens,
        ..Default::default()
    }
}

pub fn tool_call(name: &str, args: serde_json::Value) -> ToolExecution {
    ToolExecution {
        tool_call_id: format!("call_{name}"),
        tool_name: name.into(),
        args,
        result: None,
        is_error: false,
    }
}

pub fn agent(name: &str) -> AgentDefinition {
    AgentDefinition {
        name: name.into(),
        description: format!("{name} agent"),
        system_prompt: format!("You are {name}."),
        tools: Some(vec!["read".into(), "grep".into()]),
        spawns: Some(Spawns::all()),
        model: None,
        source: AgentSource::Builtin,
        file_path: None,
    }
}

type ScriptFn = dyn Fn(&str) -> Script + Send + Sync;

/// Factory whose sessions follow a script chosen from the prompt text.
pub struct ScriptedFactory {
    script_for: Arc<ScriptFn>,
    pub created: AtomicUsize,
    pub aborted: Arc<AtomicUsize>,
    pub disposed: Arc<AtomicUsize>,
    pub options: Mutex<Vec<SessionOptions>>,
}

impl ScriptedFactory {
    pub fn new(script_for: impl Fn(&str) -> Script + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script_for: Arc::new(script_for),
            created: AtomicUsize::new(0),
            aborted: Arc::new(AtomicUsize::new(0)),
            disposed: Arc::new(AtomicUsize::new(0)),
            options: Mutex::new(Vec::new()),
        })
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn aborted(&self) -> usize {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn recorded_options(&self) -> Vec<SessionOptions> {
        self.options.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    async fn create(&self, options: SessionOptions) -> anyhow::Result<Arc<dyn AgentSession>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.options.lock().unwrap().push(options);
        Ok(Arc::new(ScriptedSession {
            script_for: Arc::clone(&self.script_for),
            subscribers: Mutex::new(Vec::new()),
            abort: CancellationToken::new(),
            aborted: Arc::clone(&self.aborted),
            disposed: Arc::clone(&self.disposed),
        }))
    }
}

struct ScriptedSession {
    script_for: Arc<ScriptFn>,
    subscribers: Mutex<Vec<UnboundedSender<SessionEvent>>>,
    abort: CancellationToken,
    aborted: Arc<AtomicUsize>,
    disposed: Arc<AtomicUsize>,
}

impl ScriptedSession {
    fn emit(&self, event: SessionEvent) {
        let subscribers = self.subscribers.lock().unwrap();
        for tx in subscribers.iter() {
            let _ = tx.send(event.clone());
        }
    }

    fn emit_aborted(&self) {
        self.emit(SessionEvent::MessageEnd {
            message: AgentMessage::assistant_text("")
                .with_stop_reason(StopReason::Aborted),
        });
    }
}

#[async_trait]
impl AgentSession for ScriptedSession {
    fn subscribe(&self) -> UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    async fn prompt(&self, text: String) -> anyhow::Result<()> {
        let script = (self.script_for)(&text);
        for step in script.steps {
            match step {
                Step::Emit(event) => self.emit(event),
                Step::Sleep(duration) if script.ignore_abort => tokio::time::sleep(duration).await,
                Step::Sleep(duration) => {
                    tokio::select! {
                        _ = tokio::time::sleep(duration) => {}
                        _ = self.abort.cancelled() => {
                            self.emit_aborted();
                            return Ok(());
                        }
                    }
                }
                Step::WaitForAbort if script.ignore_abort => std::future::pending::<()>().await,
                Step::WaitForAbort => {
                    self.abort.cancelled().await;
                    self.emit_aborted();
                    return Ok(());
                }
                Step::Fail(message) => anyhow::bail!(message),
                Step::Panic => panic!("scripted session panicked"),
            }
        }
        Ok(())
    }

    async fn abort(&self) {
        self.aborted.fetch_add(1, Ordering::SeqCst);
        self.abort.cancel();
    }

    async fn dispose(&self) -> anyhow::Result<()> {
        self.disposed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
