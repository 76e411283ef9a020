//! Agent session collaborator interfaces.
//!
//! The language-model client lives outside this crate. Execution units reach
//! it only through [`SessionFactory`] and [`AgentSession`], and observe it
//! only through the [`SessionEvent`] stream returned by
//! [`AgentSession::subscribe`].

pub mod events;
pub mod model;
pub mod usage;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

pub use events::{AgentMessage, ContentBlock, Role, SessionEvent, StopReason, ToolExecution};
pub use model::{ModelCatalog, ModelInfo, ModelResolver, ResolvedModel, ThinkingLevel};
pub use usage::{Usage, UsageCost};

/// Everything a factory needs to build a minimal session inside a unit.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub cwd: PathBuf,
    pub model: Option<ResolvedModel>,
    pub system_prompt: String,
    /// Tool allow-list; `None` means the factory's defaults.
    pub tool_names: Option<Vec<String>>,
    /// Persist the session here; `None` keeps it in memory.
    pub session_file: Option<PathBuf>,
    /// Spawn policy string handed to nested delegation (`""`, `"*"`, or a list).
    pub spawns: Option<String>,
    /// Opaque host settings (auth, provider configuration) passed through.
    pub settings: Option<serde_json::Value>,
}

/// A running agent conversation.
///
/// Dropping the receiver returned by [`subscribe`](AgentSession::subscribe)
/// unsubscribes.
#[async_trait]
pub trait AgentSession: Send + Sync {
    fn subscribe(&self) -> UnboundedReceiver<SessionEvent>;

    /// Run the conversation to completion for one user prompt.
    async fn prompt(&self, text: String) -> anyhow::Result<()>;

    /// Ask the in-flight prompt to stop. Must be safe to call concurrently
    /// with [`prompt`](AgentSession::prompt).
    async fn abort(&self);

    /// Release session resources.
    async fn dispose(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self, options: SessionOptions) -> anyhow::Result<Arc<dyn AgentSession>>;
}
