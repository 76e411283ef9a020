use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::agent::discovery::AgentFile;
use crate::agent::AgentDefinition;

pub const DEFAULT_MAX_PARALLEL_TASKS: usize = 32;
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 500_000;
pub const DEFAULT_MAX_OUTPUT_LINES: usize = 5_000;
pub const DEFAULT_ABORT_GRACE_MS: u64 = 2_000;
pub const DEFAULT_TERMINATION_TIMEOUT_MS: u64 = 2_000;

/// The TOML file structure for fanout.toml.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    pub general: Option<GeneralConfig>,
    pub orchestration: Option<OrchestrationSection>,
    /// Inline agent definitions keyed by name.
    #[serde(default)]
    pub agents: BTreeMap<String, AgentFile>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    pub cwd: Option<String>,
    pub agents_dir: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrchestrationSection {
    pub max_parallel_tasks: Option<usize>,
    pub max_concurrency: Option<usize>,
    pub max_output_bytes: Option<usize>,
    pub max_output_lines: Option<usize>,
    pub abort_grace_ms: Option<u64>,
    pub termination_timeout_ms: Option<u64>,
    /// Persistent artifact directory. Unset means a per-call temp directory.
    pub artifacts_dir: Option<String>,
    pub transcripts: Option<bool>,
    pub spawn_policy: Option<String>,
    pub blocked_agent: Option<String>,
}

/// Limits and persistence settings handed to the orchestrator at
/// construction. The orchestrator never reads the environment itself.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Hard ceiling on tasks per batch.
    pub max_parallel_tasks: usize,
    /// Tasks in flight at once.
    pub max_concurrency: usize,
    pub max_output_bytes: usize,
    pub max_output_lines: usize,
    /// How long an aborted unit gets to report `done` before it is killed.
    pub abort_grace: Duration,
    /// How long a handler-requested termination waits for the next
    /// message-end before aborting anyway.
    pub termination_timeout: Duration,
    pub artifacts_dir: Option<PathBuf>,
    pub transcripts: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: DEFAULT_MAX_PARALLEL_TASKS,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            max_output_lines: DEFAULT_MAX_OUTPUT_LINES,
            abort_grace: Duration::from_millis(DEFAULT_ABORT_GRACE_MS),
            termination_timeout: Duration::from_millis(DEFAULT_TERMINATION_TIMEOUT_MS),
            artifacts_dir: None,
            transcripts: false,
        }
    }
}

/// Fully-resolved runtime configuration. All fields have values.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub cwd: PathBuf,
    pub orchestrator: OrchestratorConfig,
    pub spawn_policy: String,
    pub blocked_agent: Option<String>,
    pub user_agents_dir: Option<PathBuf>,
    pub agents: Vec<AgentDefinition>,
}

/// Partial config used during merge. All fields are Option so that
/// missing fields don't override lower-priority values.
#[derive(Debug, Clone, Default)]
pub struct PartialConfig {
    pub cwd: Option<PathBuf>,
    pub user_agents_dir: Option<PathBuf>,
    pub max_parallel_tasks: Option<usize>,
    pub max_concurrency: Option<usize>,
    pub max_output_bytes: Option<usize>,
    pub max_output_lines: Option<usize>,
    pub abort_grace_ms: Option<u64>,
    pub termination_timeout_ms: Option<u64>,
    pub artifacts_dir: Option<PathBuf>,
    pub transcripts: Option<bool>,
    pub spawn_policy: Option<String>,
    pub blocked_agent: Option<String>,
    pub agents: Option<Vec<AgentDefinition>>,
}
