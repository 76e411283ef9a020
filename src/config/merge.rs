use super::schema::{
    AppConfig, OrchestratorConfig, PartialConfig, DEFAULT_ABORT_GRACE_MS,
    DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_MAX_OUTPUT_LINES,
    DEFAULT_MAX_PARALLEL_TASKS, DEFAULT_TERMINATION_TIMEOUT_MS,
};
use crate::agent::AgentDefinition;
use std::path::PathBuf;
use std::time::Duration;

impl PartialConfig {
    /// Merge self with a lower-priority fallback.
    /// Self's non-None values take precedence.
    /// For agents: UNION semantics, self's definition wins on a name clash.
    pub fn with_fallback(self, fallback: PartialConfig) -> PartialConfig {
        PartialConfig {
            cwd: self.cwd.or(fallback.cwd),
            user_agents_dir: self.user_agents_dir.or(fallback.user_agents_dir),
            max_parallel_tasks: self.max_parallel_tasks.or(fallback.max_parallel_tasks),
            max_concurrency: self.max_concurrency.or(fallback.max_concurrency),
            max_output_bytes: self.max_output_bytes.or(fallback.max_output_bytes),
            max_output_lines: self.max_output_lines.or(fallback.max_output_lines),
            abort_grace_ms: self.abort_grace_ms.or(fallback.abort_grace_ms),
            termination_timeout_ms: self
                .termination_timeout_ms
                .or(fallback.termination_timeout_ms),
            artifacts_dir: self.artifacts_dir.or(fallback.artifacts_dir),
            transcripts: self.transcripts.or(fallback.transcripts),
            spawn_policy: self.spawn_policy.or(fallback.spawn_policy),
            blocked_agent: self.blocked_agent.or(fallback.blocked_agent),
            agents: merge_agents(self.agents, fallback.agents),
        }
    }

    /// Convert to AppConfig, filling any remaining gaps with defaults.
    pub fn finalize(self) -> AppConfig {
        let cwd = self.cwd.unwrap_or_else(|| PathBuf::from("."));

        let orchestrator = OrchestratorConfig {
            max_parallel_tasks: self
                .max_parallel_tasks
                .unwrap_or(DEFAULT_MAX_PARALLEL_TASKS)
                .max(1),
            max_concurrency: self
                .max_concurrency
                .unwrap_or(DEFAULT_MAX_CONCURRENCY)
                .max(1),
            max_output_bytes: self.max_output_bytes.unwrap_or(DEFAULT_MAX_OUTPUT_BYTES),
            max_output_lines: self.max_output_lines.unwrap_or(DEFAULT_MAX_OUTPUT_LINES),
            abort_grace: Duration::from_millis(
                self.abort_grace_ms.unwrap_or(DEFAULT_ABORT_GRACE_MS),
            ),
            termination_timeout: Duration::from_millis(
                self.termination_timeout_ms
                    .unwrap_or(DEFAULT_TERMINATION_TIMEOUT_MS),
            ),
            artifacts_dir: self.artifacts_dir,
            transcripts: self.transcripts.unwrap_or(false),
        };

        AppConfig {
            cwd,
            orchestrator,
            spawn_policy: self.spawn_policy.unwrap_or_else(|| "*".to_string()),
            blocked_agent: self.blocked_agent.filter(|a| !a.trim().is_empty()),
            user_agents_dir: self.user_agents_dir,
            agents: self.agents.unwrap_or_default(),
        }
    }
}

fn merge_agents(
    primary: Option<Vec<AgentDefinition>>,
    fallback: Option<Vec<AgentDefinition>>,
) -> Option<Vec<AgentDefinition>> {
    match (primary, fallback) {
        (None, None) => None,
        (Some(p), None) => Some(p),
        (None, Some(f)) => Some(f),
        (Some(p), Some(f)) => {
            let mut merged: Vec<AgentDefinition> = f
                .into_iter()
                .filter(|def| !p.iter().any(|o| o.name == def.name))
                .collect();
            merged.extend(p);
            Some(merged)
        }
    }
}
