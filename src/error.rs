use std::path::PathBuf;

/// Errors related to configuration loading and parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config at {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Reasons a batch is rejected before any execution unit is spawned.
///
/// The `Display` output is the caller-visible message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error(
        "No tasks provided. Provide at least one task for an agent.\nAvailable agents: {}",
        format_names(.available)
    )]
    EmptyBatch { available: Vec<String> },

    #[error("Too many tasks ({count}). Max is {max}.")]
    TooManyTasks { count: usize, max: usize },

    #[error(
        "Cannot spawn {agent} from within {agent}: recursive delegation is blocked. \
         Do the work directly instead."
    )]
    RecursionBlocked { agent: String },

    #[error("Unknown agent: {agent}. Available agents: {}", format_names(.available))]
    UnknownAgent { agent: String, available: Vec<String> },

    #[error("Cannot spawn '{agent}'. Allowed: {allowed}")]
    SpawnNotPermitted { agent: String, allowed: String },
}

fn format_names(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

/// Errors crossing the execution unit boundary.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Execution unit is no longer accepting requests")]
    Disconnected,

    #[error("Working directory {path} is not usable: {message}")]
    InvalidCwd { path: PathBuf, message: String },

    #[error("Failed to create agent session: {0}")]
    SessionCreate(String),
}

/// Errors surfaced by the concurrency-limited scheduler for a single item.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Operation for item {index} panicked: {message}")]
    Panicked { index: usize, message: String },

    #[error("Operation for item {index} was cancelled")]
    Cancelled { index: usize },
}

/// Errors from artifact persistence. Always logged and swallowed by the
/// executor; only the `output` subcommand surfaces them.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Artifact I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No output artifact for id '{id}' in {dir}")]
    NotFound { id: String, dir: PathBuf },

    #[error("Transcript serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_agent_lists_available_names() {
        let err = ValidationError::UnknownAgent {
            agent: "reviewer".into(),
            available: vec!["task".into(), "explore".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("reviewer"));
        assert!(msg.contains("task, explore"));
    }

    #[test]
    fn empty_batch_with_no_agents_says_none() {
        let err = ValidationError::EmptyBatch { available: vec![] };
        assert!(err.to_string().contains("Available agents: none"));
    }
}
