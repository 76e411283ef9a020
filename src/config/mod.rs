pub mod merge;
pub mod schema;

pub use schema::*;

use crate::agent::AgentSource;
use crate::cli::{Cli, Commands};
use crate::error::ConfigError;
use anyhow::Context;
use std::path::{Path, PathBuf};

/// Environment variable overriding the batch size ceiling.
pub const ENV_MAX_PARALLEL_TASKS: &str = "FANOUT_MAX_PARALLEL_TASKS";
/// Environment variable overriding the in-flight task cap.
pub const ENV_MAX_CONCURRENCY: &str = "FANOUT_MAX_CONCURRENCY";
/// Environment variable carrying the calling agent's spawn policy.
pub const ENV_SPAWNS: &str = "FANOUT_SPAWNS";
/// Environment variable naming the agent that may not be spawned.
pub const ENV_BLOCKED_AGENT: &str = "FANOUT_BLOCKED_AGENT";

/// Load configuration by merging global, workspace, environment, and CLI sources.
/// Precedence: CLI > environment > workspace config > global config > defaults.
///
/// Missing config files are handled gracefully (defaults apply).
pub fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    // Layer 1: Global config (~/.config/fanout/fanout.toml or platform equivalent)
    let global = load_global_config();

    // Determine cwd from CLI or global config, for loading workspace config.
    let cwd = cli
        .cwd
        .clone()
        .or_else(|| global.cwd.clone())
        .map(Ok)
        .unwrap_or_else(std::env::current_dir)
        .context("Failed to determine working directory")?;

    // Layer 2: Workspace config (cwd/fanout.toml, or --config)
    let workspace = match &cli.config {
        Some(path) => load_toml_file(path).unwrap_or_default(),
        None => load_toml_file(&cwd.join("fanout.toml")).unwrap_or_default(),
    };

    // Layer 3: Environment
    let env = env_to_partial(|key| std::env::var(key).ok());

    // Layer 4: CLI args (converted to PartialConfig)
    let cli_partial = cli_to_partial(cli, cwd);

    // Merge: CLI > env > workspace > global > defaults
    let config = cli_partial
        .with_fallback(env)
        .with_fallback(workspace)
        .with_fallback(global)
        .finalize();

    Ok(config)
}

/// Load global config from the platform-specific config directory.
/// Returns empty PartialConfig if file not found.
fn load_global_config() -> PartialConfig {
    let Some(dir) = global_config_dir() else {
        tracing::debug!("Could not determine global config directory");
        return PartialConfig::default();
    };
    let mut partial = load_toml_file(&dir.join("fanout.toml")).unwrap_or_default();
    partial.user_agents_dir = partial.user_agents_dir.or(Some(dir.join("agents")));
    partial
}

/// Load and parse a TOML config file into a PartialConfig.
/// Returns None on file-not-found; logs read and parse errors and returns None.
pub fn load_toml_file(path: &Path) -> Option<PartialConfig> {
    match read_config_file(path) {
        Ok(Some(config_file)) => {
            tracing::info!("Loaded config from {}", path.display());
            Some(config_file.into_partial())
        }
        Ok(None) => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            None
        }
        Err(e) => {
            tracing::warn!("Ignoring config at {}: {}", path.display(), e);
            None
        }
    }
}

fn read_config_file(path: &Path) -> Result<Option<ConfigFile>, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    toml::from_str(&contents)
        .map(Some)
        .map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Resolve the platform-specific global config directory.
/// Linux: ~/.config/fanout/
/// macOS: ~/Library/Application Support/fanout/
fn global_config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "fanout").map(|dirs| dirs.config_dir().to_path_buf())
}

impl ConfigFile {
    /// Flatten the sectioned file into a PartialConfig.
    pub fn into_partial(self) -> PartialConfig {
        let general = self.general;
        let orchestration = self.orchestration;

        let agents: Vec<_> = self
            .agents
            .into_iter()
            .map(|(name, file)| file.into_definition(&name, AgentSource::User, None))
            .collect();

        let (cwd, user_agents_dir) = match general {
            Some(g) => (g.cwd.map(PathBuf::from), g.agents_dir.map(PathBuf::from)),
            None => (None, None),
        };

        let mut partial = PartialConfig {
            cwd,
            user_agents_dir,
            agents: (!agents.is_empty()).then_some(agents),
            ..Default::default()
        };

        if let Some(o) = orchestration {
            partial.max_parallel_tasks = o.max_parallel_tasks;
            partial.max_concurrency = o.max_concurrency;
            partial.max_output_bytes = o.max_output_bytes;
            partial.max_output_lines = o.max_output_lines;
            partial.abort_grace_ms = o.abort_grace_ms;
            partial.termination_timeout_ms = o.termination_timeout_ms;
            partial.artifacts_dir = o.artifacts_dir.map(PathBuf::from);
            partial.transcripts = o.transcripts;
            partial.spawn_policy = o.spawn_policy;
            partial.blocked_agent = o.blocked_agent;
        }

        partial
    }
}

/// Read the environment layer through `lookup` so tests need not mutate
/// the process environment.
pub fn env_to_partial(lookup: impl Fn(&str) -> Option<String>) -> PartialConfig {
    PartialConfig {
        max_parallel_tasks: parse_env_usize(&lookup, ENV_MAX_PARALLEL_TASKS),
        max_concurrency: parse_env_usize(&lookup, ENV_MAX_CONCURRENCY),
        spawn_policy: lookup(ENV_SPAWNS),
        blocked_agent: lookup(ENV_BLOCKED_AGENT),
        ..Default::default()
    }
}

fn parse_env_usize(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<usize> {
    let raw = lookup(key)?;
    match raw.trim().parse::<usize>() {
        Ok(value) => Some(value),
        Err(e) => {
            let err = ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?} is not a non-negative integer ({e})"),
            };
            tracing::warn!("Ignoring environment override: {}", err);
            None
        }
    }
}

/// Convert CLI arguments to a PartialConfig for merging.
fn cli_to_partial(cli: &Cli, cwd: PathBuf) -> PartialConfig {
    let base = PartialConfig {
        cwd: Some(cwd),
        ..Default::default()
    };
    match &cli.command {
        Commands::Check {
            max_parallel_tasks,
            spawns,
            blocked_agent,
            ..
        } => PartialConfig {
            max_parallel_tasks: *max_parallel_tasks,
            spawn_policy: spawns.clone(),
            blocked_agent: blocked_agent.clone(),
            ..base
        },
        Commands::Output { dir, .. } => PartialConfig {
            artifacts_dir: dir.clone(),
            ..base
        },
        Commands::Agents => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_layer_parses_limits() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_MAX_PARALLEL_TASKS, "8"),
            (ENV_MAX_CONCURRENCY, "not-a-number"),
            (ENV_SPAWNS, "explore,task"),
        ]);
        let partial = env_to_partial(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(partial.max_parallel_tasks, Some(8));
        assert_eq!(partial.max_concurrency, None);
        assert_eq!(partial.spawn_policy.as_deref(), Some("explore,task"));
        assert!(partial.blocked_agent.is_none());
    }

    #[test]
    fn config_file_sections_flatten() {
        let file: ConfigFile = toml::from_str(
            r#"
            [orchestration]
            max_parallel_tasks = 12
            abort_grace_ms = 500
            transcripts = true

            [agents.reviewer]
            description = "Reviews diffs"
            system_prompt = "Review carefully."
            tools = ["read", "grep"]
            "#,
        )
        .unwrap();
        let config = file.into_partial().finalize();
        assert_eq!(config.orchestrator.max_parallel_tasks, 12);
        assert_eq!(config.orchestrator.abort_grace.as_millis(), 500);
        assert!(config.orchestrator.transcripts);
        assert_eq!(config.agents.len(), 1);
        assert_eq!(config.agents[0].name, "reviewer");
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("fanout.toml");
        std::fs::write(&path, "[orchestration\nmax_parallel_tasks = 3").unwrap();
        let err = read_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(load_toml_file(&path).is_none());
    }

    #[test]
    fn missing_file_yields_none() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(load_toml_file(&tmp.path().join("nope.toml")).is_none());
    }
}
