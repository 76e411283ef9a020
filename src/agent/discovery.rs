//! Agent definition discovery.
//!
//! Definitions come from three places, later ones overriding earlier ones by
//! name: the builtins in this module, user agent files (plus `[agents.*]`
//! tables from the config), and project agent files in
//! `{cwd}/.fanout/agents/`. Each agent file is a standalone TOML document.
//!
//! Unparseable files are logged and skipped so one bad file does not hide
//! every other agent.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::definition::{AgentDefinition, AgentSource, Spawns};

/// Project-relative directory holding project agent files.
pub const PROJECT_AGENTS_DIR: &str = ".fanout/agents";

/// Result of discovery: every known agent plus where project agents live.
#[derive(Clone, Debug, Default)]
pub struct AgentCatalog {
    pub agents: Vec<AgentDefinition>,
    pub project_agents_dir: Option<PathBuf>,
}

impl AgentCatalog {
    pub fn get(&self, name: &str) -> Option<&AgentDefinition> {
        self.agents.iter().find(|a| a.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name.clone()).collect()
    }
}

/// Resolves the agent definitions available to one orchestration call.
pub trait AgentResolver: Send + Sync {
    fn discover(&self, cwd: &Path) -> anyhow::Result<AgentCatalog>;
}

/// Fixed set of definitions, for embedding hosts and tests.
#[derive(Clone, Debug, Default)]
pub struct StaticAgentResolver {
    agents: Vec<AgentDefinition>,
}

impl StaticAgentResolver {
    pub fn new(agents: Vec<AgentDefinition>) -> Self {
        Self { agents }
    }
}

impl AgentResolver for StaticAgentResolver {
    fn discover(&self, _cwd: &Path) -> anyhow::Result<AgentCatalog> {
        Ok(AgentCatalog {
            agents: self.agents.clone(),
            project_agents_dir: None,
        })
    }
}

/// On-disk shape of an agent file or `[agents.<name>]` config table.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentFile {
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub system_prompt: String,
    pub tools: Option<Vec<String>>,
    pub spawns: Option<Spawns>,
    pub model: Option<String>,
}

impl AgentFile {
    /// Convert to a definition. `fallback_name` is used when the file does
    /// not name itself (file stem or config table key).
    pub fn into_definition(
        self,
        fallback_name: &str,
        source: AgentSource,
        file_path: Option<PathBuf>,
    ) -> AgentDefinition {
        AgentDefinition {
            name: self.name.unwrap_or_else(|| fallback_name.to_string()),
            description: self.description,
            system_prompt: self.system_prompt,
            tools: self.tools,
            spawns: self.spawns,
            model: self.model,
            source,
            file_path,
        }
    }
}

/// Agents that ship with the crate.
pub fn builtin_agents() -> Vec<AgentDefinition> {
    vec![
        AgentDefinition {
            name: "task".into(),
            description: "General-purpose agent for self-contained coding tasks".into(),
            system_prompt: "You are a capable software engineer. Complete the assigned task \
                            end to end and report what you changed and why."
                .into(),
            tools: None,
            spawns: None,
            model: None,
            source: AgentSource::Builtin,
            file_path: None,
        },
        AgentDefinition {
            name: "explore".into(),
            description: "Read-only codebase exploration and question answering".into(),
            system_prompt: "You explore codebases without modifying them. Answer with \
                            concrete file paths and line references."
                .into(),
            tools: Some(vec![
                "read".into(),
                "grep".into(),
                "find".into(),
                "ls".into(),
            ]),
            spawns: None,
            model: None,
            source: AgentSource::Builtin,
            file_path: None,
        },
    ]
}

/// Discovers builtins, user agents, config-inline agents, and project agents.
#[derive(Clone, Debug, Default)]
pub struct TomlAgentResolver {
    user_dir: Option<PathBuf>,
    inline: Vec<AgentDefinition>,
    include_builtins: bool,
}

impl TomlAgentResolver {
    pub fn new(user_dir: Option<PathBuf>) -> Self {
        Self {
            user_dir,
            inline: Vec::new(),
            include_builtins: true,
        }
    }

    /// Add definitions declared inline in the config file.
    pub fn with_inline(mut self, agents: Vec<AgentDefinition>) -> Self {
        self.inline = agents;
        self
    }

    pub fn without_builtins(mut self) -> Self {
        self.include_builtins = false;
        self
    }
}

impl AgentResolver for TomlAgentResolver {
    fn discover(&self, cwd: &Path) -> anyhow::Result<AgentCatalog> {
        let mut by_name: BTreeMap<String, AgentDefinition> = BTreeMap::new();
        let mut insert = |def: AgentDefinition| {
            by_name.insert(def.name.clone(), def);
        };

        if self.include_builtins {
            builtin_agents().into_iter().for_each(&mut insert);
        }
        if let Some(dir) = &self.user_dir {
            load_agent_dir(dir, AgentSource::User)
                .into_iter()
                .for_each(&mut insert);
        }
        self.inline.iter().cloned().for_each(&mut insert);

        let project_dir = cwd.join(PROJECT_AGENTS_DIR);
        let project_agents_dir = if project_dir.is_dir() {
            load_agent_dir(&project_dir, AgentSource::Project)
                .into_iter()
                .for_each(&mut insert);
            Some(project_dir)
        } else {
            None
        };

        Ok(AgentCatalog {
            agents: by_name.into_values().collect(),
            project_agents_dir,
        })
    }
}

/// Load every `*.toml` agent file in a directory, sorted by file name.
fn load_agent_dir(dir: &Path, source: AgentSource) -> Vec<AgentDefinition> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No agent directory at {}", dir.display());
            return Vec::new();
        }
        Err(e) => {
            tracing::warn!("Failed to read agent directory {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();

    paths
        .into_iter()
        .filter_map(|path| load_agent_file(&path, source))
        .collect()
}

fn load_agent_file(path: &Path, source: AgentSource) -> Option<AgentDefinition> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("Failed to read agent file {}: {}", path.display(), e);
            return None;
        }
    };
    let file: AgentFile = match toml::from_str(&contents) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!("Skipping invalid agent file {}: {}", path.display(), e);
            return None;
        }
    };
    let stem = path.file_stem()?.to_string_lossy().into_owned();
    Some(file.into_definition(&stem, source, Some(path.to_path_buf())))
}
