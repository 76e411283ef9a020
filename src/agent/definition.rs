//! Agent definitions: the roles a batch can delegate to.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where a definition was loaded from. Later sources override earlier ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentSource {
    Builtin,
    User,
    Project,
}

impl fmt::Display for AgentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentSource::Builtin => "builtin",
            AgentSource::User => "user",
            AgentSource::Project => "project",
        };
        f.write_str(s)
    }
}

/// Which agents an agent may itself delegate to.
///
/// Absent (`None` on the definition) means it may delegate to nobody.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Spawns {
    /// The string `"*"`.
    All(AllMarker),
    List(Vec<String>),
}

/// Serde helper that only accepts the literal `"*"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllMarker;

impl Serialize for AllMarker {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("*")
    }
}

impl<'de> Deserialize<'de> for AllMarker {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s == "*" {
            Ok(AllMarker)
        } else {
            Err(serde::de::Error::custom("expected \"*\" or a list of agent names"))
        }
    }
}

impl Spawns {
    pub fn all() -> Self {
        Spawns::All(AllMarker)
    }

    /// Render as a spawn policy string for a nested orchestrator.
    pub fn to_policy_string(&self) -> String {
        match self {
            Spawns::All(_) => "*".to_string(),
            Spawns::List(names) => names.join(","),
        }
    }
}

/// Immutable description of a delegatable role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawns: Option<Spawns>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub source: AgentSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
}

/// Name of the delegation tool; stripped from agents that may not spawn.
pub const DELEGATION_TOOL: &str = "task";

impl AgentDefinition {
    /// Tool allow-list to hand the session, with the delegation tool removed
    /// when this agent has no spawn rights.
    pub fn effective_tools(&self) -> Option<Vec<String>> {
        let tools = self.tools.as_ref()?;
        if self.spawns.is_some() {
            return Some(tools.clone());
        }
        Some(
            tools
                .iter()
                .filter(|t| t.as_str() != DELEGATION_TOOL)
                .cloned()
                .collect(),
        )
    }

    /// Spawn policy string passed to the unit; empty means deny all.
    pub fn spawn_policy_string(&self) -> String {
        self.spawns
            .as_ref()
            .map(Spawns::to_policy_string)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(tools: Option<Vec<&str>>, spawns: Option<Spawns>) -> AgentDefinition {
        AgentDefinition {
            name: "worker".into(),
            description: "d".into(),
            system_prompt: "p".into(),
            tools: tools.map(|t| t.into_iter().map(String::from).collect()),
            spawns,
            model: None,
            source: AgentSource::Builtin,
            file_path: None,
        }
    }

    #[test]
    fn delegation_tool_removed_without_spawns() {
        let d = def(Some(vec!["read", "task", "bash"]), None);
        assert_eq!(
            d.effective_tools().unwrap(),
            vec!["read".to_string(), "bash".to_string()]
        );
        assert_eq!(d.spawn_policy_string(), "");
    }

    #[test]
    fn delegation_tool_kept_with_spawns() {
        let d = def(Some(vec!["read", "task"]), Some(Spawns::List(vec!["explore".into()])));
        assert_eq!(d.effective_tools().unwrap().len(), 2);
        assert_eq!(d.spawn_policy_string(), "explore");
    }

    #[test]
    fn no_tool_list_means_factory_defaults() {
        assert!(def(None, None).effective_tools().is_none());
    }

    #[test]
    fn spawns_parses_star_and_list() {
        let all: Spawns = serde_json::from_str("\"*\"").unwrap();
        assert_eq!(all, Spawns::all());
        let list: Spawns = serde_json::from_str("[\"a\",\"b\"]").unwrap();
        assert_eq!(list.to_policy_string(), "a,b");
        assert!(serde_json::from_str::<Spawns>("\"a\"").is_err());
    }
}
