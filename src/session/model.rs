//! Model override resolution.
//!
//! A task may ask for a model by free-text pattern. [`ModelCatalog`] turns
//! that pattern into a concrete provider/id pair, trying an exact
//! `provider/id` match first and falling back to a fuzzy match on the id or
//! display name. A trailing `:level` suffix selects a reasoning effort.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Reasoning effort requested alongside a model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    Off,
    Minimal,
    Low,
    Medium,
    High,
    Xhigh,
}

impl FromStr for ThinkingLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "minimal" => Ok(Self::Minimal),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "xhigh" => Ok(Self::Xhigh),
            _ => Err(()),
        }
    }
}

/// A model the host knows how to talk to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub provider: String,
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl ModelInfo {
    pub fn new(provider: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            id: id.into(),
            name: None,
        }
    }
}

impl fmt::Display for ModelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.id)
    }
}

/// Outcome of resolving a model override pattern.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedModel {
    pub model: ModelInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingLevel>,
}

/// Maps a free-text model override to a concrete model.
pub trait ModelResolver: Send + Sync {
    fn resolve(&self, pattern: &str) -> Option<ResolvedModel>;
}

/// In-memory list of available models.
#[derive(Clone, Debug, Default)]
pub struct ModelCatalog {
    models: Vec<ModelInfo>,
}

impl ModelCatalog {
    pub fn new(models: Vec<ModelInfo>) -> Self {
        Self { models }
    }

    pub fn models(&self) -> &[ModelInfo] {
        &self.models
    }

    fn find_exact(&self, provider: &str, id: &str) -> Option<&ModelInfo> {
        self.models.iter().find(|m| {
            m.provider.eq_ignore_ascii_case(provider) && m.id.eq_ignore_ascii_case(id)
        })
    }

    /// Fuzzy lookup: an exact id wins, then the shortest id or name that
    /// contains the pattern (shorter means fewer dated/variant suffixes).
    fn find_fuzzy(&self, pattern: &str) -> Option<&ModelInfo> {
        let needle = pattern.to_ascii_lowercase();

        if let Some(exact) = self
            .models
            .iter()
            .find(|m| m.id.eq_ignore_ascii_case(&needle))
        {
            return Some(exact);
        }

        self.models
            .iter()
            .filter(|m| {
                m.id.to_ascii_lowercase().contains(&needle)
                    || m
                        .name
                        .as_deref()
                        .is_some_and(|n| n.to_ascii_lowercase().contains(&needle))
            })
            .min_by_key(|m| m.id.len())
    }
}

/// Split a trailing `:level` reasoning suffix off a pattern.
///
/// The suffix is only stripped when it names a known level, so ids that
/// contain colons (e.g. `qwen2.5:7b`) pass through untouched.
pub fn split_thinking_suffix(pattern: &str) -> (&str, Option<ThinkingLevel>) {
    if let Some((head, tail)) = pattern.rsplit_once(':') {
        if let Ok(level) = tail.parse::<ThinkingLevel>() {
            return (head, Some(level));
        }
    }
    (pattern, None)
}

impl ModelResolver for ModelCatalog {
    fn resolve(&self, pattern: &str) -> Option<ResolvedModel> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return None;
        }
        let (base, thinking) = split_thinking_suffix(pattern);

        let model = base
            .split_once('/')
            .and_then(|(provider, id)| self.find_exact(provider, id))
            .or_else(|| self.find_fuzzy(base))?;

        Some(ResolvedModel {
            model: model.clone(),
            thinking,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ModelCatalog {
        ModelCatalog::new(vec![
            ModelInfo::new("anthropic", "claude-sonnet-4-5"),
            ModelInfo::new("anthropic", "claude-sonnet-4-5-20250929"),
            ModelInfo::new("openai", "gpt-5"),
            ModelInfo {
                provider: "ollama".into(),
                id: "qwen2.5:7b".into(),
                name: Some("Qwen 2.5 7B".into()),
            },
        ])
    }

    #[test]
    fn exact_provider_id_match() {
        let resolved = catalog().resolve("openai/gpt-5").unwrap();
        assert_eq!(resolved.model.to_string(), "openai/gpt-5");
        assert_eq!(resolved.thinking, None);
    }

    #[test]
    fn fuzzy_match_prefers_shortest_id() {
        let resolved = catalog().resolve("sonnet").unwrap();
        assert_eq!(resolved.model.id, "claude-sonnet-4-5");
    }

    #[test]
    fn thinking_suffix_is_split_off() {
        let resolved = catalog().resolve("sonnet:high").unwrap();
        assert_eq!(resolved.model.id, "claude-sonnet-4-5");
        assert_eq!(resolved.thinking, Some(ThinkingLevel::High));
    }

    #[test]
    fn colon_in_model_id_is_not_a_thinking_level() {
        let resolved = catalog().resolve("qwen2.5:7b").unwrap();
        assert_eq!(resolved.model.id, "qwen2.5:7b");
        assert_eq!(resolved.thinking, None);
    }

    #[test]
    fn matches_display_name() {
        let resolved = catalog().resolve("qwen 2.5").unwrap();
        assert_eq!(resolved.model.provider, "ollama");
    }

    #[test]
    fn unknown_pattern_resolves_to_none() {
        assert!(catalog().resolve("llama-9000").is_none());
        assert!(catalog().resolve("  ").is_none());
    }
}
