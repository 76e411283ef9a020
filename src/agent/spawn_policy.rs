//! Parent spawn policy: which agents the caller may delegate to.

use std::fmt;

/// Parsed form of a spawn policy string.
///
/// - `""` denies everything
/// - `"*"` allows everything
/// - anything else is a comma-separated allow-list
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SpawnPolicy {
    DenyAll,
    #[default]
    AllowAll,
    AllowList(Vec<String>),
}

impl SpawnPolicy {
    pub fn parse(policy: &str) -> Self {
        let trimmed = policy.trim();
        if trimmed.is_empty() {
            return SpawnPolicy::DenyAll;
        }
        if trimmed == "*" {
            return SpawnPolicy::AllowAll;
        }
        let names: Vec<String> = trimmed
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if names.is_empty() {
            SpawnPolicy::DenyAll
        } else {
            SpawnPolicy::AllowList(names)
        }
    }

    pub fn is_spawn_allowed(&self, agent: &str) -> bool {
        match self {
            SpawnPolicy::DenyAll => false,
            SpawnPolicy::AllowAll => true,
            SpawnPolicy::AllowList(names) => names.iter().any(|n| n == agent),
        }
    }
}

impl fmt::Display for SpawnPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnPolicy::DenyAll => f.write_str("none (spawns disabled for this agent)"),
            SpawnPolicy::AllowAll => f.write_str("*"),
            SpawnPolicy::AllowList(names) => f.write_str(&names.join(", ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_policy_denies() {
        let policy = SpawnPolicy::parse("");
        assert!(!policy.is_spawn_allowed("x"));
        assert!(!SpawnPolicy::parse("  , ").is_spawn_allowed("x"));
    }

    #[test]
    fn star_allows_any() {
        let policy = SpawnPolicy::parse("*");
        assert!(policy.is_spawn_allowed("x"));
        assert!(policy.is_spawn_allowed("anything-else"));
    }

    #[test]
    fn list_is_trimmed_and_exact() {
        let policy = SpawnPolicy::parse("explore, task");
        assert!(policy.is_spawn_allowed("explore"));
        assert!(policy.is_spawn_allowed("task"));
        assert!(!policy.is_spawn_allowed("tas"));
        assert_eq!(policy.to_string(), "explore, task");
    }

    proptest! {
        #[test]
        fn allow_list_membership(
            names in prop::collection::vec("[a-z]{1,8}", 1..6),
            probe in "[a-z]{1,8}",
        ) {
            let policy = SpawnPolicy::parse(&names.join(","));
            prop_assert_eq!(policy.is_spawn_allowed(&probe), names.contains(&probe));
        }
    }
}
