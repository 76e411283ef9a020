//! Agent roles: definitions, discovery, spawn policy, and prompt composition.

pub mod definition;
pub mod discovery;
pub mod spawn_policy;
pub mod system_prompt;

pub use definition::{AgentDefinition, AgentSource, Spawns};
pub use discovery::{AgentCatalog, AgentResolver, StaticAgentResolver, TomlAgentResolver};
pub use spawn_policy::SpawnPolicy;
