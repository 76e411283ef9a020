//! Subagent orchestration subsystem.
//!
//! [`Orchestrator`] validates a batch of delegated tasks, schedules them over
//! isolated execution units with a concurrency cap, merges their live
//! progress, and summarizes the results. Each task is run by
//! [`executor::run_subagent`], which owns that task's progress and artifacts.

pub mod artifacts;
pub mod executor;
pub mod handlers;
pub mod orchestrator;
pub mod progress;
pub mod scheduler;
pub mod summary;
pub mod truncate;
pub mod types;

pub use artifacts::{ArtifactStore, read_output};
pub use handlers::{SubmitResultHandler, ToolHandlerRegistry, ToolResultHandler};
pub use orchestrator::{BatchPlan, Orchestrator, RunContext, plan_batch};
pub use scheduler::map_with_concurrency_limit;
pub use types::*;
