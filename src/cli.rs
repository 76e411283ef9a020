use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fanout", version, about = "Subagent orchestration engine")]
pub struct Cli {
    /// Working directory used for agent discovery and task execution
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Path to config file (overrides default search)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the agents available for delegation
    Agents,
    /// Validate a batch file without running it
    Check {
        /// JSON file containing `{ agent, context, tasks: [...] }`
        batch: PathBuf,

        /// Maximum tasks allowed in one batch
        #[arg(long)]
        max_parallel_tasks: Option<usize>,

        /// Spawn policy of the calling agent ("", "*", or a comma list)
        #[arg(long)]
        spawns: Option<String>,

        /// Agent that may not be spawned (prevents self-recursion)
        #[arg(long)]
        blocked_agent: Option<String>,
    },
    /// Print a stored task output by its id (e.g. "explore_0")
    Output {
        /// Output id of the form <agent>_<index>
        id: String,

        /// Artifact directory (defaults to the configured one)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// 1-based inclusive line range, e.g. "10:40"
        #[arg(long)]
        lines: Option<String>,
    },
}
