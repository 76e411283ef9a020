use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;

use fanout::agent::{AgentResolver, SpawnPolicy, TomlAgentResolver};
use fanout::cli::{Cli, Commands};
use fanout::config::{self, AppConfig};
use fanout::orchestration::artifacts::parse_line_range;
use fanout::orchestration::{BatchRequest, plan_batch, read_output};

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli)?;
    tracing::debug!(cwd = %config.cwd.display(), "Config loaded");

    match &cli.command {
        Commands::Agents => list_agents(&config),
        Commands::Check { batch, .. } => check_batch(&config, batch),
        Commands::Output { id, lines, .. } => print_output(&config, id, lines.as_deref()),
    }
}

fn agent_resolver(config: &AppConfig) -> TomlAgentResolver {
    TomlAgentResolver::new(config.user_agents_dir.clone()).with_inline(config.agents.clone())
}

fn list_agents(config: &AppConfig) -> anyhow::Result<()> {
    let catalog = agent_resolver(config).discover(&config.cwd)?;
    if catalog.agents.is_empty() {
        println!("No agents available.");
        return Ok(());
    }
    for agent in &catalog.agents {
        let tools = match &agent.tools {
            Some(tools) => tools.join(", "),
            None => "all".to_string(),
        };
        println!("{} [{}]", agent.name, agent.source);
        if !agent.description.is_empty() {
            println!("  {}", agent.description);
        }
        println!("  tools: {tools}");
        println!("  spawns: {}", SpawnPolicy::parse(&agent.spawn_policy_string()));
    }
    if let Some(dir) = &catalog.project_agents_dir {
        println!("\nProject agents: {}", dir.display());
    }
    Ok(())
}

fn check_batch(config: &AppConfig, path: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch file {}", path.display()))?;
    let request: BatchRequest = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse batch file {}", path.display()))?;

    let catalog = agent_resolver(config).discover(&config.cwd)?;
    let plan = plan_batch(
        &request,
        &catalog,
        config.orchestrator.max_parallel_tasks,
        &config.spawn_policy,
        config.blocked_agent.as_deref(),
    )
    .map_err(|e| anyhow::anyhow!("{e}"))?;

    println!("Batch OK: {} task(s)", plan.tasks.len());
    if plan.skipped > 0 {
        println!("Skipped {} self-recursive task(s)", plan.skipped);
    }
    for task in &plan.tasks {
        let model = task.model_override.as_deref().unwrap_or("default");
        println!(
            "  #{} {} -> {} (model: {}, output: {})",
            task.index,
            task.id,
            task.agent.name,
            model,
            task.output_id()
        );
    }
    Ok(())
}

fn print_output(config: &AppConfig, id: &str, lines: Option<&str>) -> anyhow::Result<()> {
    let dir: PathBuf = config
        .orchestrator
        .artifacts_dir
        .as_ref()
        .map(|dir| config.cwd.join(dir))
        .context("No artifact directory configured; pass --dir or set orchestration.artifacts_dir")?;

    let range = match lines {
        Some(text) => Some(
            parse_line_range(text)
                .with_context(|| format!("Invalid line range {text:?}; expected start:end"))?,
        ),
        None => None,
    };

    let text = read_output(&dir, id, range)?;
    println!("{text}");
    Ok(())
}
