//! Batch entry point: validate, schedule, merge progress, summarize.
//!
//! [`Orchestrator::run`] is the only public way to execute a batch. It never
//! returns an error: validation failures, per-task failures and even a panic
//! inside the execution phase all end up as a [`TaskOutcome`] whose content is
//! the caller-visible message.

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::FutureExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use super::artifacts::ArtifactStore;
use super::executor::{ExecutorContext, SubagentTask, TaskProgressFn, failed_result, run_subagent};
use super::handlers::ToolHandlerRegistry;
use super::scheduler::{map_with_concurrency_limit, panic_message};
use super::summary::summarize;
use super::types::{
    AgentProgress, BatchRequest, BusEvent, ProgressCallback, SingleResult, TaskDetails, TaskItem,
    TaskOutcome,
};
use crate::agent::system_prompt::render_task_prompt;
use crate::agent::{AgentCatalog, AgentResolver, SpawnPolicy};
use crate::config::OrchestratorConfig;
use crate::error::ValidationError;
use crate::session::Usage;
use crate::worker::UnitRuntime;

/// Per-call inputs that come from the calling agent rather than from config.
#[derive(Clone)]
pub struct RunContext {
    pub cwd: PathBuf,
    pub cancel: CancellationToken,
    /// Spawn policy of the calling agent: `""`, `"*"`, or a comma list.
    pub spawn_policy: String,
    /// The calling agent's own name; tasks targeting it are skipped.
    pub blocked_agent: Option<String>,
    /// Directory for persisted subagent sessions.
    pub session_dir: Option<PathBuf>,
    /// Opaque host settings handed to every session.
    pub settings: Option<serde_json::Value>,
    pub on_progress: Option<ProgressCallback>,
    pub events: Option<UnboundedSender<BusEvent>>,
}

impl RunContext {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            cancel: CancellationToken::new(),
            spawn_policy: "*".to_string(),
            blocked_agent: None,
            session_dir: None,
            settings: None,
            on_progress: None,
            events: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_spawn_policy(mut self, policy: impl Into<String>) -> Self {
        self.spawn_policy = policy.into();
        self
    }

    pub fn with_blocked_agent(mut self, agent: impl Into<String>) -> Self {
        self.blocked_agent = Some(agent.into());
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    pub fn with_events(mut self, events: UnboundedSender<BusEvent>) -> Self {
        self.events = Some(events);
        self
    }
}

/// A validated batch, ready to schedule.
#[derive(Clone, Debug)]
pub struct BatchPlan {
    pub tasks: Vec<SubagentTask>,
    /// Tasks removed by the self-recursion guard.
    pub skipped: usize,
}

pub struct Orchestrator {
    config: Arc<OrchestratorConfig>,
    agents: Arc<dyn AgentResolver>,
    runtime: UnitRuntime,
    handlers: ToolHandlerRegistry,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        agents: Arc<dyn AgentResolver>,
        runtime: UnitRuntime,
    ) -> Self {
        Self {
            config: Arc::new(config),
            agents,
            runtime,
            handlers: ToolHandlerRegistry::with_defaults(),
        }
    }

    pub fn with_handlers(mut self, handlers: ToolHandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn discover(&self, cwd: &Path) -> anyhow::Result<AgentCatalog> {
        self.agents.discover(cwd)
    }

    /// Check a batch against the catalog and the caller's policies.
    pub fn plan(
        &self,
        request: &BatchRequest,
        catalog: &AgentCatalog,
        spawn_policy: &str,
        blocked_agent: Option<&str>,
    ) -> Result<BatchPlan, ValidationError> {
        plan_batch(
            request,
            catalog,
            self.config.max_parallel_tasks,
            spawn_policy,
            blocked_agent,
        )
    }

    /// Validate and execute a batch.
    pub async fn run(&self, request: BatchRequest, ctx: RunContext) -> TaskOutcome {
        let catalog = match self.agents.discover(&ctx.cwd) {
            Ok(catalog) => catalog,
            Err(e) => return TaskOutcome::message(format!("Failed to discover agents: {e:#}")),
        };

        let plan = match self.plan(
            &request,
            &catalog,
            &ctx.spawn_policy,
            ctx.blocked_agent.as_deref(),
        ) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::info!("batch rejected: {}", e);
                let mut outcome = TaskOutcome::message(e.to_string());
                outcome.details.project_agents_dir = catalog.project_agents_dir;
                return outcome;
            }
        };

        let artifacts = match &self.config.artifacts_dir {
            Some(dir) => ArtifactStore::persistent(ctx.cwd.join(dir)),
            None => ArtifactStore::temporary(),
        };

        let mut outcome = self.execute(plan, &artifacts, ctx).await;
        outcome.details.project_agents_dir = catalog.project_agents_dir;

        artifacts.cleanup().await;
        outcome
    }

    async fn execute(&self, plan: BatchPlan, artifacts: &ArtifactStore, ctx: RunContext) -> TaskOutcome {
        let started = Instant::now();
        let BatchPlan { tasks, skipped } = plan;
        tracing::info!(tasks = tasks.len(), skipped, "running batch");

        let merged = Arc::new(Mutex::new(
            tasks.iter().map(SubagentTask::pending_progress).collect::<Vec<_>>(),
        ));
        if let Some(callback) = &ctx.on_progress {
            callback(lock(&merged).as_slice());
        }

        // Merge and delivery happen under one guard so snapshots reach the
        // caller in the order they were merged.
        let on_progress = ctx.on_progress.clone().map(|callback| {
            let merged = Arc::clone(&merged);
            Arc::new(move |progress: &AgentProgress| {
                let mut all = lock(&merged);
                if let Some(slot) = all.get_mut(progress.index) {
                    *slot = progress.clone();
                }
                callback(all.as_slice());
            }) as TaskProgressFn
        });

        let exec = ExecutorContext {
            runtime: self.runtime.clone(),
            config: Arc::clone(&self.config),
            handlers: self.handlers.clone(),
            artifacts: Some(artifacts.clone()),
            cancel: ctx.cancel.clone(),
            cwd: ctx.cwd.clone(),
            session_dir: ctx.session_dir.clone(),
            settings: ctx.settings.clone(),
            on_progress,
            events: ctx.events.clone(),
        };

        let scheduled = tasks.clone();
        let run = map_with_concurrency_limit(scheduled, self.config.max_concurrency, move |_, task| {
            run_subagent(exec.clone(), task)
        });

        let (mut results, failure) = match AssertUnwindSafe(run).catch_unwind().await {
            Ok(results) => {
                let results: Vec<SingleResult> = results
                    .into_iter()
                    .zip(&tasks)
                    .map(|(result, task)| {
                        result.unwrap_or_else(|e| failed_result(task, e.to_string()))
                    })
                    .collect();
                (results, None)
            }
            Err(payload) => {
                let message = panic_message(payload);
                tracing::warn!(%message, "batch execution panicked");
                let results = tasks
                    .iter()
                    .map(|task| failed_result(task, format!("Batch execution failed: {message}")))
                    .collect();
                (results, Some(message))
            }
        };

        if artifacts.is_temporary() {
            for result in &mut results {
                result.artifacts = None;
            }
        }

        let usage = total_usage(&results);
        let output_paths = results
            .iter()
            .filter_map(|r| r.artifacts.as_ref().map(|a| a.output.clone()))
            .collect();

        let mut content = summarize(&results, skipped);
        if let Some(message) = failure {
            content = format!("Batch execution failed: {message}\n\n{content}");
        }

        tracing::info!(
            succeeded = results.iter().filter(|r| r.succeeded()).count(),
            total = results.len(),
            "batch finished"
        );

        TaskOutcome {
            content,
            details: TaskDetails {
                results,
                total_duration_ms: started.elapsed().as_millis() as u64,
                usage,
                output_paths,
                skipped,
                project_agents_dir: None,
            },
        }
    }
}

/// Check a batch against an agent catalog and the caller's policies.
///
/// Checks run in a fixed order and stop at the first failure. Task
/// indices are assigned after the self-recursion filter.
pub fn plan_batch(
    request: &BatchRequest,
    catalog: &AgentCatalog,
    max_parallel_tasks: usize,
    spawn_policy: &str,
    blocked_agent: Option<&str>,
) -> Result<BatchPlan, ValidationError> {
    if request.tasks.is_empty() {
        return Err(ValidationError::EmptyBatch {
            available: catalog.names(),
        });
    }

    let max = max_parallel_tasks;
    if request.tasks.len() > max {
        return Err(ValidationError::TooManyTasks {
            count: request.tasks.len(),
            max,
        });
    }

    let agent_of = |item: &TaskItem| -> String {
        item.agent.clone().unwrap_or_else(|| request.agent.clone())
    };

    let mut kept = Vec::with_capacity(request.tasks.len());
    let mut skipped = 0;
    for item in &request.tasks {
        let agent = agent_of(item);
        if blocked_agent == Some(agent.as_str()) {
            skipped += 1;
        } else {
            kept.push((item, agent));
        }
    }
    if kept.is_empty() {
        return Err(ValidationError::RecursionBlocked {
            agent: blocked_agent.unwrap_or(&request.agent).to_string(),
        });
    }
    if skipped > 0 {
        tracing::info!(skipped, "skipping self-recursive tasks");
    }

    let mut resolved = Vec::with_capacity(kept.len());
    for (item, agent_name) in kept {
        let Some(agent) = catalog.get(&agent_name) else {
            return Err(ValidationError::UnknownAgent {
                agent: agent_name,
                available: catalog.names(),
            });
        };
        resolved.push((item, agent));
    }

    let policy = SpawnPolicy::parse(spawn_policy);
    if let Some((_, denied)) = resolved
        .iter()
        .find(|(_, agent)| !policy.is_spawn_allowed(&agent.name))
    {
        return Err(ValidationError::SpawnNotPermitted {
            agent: denied.name.clone(),
            allowed: policy.to_string(),
        });
    }

    let mut tasks = Vec::with_capacity(resolved.len());
    for (index, (item, agent)) in resolved.into_iter().enumerate() {
        tasks.push(SubagentTask {
            index,
            id: item.id.clone(),
            agent: agent.clone(),
            task: item.task.clone(),
            prompt: render_task_prompt(
                &request.context,
                &item.task,
                request.output_schema.as_ref(),
            ),
            description: item.description.clone(),
            model_override: item.model.clone().or_else(|| request.model.clone()),
        });
    }

    Ok(BatchPlan { tasks, skipped })
}

/// Sum of the usage of every task that reported some.
fn total_usage(results: &[SingleResult]) -> Option<Usage> {
    let reported: Vec<&Usage> = results.iter().filter_map(|r| r.usage.as_ref()).collect();
    if reported.is_empty() {
        None
    } else {
        Some(reported.into_iter().sum())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentDefinition, AgentSource, Spawns, StaticAgentResolver};
    use crate::session::{AgentSession, ModelCatalog, SessionFactory, SessionOptions};
    use async_trait::async_trait;

    struct NoSessions;

    #[async_trait]
    impl SessionFactory for NoSessions {
        async fn create(&self, _options: SessionOptions) -> anyhow::Result<Arc<dyn AgentSession>> {
            anyhow::bail!("no sessions in planning tests")
        }
    }

    fn agent(name: &str) -> AgentDefinition {
        AgentDefinition {
            name: name.into(),
            description: format!("{name} agent"),
            system_prompt: String::new(),
            tools: None,
            spawns: Some(Spawns::all()),
            model: None,
            source: AgentSource::Builtin,
            file_path: None,
        }
    }

    fn orchestrator(max_parallel_tasks: usize) -> (Orchestrator, AgentCatalog) {
        let agents = vec![agent("explore"), agent("task")];
        let catalog = AgentCatalog {
            agents: agents.clone(),
            project_agents_dir: None,
        };
        let runtime = UnitRuntime::new(Arc::new(NoSessions), Arc::new(ModelCatalog::new(Vec::new())));
        let config = OrchestratorConfig {
            max_parallel_tasks,
            ..Default::default()
        };
        let orch = Orchestrator::new(config, Arc::new(StaticAgentResolver::new(agents)), runtime);
        (orch, catalog)
    }

    fn item(id: &str, agent: Option<&str>) -> TaskItem {
        TaskItem {
            id: id.into(),
            task: format!("do {id}"),
            description: String::new(),
            model: None,
            agent: agent.map(String::from),
        }
    }

    fn batch(agent: &str, tasks: Vec<TaskItem>) -> BatchRequest {
        BatchRequest {
            agent: agent.into(),
            context: "shared".into(),
            tasks,
            model: None,
            output_schema: None,
        }
    }

    #[test]
    fn empty_batch_lists_agents() {
        let (orch, catalog) = orchestrator(32);
        let err = orch.plan(&batch("explore", vec![]), &catalog, "*", None).unwrap_err();
        assert!(err.to_string().contains("explore, task"));
    }

    #[test]
    fn oversized_batch_is_rejected() {
        let (orch, catalog) = orchestrator(2);
        let tasks = (0..3).map(|i| item(&format!("t{i}"), None)).collect();
        let err = orch.plan(&batch("explore", tasks), &catalog, "*", None).unwrap_err();
        assert_eq!(err, ValidationError::TooManyTasks { count: 3, max: 2 });
    }

    #[test]
    fn self_recursive_tasks_are_skipped_and_reindexed() {
        let (orch, catalog) = orchestrator(32);
        let tasks = vec![
            item("a", Some("task")),
            item("b", Some("explore")),
            item("c", Some("task")),
            item("d", Some("explore")),
        ];
        let plan = orch
            .plan(&batch("explore", tasks), &catalog, "*", Some("task"))
            .unwrap();
        assert_eq!(plan.skipped, 2);
        let ids: Vec<(usize, &str)> = plan.tasks.iter().map(|t| (t.index, t.id.as_str())).collect();
        assert_eq!(ids, vec![(0, "b"), (1, "d")]);
    }

    #[test]
    fn fully_recursive_batch_is_rejected() {
        let (orch, catalog) = orchestrator(32);
        let err = orch
            .plan(&batch("task", vec![item("a", None)]), &catalog, "*", Some("task"))
            .unwrap_err();
        assert!(matches!(err, ValidationError::RecursionBlocked { .. }));
    }

    #[test]
    fn spawn_policy_violation_shows_allow_list() {
        let (orch, catalog) = orchestrator(32);
        let err = orch
            .plan(&batch("task", vec![item("a", None)]), &catalog, "explore", None)
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot spawn 'task'. Allowed: explore");

        let err = orch
            .plan(&batch("task", vec![item("a", None)]), &catalog, "", None)
            .unwrap_err();
        assert!(err.to_string().contains("none (spawns disabled"));
    }

    #[test]
    fn plan_composes_prompts_and_models() {
        let (orch, catalog) = orchestrator(32);
        let mut request = batch("explore", vec![item("a", None)]);
        request.model = Some("sonnet".into());
        let plan = orch.plan(&request, &catalog, "*", None).unwrap();
        let task = &plan.tasks[0];
        assert_eq!(task.prompt, "## Context\n\nshared\n\n## Task\n\ndo a");
        assert_eq!(task.model_override.as_deref(), Some("sonnet"));
        assert_eq!(task.output_id(), "explore_0");
    }
}
