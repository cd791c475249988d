//! Pipeline engine
//!
//! Drives each run through its declared stage sequence:
//! Pending -> Running -> {Succeeded, Failed, Aborted}. Stages execute
//! strictly in order and a stage never starts before its predecessor is
//! terminal. A failed required stage skips the remainder and fails the
//! run; best-effort stage failures are recorded without failing it.
//! Abort is cooperative at stage boundaries and forced (process kill via
//! the dropped stage future) for an in-flight external command.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::{error, info, warn};
use uuid::Uuid;

use anvil_core::domain::{
    BuildArtifact, PipelineRun, PipelineSpec, ReportSummary, RunStatus, StageKind, StageRecord,
    StageSpec, StageStatus,
};
use anvil_core::dto::{RunView, TriggerRequest};
use anvil_core::EngineError;

use crate::build::BuildExecutor;
use crate::config::{Config, RunnerKind};
use crate::process::{
    check_podman_available, CommandRunner, CommandSpec, ContainerEnvironmentFactory,
    EnvironmentFactory, LocalEnvironmentFactory, LocalRunner,
};
use crate::registry::RunRegistry;
use crate::report;
use crate::repository::RunRepository;
use crate::testrun::TestRunner;
use crate::workspace::{Workspace, WorkspaceManager};

/// Captured output kept on a stage record
const OUTPUT_TAIL_LIMIT: usize = 4096;

/// Single-process CI engine
///
/// Independent runs execute concurrently up to the admission limit; the
/// only state shared between them is the build executor's artifact cache.
pub struct PipelineEngine {
    config: Config,
    exec: Arc<dyn CommandRunner>,
    workspaces: WorkspaceManager,
    builder: BuildExecutor,
    tests: TestRunner,
    registry: RunRegistry,
    repository: RunRepository,
    admission: Semaphore,
}

impl PipelineEngine {
    /// Creates an engine with the backend selected by the configuration
    ///
    /// The container backend is verified up front so a missing runtime
    /// surfaces at startup, not in the middle of a run.
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let exec: Arc<dyn CommandRunner> = Arc::new(LocalRunner::new());
        let environments: Arc<dyn EnvironmentFactory> = match config.runner {
            RunnerKind::Local => Arc::new(LocalEnvironmentFactory),
            RunnerKind::Container => {
                check_podman_available().await?;
                Arc::new(ContainerEnvironmentFactory)
            }
        };
        Self::with_backend(config, exec, environments)
    }

    /// Creates an engine over explicit process and environment backends
    pub fn with_backend(
        config: Config,
        exec: Arc<dyn CommandRunner>,
        environments: Arc<dyn EnvironmentFactory>,
    ) -> anyhow::Result<Arc<Self>> {
        config.validate()?;
        let repository = RunRepository::new(&config.state_dir)?;
        Ok(Arc::new(Self {
            workspaces: WorkspaceManager::new(config.workspace_root.clone(), exec.clone()),
            builder: BuildExecutor::new(exec.clone()),
            tests: TestRunner::new(environments),
            registry: RunRegistry::new(),
            repository,
            admission: Semaphore::new(config.max_concurrent_runs),
            exec,
            config,
        }))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Triggers a new pipeline run and returns its id immediately
    ///
    /// The run executes on a background task; completion is observed via
    /// [`wait`](Self::wait) or [`status`](Self::status).
    pub fn trigger(self: &Arc<Self>, request: TriggerRequest) -> Result<Uuid, EngineError> {
        // Configured defaults apply where the trigger does not override.
        let stage_timeout_overridden = request.overrides.stage_timeout.is_some();
        let run_timeout_overridden = request.overrides.run_timeout.is_some();
        let mut spec = request.into_spec();
        if !stage_timeout_overridden {
            spec = spec.with_stage_timeout(self.config.stage_timeout);
        }
        if !run_timeout_overridden {
            spec = spec.with_run_timeout(self.config.run_timeout);
        }
        spec.validate()
            .map_err(|e| EngineError::Internal(format!("invalid pipeline: {}", e)))?;

        let mut run = PipelineRun::new(&spec.repo, &spec.revision);
        run.stages = spec
            .stages
            .iter()
            .map(|s| StageRecord::pending(&s.name))
            .collect();
        let id = run.id;

        let abort_rx = self.registry.insert(run);
        let engine = Arc::clone(self);
        let revision = spec.revision.clone();
        tokio::spawn(async move {
            engine.execute(id, spec, abort_rx).await;
        });

        info!("Triggered run {} for revision {}", id, revision);
        Ok(id)
    }

    /// Signals a live run to abort
    ///
    /// In-flight external processes are killed; the run terminates with
    /// status Aborted. Returns false for unknown or already-terminal runs.
    pub fn abort(&self, id: Uuid) -> bool {
        self.registry.abort(id)
    }

    /// Current view of a run, live or persisted
    pub fn status(&self, id: Uuid) -> Result<Option<RunView>, EngineError> {
        if let Some(run) = self.registry.get(id) {
            return Ok(Some(RunView::from(&run)));
        }
        Ok(self.repository.load(id)?.map(|r| RunView::from(&r)))
    }

    /// All known runs, newest first
    pub fn list(&self) -> Result<Vec<RunView>, EngineError> {
        let mut seen = HashSet::new();
        let mut views = Vec::new();
        for id in self.registry.live_ids() {
            if let Some(run) = self.registry.get(id) {
                seen.insert(run.id);
                views.push(RunView::from(&run));
            }
        }
        for run in self.repository.list()? {
            if seen.insert(run.id) {
                views.push(RunView::from(&run));
            }
        }
        views.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(views)
    }

    /// Removes persisted records older than the retention window
    pub fn purge(&self, retention: Duration) -> Result<usize, EngineError> {
        self.repository.purge_older_than(retention)
    }

    /// Waits until a run reaches a terminal status and returns its view
    pub async fn wait(&self, id: Uuid) -> Result<RunView, EngineError> {
        loop {
            if let Some(mut rx) = self.registry.watch_status(id) {
                if !rx.borrow_and_update().is_terminal() {
                    // A closed channel means the run left the registry;
                    // fall through to the repository.
                    if rx.changed().await.is_ok() {
                        continue;
                    }
                } else if let Some(run) = self.registry.get(id) {
                    return Ok(RunView::from(&run));
                }
            }
            match self.repository.load(id)? {
                Some(run) => return Ok(RunView::from(&run)),
                None => {
                    // Triggered but not yet registered is impossible (insert
                    // happens before trigger returns), so this id is unknown.
                    return Err(EngineError::Internal(format!("unknown run {}", id)));
                }
            }
        }
    }

    async fn execute(
        self: Arc<Self>,
        id: Uuid,
        spec: PipelineSpec,
        mut abort_rx: watch::Receiver<bool>,
    ) {
        // An abort must terminate the run even while it is still queued
        // behind the admission limit.
        let _permit = tokio::select! {
            permit = self.admission.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
            _ = wait_for_abort(&mut abort_rx) => {
                warn!("Run {} aborted while queued for admission", id);
                self.finish_queued_aborted(id);
                return;
            }
        };

        self.registry.update(id, |r| {
            r.status = RunStatus::Running;
            r.started_at = Some(chrono::Utc::now());
        });
        info!("Run {} started", id);

        let status = match tokio::time::timeout(
            spec.run_timeout,
            self.run_stages(id, &spec, &mut abort_rx),
        )
        .await
        {
            Ok(status) => status,
            Err(_) => {
                warn!(
                    "Run {} exceeded overall timeout of {:?}; aborting",
                    id, spec.run_timeout
                );
                RunStatus::Aborted
            }
        };

        let run = self.registry.update(id, |r| {
            r.status = status;
            r.finished_at = Some(chrono::Utc::now());
            // Covers stages cut off by the overall timeout.
            for stage in &mut r.stages {
                if !stage.status.is_terminal() {
                    stage.status = StageStatus::Aborted;
                    stage.finished_at = Some(chrono::Utc::now());
                }
            }
        });

        if let Some(run) = &run {
            if let Err(e) = self.repository.save(run) {
                error!("Failed to persist run {}: {}", id, e);
            }
        }
        self.registry.remove(id);
        info!("Run {} finished with status {}", id, status);
    }

    async fn run_stages(
        &self,
        id: Uuid,
        spec: &PipelineSpec,
        abort_rx: &mut watch::Receiver<bool>,
    ) -> RunStatus {
        let mut ctx = StageContext::default();
        let mut failed = false;
        let mut aborted = false;

        for stage in &spec.stages {
            if aborted || failed {
                self.update_stage(id, &stage.name, |s| {
                    s.status = StageStatus::Skipped;
                });
                continue;
            }

            // Cooperative abort at the stage boundary.
            if *abort_rx.borrow_and_update() {
                aborted = true;
                self.update_stage(id, &stage.name, |s| {
                    s.status = StageStatus::Skipped;
                });
                continue;
            }

            self.update_stage(id, &stage.name, |s| {
                s.status = StageStatus::Running;
                s.started_at = Some(chrono::Utc::now());
            });
            info!("Run {}: stage '{}' started", id, stage.name);

            let fut = self.execute_stage(id, stage, spec, &mut ctx);
            tokio::pin!(fut);
            let outcome = tokio::select! {
                res = &mut fut => Some(res),
                _ = wait_for_abort(abort_rx) => None,
            };

            match outcome {
                // Dropping the stage future killed any in-flight child.
                None => {
                    aborted = true;
                    self.update_stage(id, &stage.name, |s| {
                        s.status = StageStatus::Aborted;
                        s.finished_at = Some(chrono::Utc::now());
                        s.error = Some("run aborted".to_string());
                    });
                    warn!("Run {}: stage '{}' aborted", id, stage.name);
                }
                Some(Ok(result)) => {
                    let stage_ok = result.success;
                    self.finish_stage(id, &stage.name, result);
                    if !stage_ok {
                        if stage.best_effort {
                            warn!(
                                "Run {}: best-effort stage '{}' failed; continuing",
                                id, stage.name
                            );
                        } else {
                            failed = true;
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!("Run {}: stage '{}' failed: {}", id, stage.name, e);
                    self.update_stage(id, &stage.name, |s| {
                        s.status = StageStatus::Failed;
                        s.finished_at = Some(chrono::Utc::now());
                        s.error = Some(e.to_string());
                    });
                    if !stage.best_effort {
                        failed = true;
                    }
                }
            }
        }

        if aborted {
            RunStatus::Aborted
        } else if failed {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        }
    }

    async fn execute_stage(
        &self,
        id: Uuid,
        stage: &StageSpec,
        spec: &PipelineSpec,
        ctx: &mut StageContext,
    ) -> Result<StageResult, EngineError> {
        match &stage.kind {
            StageKind::Checkout => {
                let workspace = self
                    .workspaces
                    .checkout(&spec.repo, &spec.revision, id, stage.timeout)
                    .await?;
                ctx.workspace = Some(workspace);
                Ok(StageResult::succeeded())
            }
            StageKind::Build => {
                let workspace = ctx.workspace.as_ref().ok_or_else(|| {
                    EngineError::Internal("build stage requires a checked-out workspace".to_string())
                })?;
                let artifact = self
                    .builder
                    .build(workspace.path(), &spec.build_file, stage.timeout)
                    .await?;
                let image = artifact.image.clone();
                ctx.artifact = Some(artifact);
                Ok(StageResult {
                    output_tail: Some(image),
                    ..StageResult::succeeded()
                })
            }
            StageKind::Test => {
                let workspace = ctx.workspace.as_ref().ok_or_else(|| {
                    EngineError::Internal("test stage requires a checked-out workspace".to_string())
                })?;
                let artifact = ctx.artifact.as_ref().ok_or_else(|| {
                    EngineError::Internal("test stage requires a built artifact".to_string())
                })?;

                let test_run = self
                    .tests
                    .run(artifact, workspace.path(), &spec.test_command, stage.timeout)
                    .await?;
                let summary = report::summarize(&test_run.report);
                let success = test_run.suite_passed();
                Ok(StageResult {
                    success,
                    output_tail: Some(tail(&test_run.output.stdout, OUTPUT_TAIL_LIMIT)),
                    error: (!success).then(|| {
                        format!("test suite exited with code {}", test_run.output.exit_code)
                    }),
                    summary: Some(summary),
                })
            }
            StageKind::Custom { command } => {
                let mut cmd = CommandSpec::shell(command).timeout(stage.timeout);
                if let Some(workspace) = &ctx.workspace {
                    cmd = cmd.cwd(workspace.path());
                }
                let out = self
                    .exec
                    .run(&cmd)
                    .await
                    .map_err(|e| e.into_engine_error())?;
                let success = out.success();
                Ok(StageResult {
                    success,
                    output_tail: Some(tail(
                        &format!("{}{}", out.stdout, out.stderr),
                        OUTPUT_TAIL_LIMIT,
                    )),
                    error: (!success).then(|| format!("command exited with code {}", out.exit_code)),
                    summary: None,
                })
            }
        }
    }

    /// Finalizes a run that was aborted before it acquired a permit
    fn finish_queued_aborted(&self, id: Uuid) {
        let run = self.registry.update(id, |r| {
            r.status = RunStatus::Aborted;
            r.finished_at = Some(chrono::Utc::now());
            for stage in &mut r.stages {
                stage.status = StageStatus::Skipped;
            }
        });
        if let Some(run) = &run {
            if let Err(e) = self.repository.save(run) {
                error!("Failed to persist run {}: {}", id, e);
            }
        }
        self.registry.remove(id);
        info!("Run {} finished with status {}", id, RunStatus::Aborted);
    }

    fn update_stage<F>(&self, id: Uuid, name: &str, f: F)
    where
        F: FnOnce(&mut StageRecord),
    {
        self.registry.update(id, |run| {
            if let Some(stage) = run.stages.iter_mut().find(|s| s.name == name) {
                f(stage);
            }
        });
    }

    fn finish_stage(&self, id: Uuid, name: &str, result: StageResult) {
        self.registry.update(id, |run| {
            if let Some(summary) = result.summary.clone() {
                run.summary = Some(summary);
            }
            if let Some(stage) = run.stages.iter_mut().find(|s| s.name == name) {
                stage.status = if result.success {
                    StageStatus::Succeeded
                } else {
                    StageStatus::Failed
                };
                stage.finished_at = Some(chrono::Utc::now());
                stage.output_tail = result.output_tail.clone();
                stage.error = result.error.clone();
            }
        });
    }
}

/// Artifacts a stage hands to its successors
///
/// Dropping the context releases the workspace directory, including when
/// the run is aborted or times out mid-stage.
#[derive(Default)]
struct StageContext {
    workspace: Option<Workspace>,
    artifact: Option<BuildArtifact>,
}

struct StageResult {
    success: bool,
    output_tail: Option<String>,
    error: Option<String>,
    summary: Option<ReportSummary>,
}

impl StageResult {
    fn succeeded() -> Self {
        Self {
            success: true,
            output_tail: None,
            error: None,
            summary: None,
        }
    }
}

/// Resolves when the abort flag becomes set; never resolves otherwise
async fn wait_for_abort(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Last `limit` bytes of a string, respecting char boundaries
fn tail(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        return s.to_string();
    }
    let mut start = s.len() - limit;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    s[start..].to_string()
}
