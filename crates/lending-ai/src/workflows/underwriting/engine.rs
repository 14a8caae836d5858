use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time;
use tracing::{info, warn};

use super::checkpoint::{CheckpointError, CheckpointStore};
use super::domain::{
    LoanSubmission, StageOutput, SuppliedInput, ThreadId, WorkflowStage, WorkflowStatus,
};
use super::routing::RoutingTable;
use super::stage::{StageCollaborator, StageError};
use super::state::{ApplicationState, StateError};
use crate::config::EngineConfig;

/// Execution knobs for stage runs.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Wall-clock budget for a single collaborator attempt.
    pub stage_timeout: Duration,
    /// Attempts per stage run before the workflow fails terminally.
    pub max_stage_attempts: u32,
    /// Base delay between attempts, doubled after each transient failure.
    pub retry_backoff: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(300),
            max_stage_attempts: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl From<&EngineConfig> for EngineSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            stage_timeout: Duration::from_secs(config.stage_timeout_secs),
            max_stage_attempts: config.max_stage_attempts,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// Stage-to-collaborator wiring assembled at startup.
#[derive(Default)]
pub struct StageRegistry {
    collaborators: BTreeMap<WorkflowStage, Arc<dyn StageCollaborator>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        stage: WorkflowStage,
        collaborator: Arc<dyn StageCollaborator>,
    ) -> Self {
        self.collaborators.insert(stage, collaborator);
        self
    }

    fn get(&self, stage: WorkflowStage) -> Option<&Arc<dyn StageCollaborator>> {
        self.collaborators.get(&stage)
    }
}

/// Error raised by the orchestration engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("workflow {0} not found")]
    NotFound(ThreadId),
    #[error("no collaborator registered for stage {}", .0.label())]
    StageNotRegistered(WorkflowStage),
    #[error(transparent)]
    State(#[from] StateError),
}

/// Summary of a recovery sweep over stalled workflows.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ResumeReport {
    pub resumed: Vec<ThreadId>,
    pub skipped: Vec<ThreadId>,
}

/// Coordinator driving applications through the stage pipeline. Holds no
/// workflow state of its own: everything it knows at a decision point comes
/// from the checkpoint it just loaded, which is what makes resumption after
/// a crash equivalent to normal operation.
pub struct OrchestrationEngine<S> {
    store: Arc<S>,
    registry: StageRegistry,
    routing: RoutingTable,
    settings: EngineSettings,
}

static THREAD_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_thread_id() -> ThreadId {
    let id = THREAD_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ThreadId(format!("loan-{id:06}"))
}

/// Result of a compare-and-swap save: either our write landed, or a
/// concurrent writer got there first and their state is returned.
enum Commit {
    Won(ApplicationState),
    Lost(ApplicationState),
}

impl Commit {
    fn into_state(self) -> ApplicationState {
        match self {
            Commit::Won(state) | Commit::Lost(state) => state,
        }
    }
}

impl<S> OrchestrationEngine<S>
where
    S: CheckpointStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        registry: StageRegistry,
        routing: RoutingTable,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            registry,
            routing,
            settings,
        }
    }

    /// Register a new application and persist its initial checkpoint.
    pub async fn create(
        &self,
        submission: LoanSubmission,
    ) -> Result<ApplicationState, EngineError> {
        let state = ApplicationState::new(next_thread_id(), submission, Utc::now());
        self.store.save(&state).await?;
        info!(thread_id = %state.thread_id, "workflow created");
        Ok(state)
    }

    /// Current checkpointed state for a thread.
    pub async fn state(&self, thread_id: &ThreadId) -> Result<ApplicationState, EngineError> {
        self.store
            .load(thread_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(thread_id.clone()))
    }

    /// Run the current stage once and apply its routing decision. A no-op on
    /// terminal or awaiting-input workflows.
    pub async fn advance(&self, thread_id: &ThreadId) -> Result<ApplicationState, EngineError> {
        let state = self.state(thread_id).await?;
        self.advance_from(state).await
    }

    /// Drive the workflow until it completes, rejects, fails, or suspends
    /// for input.
    pub async fn run_to_completion(
        &self,
        thread_id: &ThreadId,
    ) -> Result<ApplicationState, EngineError> {
        let mut state = self.state(thread_id).await?;
        while state.status == WorkflowStatus::InProgress {
            state = self.advance_from(state).await?;
        }
        Ok(state)
    }

    /// Merge operator-supplied documents and fields into a suspended
    /// workflow and put it back in progress. Retries on checkpoint conflict
    /// since the merge applies cleanly to any fresher state.
    pub async fn supply_input(
        &self,
        thread_id: &ThreadId,
        input: SuppliedInput,
    ) -> Result<ApplicationState, EngineError> {
        loop {
            let state = self.state(thread_id).await?;
            let updated = state.supply_input(input.clone(), Utc::now())?;
            match self.commit(updated).await? {
                Commit::Won(state) => {
                    info!(thread_id = %state.thread_id, "input supplied, workflow resumed");
                    return Ok(state);
                }
                Commit::Lost(_) => continue,
            }
        }
    }

    /// Operator cancellation. Idempotent on already-terminal workflows.
    pub async fn cancel(
        &self,
        thread_id: &ThreadId,
        reason: &str,
    ) -> Result<ApplicationState, EngineError> {
        loop {
            let state = self.state(thread_id).await?;
            if state.is_terminal() {
                return Ok(state);
            }
            let cancelled = state.cancel(reason, Utc::now());
            match self.commit(cancelled).await? {
                Commit::Won(state) => {
                    info!(thread_id = %state.thread_id, reason, "workflow cancelled");
                    return Ok(state);
                }
                Commit::Lost(_) => continue,
            }
        }
    }

    /// Recovery sweep: pick up every in-progress workflow whose checkpoint
    /// has not moved since `cutoff` and drive it forward. Awaiting-input and
    /// terminal threads are reported but left alone.
    pub async fn resume_all(&self, cutoff: DateTime<Utc>) -> Result<ResumeReport, EngineError> {
        let mut report = ResumeReport::default();
        for thread_id in self.store.stalled_since(cutoff).await? {
            let Some(state) = self.store.load(&thread_id).await? else {
                continue;
            };
            if state.status != WorkflowStatus::InProgress {
                report.skipped.push(thread_id);
                continue;
            }
            info!(%thread_id, version = state.version, "resuming stalled workflow");
            match self.run_to_completion(&thread_id).await {
                Ok(_) => report.resumed.push(thread_id),
                Err(error) => {
                    warn!(%thread_id, %error, "resume attempt failed");
                    report.skipped.push(thread_id);
                }
            }
        }
        Ok(report)
    }

    async fn advance_from(
        &self,
        state: ApplicationState,
    ) -> Result<ApplicationState, EngineError> {
        if state.status != WorkflowStatus::InProgress {
            return Ok(state);
        }
        let Some(stage) = state.active_stage() else {
            return Ok(state);
        };
        let collaborator = self
            .registry
            .get(stage)
            .ok_or(EngineError::StageNotRegistered(stage))?
            .clone();

        let started_at = Utc::now();
        let output = match self.execute_with_retries(&collaborator, &state, stage).await {
            Ok(output) => output,
            Err(error) => {
                warn!(
                    thread_id = %state.thread_id,
                    stage = stage.label(),
                    %error,
                    "stage attempts exhausted, failing workflow"
                );
                let failed = state.fail_stage(stage, &error.to_string(), started_at, Utc::now());
                return Ok(self.commit(failed).await?.into_state());
            }
        };

        let applied = state.apply(stage, output, started_at, Utc::now());
        let applied = match self.commit(applied).await? {
            Commit::Won(state) => state,
            // A concurrent writer advanced this thread first; our stage run
            // is discarded without routing so the stage stays exactly-once
            // in the surviving history.
            Commit::Lost(latest) => return Ok(latest),
        };

        let decision = self.routing.decide(stage, &applied, Utc::now());
        info!(
            thread_id = %applied.thread_id,
            stage = stage.label(),
            reason = %decision.reason_code,
            "stage routed"
        );
        let decided = applied.record_decision(&decision, Utc::now());
        Ok(self.commit(decided).await?.into_state())
    }

    /// One stage run under the attempt budget. Timeouts and transient errors
    /// retry with doubling backoff; fatal errors stop immediately.
    async fn execute_with_retries(
        &self,
        collaborator: &Arc<dyn StageCollaborator>,
        state: &ApplicationState,
        stage: WorkflowStage,
    ) -> Result<StageOutput, StageError> {
        let mut attempt = 1u32;
        loop {
            let run = time::timeout(
                self.settings.stage_timeout,
                collaborator.execute(&state.thread_id, state),
            )
            .await;
            let error = match run {
                Ok(Ok(output)) => return Ok(output),
                Ok(Err(error)) if error.is_transient() => error,
                Ok(Err(error)) => return Err(error),
                Err(_) => StageError::Transient(format!(
                    "stage timed out after {}s",
                    self.settings.stage_timeout.as_secs()
                )),
            };
            if attempt >= self.settings.max_stage_attempts {
                return Err(error);
            }
            // Saturate rather than overflow when operators configure very
            // large attempt budgets.
            let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
            let backoff = self.settings.retry_backoff.saturating_mul(factor);
            warn!(
                thread_id = %state.thread_id,
                stage = stage.label(),
                attempt,
                %error,
                "stage attempt failed, retrying"
            );
            time::sleep(backoff).await;
            attempt += 1;
        }
    }

    async fn commit(&self, state: ApplicationState) -> Result<Commit, EngineError> {
        match self.store.save(&state).await {
            Ok(()) => Ok(Commit::Won(state)),
            Err(CheckpointError::VersionConflict { stored, attempted }) => {
                warn!(
                    thread_id = %state.thread_id,
                    stored,
                    attempted,
                    "checkpoint conflict, yielding to concurrent writer"
                );
                let latest = self.state(&state.thread_id).await?;
                Ok(Commit::Lost(latest))
            }
            Err(error) => Err(error.into()),
        }
    }
}
