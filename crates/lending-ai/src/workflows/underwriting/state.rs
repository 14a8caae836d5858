use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    CurrentStage, InputRequest, LoanSubmission, MissingItem, StageDisposition, StageOutput,
    StageRecord, SuppliedInput, ThreadId, WorkflowStage, WorkflowStatus,
};
use super::routing::{RouteOutcome, RoutingDecision};

/// Canonical record of one loan application's progress through the workflow.
///
/// Every mutation happens through a pure method that returns a new state with
/// `version` incremented; the checkpoint store's compare-and-swap on that
/// version is the only cross-process coordination mechanism.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationState {
    pub thread_id: ThreadId,
    pub current_stage: CurrentStage,
    pub status: WorkflowStatus,
    pub version: u64,
    pub submission: LoanSubmission,
    pub stage_outputs: BTreeMap<WorkflowStage, StageOutput>,
    pub stage_history: Vec<StageRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_input: Option<InputRequest>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub supplied_fields: BTreeMap<WorkflowStage, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Invalid state-machine transition requested by a caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StateError {
    #[error("input supplied while status is {}; expected awaiting_input", .status.label())]
    NotAwaitingInput { status: WorkflowStatus },
}

impl ApplicationState {
    pub fn new(thread_id: ThreadId, submission: LoanSubmission, now: DateTime<Utc>) -> Self {
        Self {
            thread_id,
            current_stage: CurrentStage::Stage(WorkflowStage::first()),
            status: WorkflowStatus::InProgress,
            version: 0,
            submission,
            stage_outputs: BTreeMap::new(),
            stage_history: Vec::new(),
            pending_input: None,
            supplied_fields: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Stage the engine should run next, `None` once terminal.
    pub fn active_stage(&self) -> Option<WorkflowStage> {
        self.current_stage.stage()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Pure merge of a completed stage run: sets the stage's output slot,
    /// appends a history entry, and bumps the version. Re-running a stage
    /// overwrites its output slot but always appends a fresh history entry.
    pub fn apply(
        &self,
        stage: WorkflowStage,
        output: StageOutput,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let mut next = self.clone();
        next.stage_history.push(StageRecord {
            stage,
            started_at,
            finished_at,
            disposition: StageDisposition::from(output.status),
            routing_reason: None,
            satisfied_conditions: Vec::new(),
            error: None,
        });
        next.stage_outputs.insert(stage, output);
        next.version += 1;
        next.updated_at = finished_at;
        next
    }

    /// Folds a routing decision into the newest history entry and moves the
    /// workflow pointer accordingly.
    pub fn record_decision(&self, decision: &RoutingDecision, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();

        if let Some(record) = next.stage_history.last_mut() {
            record.routing_reason = Some(decision.reason_code.clone());
            record.satisfied_conditions = decision.satisfied_conditions.iter().cloned().collect();
        }

        match &decision.outcome {
            RouteOutcome::Proceed(stage) => {
                next.current_stage = CurrentStage::Stage(*stage);
                next.status = WorkflowStatus::InProgress;
                next.pending_input = None;
            }
            RouteOutcome::AwaitInput(request) => {
                next.status = WorkflowStatus::AwaitingInput;
                next.pending_input = Some(request.clone());
            }
            RouteOutcome::Reject => {
                next.current_stage = CurrentStage::Terminal;
                next.status = WorkflowStatus::Rejected;
            }
            RouteOutcome::Fail => {
                next.current_stage = CurrentStage::Terminal;
                next.status = WorkflowStatus::Failed;
            }
            RouteOutcome::Complete => {
                next.current_stage = CurrentStage::Terminal;
                next.status = WorkflowStatus::Completed;
            }
        }

        next.version += 1;
        next.updated_at = now;
        next
    }

    /// Terminal failure after a collaborator exhausted its retry budget. The
    /// last error is recorded in the history so operators can investigate.
    pub fn fail_stage(
        &self,
        stage: WorkflowStage,
        error: &str,
        started_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut next = self.clone();
        next.stage_history.push(StageRecord {
            stage,
            started_at,
            finished_at: now,
            disposition: StageDisposition::Failed,
            routing_reason: Some("stage_retries_exhausted".to_string()),
            satisfied_conditions: Vec::new(),
            error: Some(error.to_string()),
        });
        next.current_stage = CurrentStage::Terminal;
        next.status = WorkflowStatus::Failed;
        next.version += 1;
        next.updated_at = now;
        next
    }

    /// Merges operator-supplied data and puts the workflow back in progress
    /// at the stage that requested the input.
    pub fn supply_input(
        &self,
        input: SuppliedInput,
        now: DateTime<Utc>,
    ) -> Result<Self, StateError> {
        if self.status != WorkflowStatus::AwaitingInput {
            return Err(StateError::NotAwaitingInput {
                status: self.status,
            });
        }

        let mut next = self.clone();
        next.submission.documents.extend(input.documents);
        if let Some(request) = next.pending_input.take() {
            if !input.fields.is_null() {
                next.supplied_fields.insert(request.stage, input.fields);
            }
        }
        next.status = WorkflowStatus::InProgress;
        next.version += 1;
        next.updated_at = now;
        Ok(next)
    }

    /// Operator cancellation: a normal checkpointed write to terminal failed.
    pub fn cancel(&self, reason: &str, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        if let Some(stage) = self.active_stage() {
            next.stage_history.push(StageRecord {
                stage,
                started_at: now,
                finished_at: now,
                disposition: StageDisposition::Failed,
                routing_reason: Some(reason.to_string()),
                satisfied_conditions: Vec::new(),
                error: None,
            });
        }
        next.current_stage = CurrentStage::Terminal;
        next.status = WorkflowStatus::Failed;
        next.pending_input = None;
        next.version += 1;
        next.updated_at = now;
        next
    }

    /// Sanitized representation for API responses.
    pub fn status_view(&self) -> StatusView {
        StatusView {
            thread_id: self.thread_id.clone(),
            status: self.status.label(),
            current_stage: self.active_stage().map(WorkflowStage::label),
            version: self.version,
            decision_rationale: self
                .stage_history
                .iter()
                .rev()
                .find_map(|record| record.routing_reason.clone())
                .unwrap_or_else(|| "pending first stage".to_string()),
            missing: self
                .pending_input
                .as_ref()
                .map(|request| request.missing.clone()),
            updated_at: self.updated_at,
        }
    }
}

/// Sanitized view of an application's exposed status.
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub thread_id: ThreadId,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<&'static str>,
    pub version: u64,
    pub decision_rationale: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<MissingItem>>,
    pub updated_at: DateTime<Utc>,
}
