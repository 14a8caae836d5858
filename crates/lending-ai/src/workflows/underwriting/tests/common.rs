use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use crate::workflows::underwriting::checkpoint::{CheckpointError, CheckpointStore};
use crate::workflows::underwriting::domain::{
    LoanContext, LoanSubmission, StageOutput, StageStatus, ThreadId, UploadedDocument,
    WorkflowStage,
};
use crate::workflows::underwriting::engine::{EngineSettings, OrchestrationEngine, StageRegistry};
use crate::workflows::underwriting::stage::{StageCollaborator, StageError};
use crate::workflows::underwriting::state::ApplicationState;
use crate::workflows::underwriting::RoutingTable;

pub(super) fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn document(file_name: &str, content_type: &str) -> UploadedDocument {
    UploadedDocument {
        file_name: file_name.to_string(),
        content_type: content_type.to_string(),
        storage_key: format!("s3://lending-ai/docs/{file_name}"),
    }
}

pub(super) fn submission() -> LoanSubmission {
    LoanSubmission {
        applicant_name: "Shree Ganesh Traders".to_string(),
        loan_context: LoanContext {
            loan_type: "working_capital".to_string(),
            loan_amount: 2_500_000,
            tenure_months: Some(36),
            purpose: Some("inventory purchase".to_string()),
        },
        documents: vec![
            document("pan_card.pdf", "application/pdf"),
            document("gst_certificate.pdf", "application/pdf"),
            document("bank_statement_q4.pdf", "application/pdf"),
        ],
    }
}

pub(super) fn new_state() -> ApplicationState {
    ApplicationState::new(ThreadId("loan-test-001".to_string()), submission(), fixed_now())
}

pub(super) fn classification_output(pan: i64, banking: i64, confidence: f64) -> StageOutput {
    StageOutput::success(
        json!({
            "classified_document_count": 3,
            "borrower_pan_count": pan,
            "banking_document_count": banking,
        }),
        Some(confidence),
    )
}

pub(super) fn entity_output(entity_type: &str, coverage: f64) -> StageOutput {
    StageOutput::success(
        json!({
            "entity_name": "Shree Ganesh Traders",
            "entity_type": entity_type,
            "kmp_coverage": coverage,
        }),
        Some(0.9),
    )
}

pub(super) fn verification_output(cibil: i64, cmr: i64) -> StageOutput {
    StageOutput::success(
        json!({
            "eligibility": "approved",
            "consumer_cibil": cibil,
            "commercial_cmr": cmr,
        }),
        None,
    )
}

pub(super) fn financial_output(capacity: f64) -> StageOutput {
    StageOutput::success(json!({ "servicing_capacity": capacity }), None)
}

pub(super) fn banking_output() -> StageOutput {
    StageOutput::success(json!({ "average_monthly_balance": 410_000 }), None)
}

pub(super) fn assembly_output() -> StageOutput {
    StageOutput::success(json!({ "report_id": "rpt-0001" }), None)
}

pub(super) fn error_output(message: &str) -> StageOutput {
    StageOutput {
        status: StageStatus::Error,
        data: json!({ "message": message }),
        confidence: None,
    }
}

/// Folds stage outputs into a fresh state so routing tests can describe a
/// scenario without running the engine.
pub(super) fn state_with(outputs: &[(WorkflowStage, StageOutput)]) -> ApplicationState {
    let mut state = new_state();
    for (stage, output) in outputs {
        state = state.apply(*stage, output.clone(), fixed_now(), fixed_now());
    }
    state
}

/// In-memory checkpoint store with the same compare-and-swap contract a
/// database-backed implementation must honor.
#[derive(Default)]
pub(super) struct MemoryCheckpointStore {
    records: Mutex<BTreeMap<String, ApplicationState>>,
}

impl MemoryCheckpointStore {
    /// Inserts a state directly, bypassing the compare-and-swap, so tests can
    /// stage mid-workflow fixtures.
    pub(super) fn seed(&self, state: ApplicationState) {
        self.records
            .lock()
            .expect("store mutex poisoned")
            .insert(state.thread_id.0.clone(), state);
    }

    pub(super) fn loaded(&self, thread_id: &ThreadId) -> Option<ApplicationState> {
        self.records
            .lock()
            .expect("store mutex poisoned")
            .get(&thread_id.0)
            .cloned()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, state: &ApplicationState) -> Result<(), CheckpointError> {
        let mut guard = self.records.lock().expect("store mutex poisoned");
        match guard.get(&state.thread_id.0) {
            None if state.version == 0 => {}
            None => {
                return Err(CheckpointError::VersionConflict {
                    stored: 0,
                    attempted: state.version,
                })
            }
            Some(existing) if existing.version + 1 == state.version => {}
            Some(existing) => {
                return Err(CheckpointError::VersionConflict {
                    stored: existing.version,
                    attempted: state.version,
                })
            }
        }
        guard.insert(state.thread_id.0.clone(), state.clone());
        Ok(())
    }

    async fn load(
        &self,
        thread_id: &ThreadId,
    ) -> Result<Option<ApplicationState>, CheckpointError> {
        let guard = self.records.lock().expect("store mutex poisoned");
        Ok(guard.get(&thread_id.0).cloned())
    }

    async fn stalled_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ThreadId>, CheckpointError> {
        let guard = self.records.lock().expect("store mutex poisoned");
        Ok(guard
            .values()
            .filter(|state| !state.is_terminal() && state.updated_at <= cutoff)
            .map(|state| state.thread_id.clone())
            .collect())
    }
}

/// Store wrapper that lands a competing write immediately before the next
/// save, forcing the caller's compare-and-swap to lose.
pub(super) struct PreemptStore {
    inner: Arc<MemoryCheckpointStore>,
    competitor: Mutex<Option<ApplicationState>>,
}

impl PreemptStore {
    pub(super) fn new(inner: Arc<MemoryCheckpointStore>, competitor: ApplicationState) -> Self {
        Self {
            inner,
            competitor: Mutex::new(Some(competitor)),
        }
    }
}

#[async_trait]
impl CheckpointStore for PreemptStore {
    async fn save(&self, state: &ApplicationState) -> Result<(), CheckpointError> {
        let competitor = self
            .competitor
            .lock()
            .expect("competitor mutex poisoned")
            .take();
        if let Some(winner) = competitor {
            self.inner.save(&winner).await?;
        }
        self.inner.save(state).await
    }

    async fn load(
        &self,
        thread_id: &ThreadId,
    ) -> Result<Option<ApplicationState>, CheckpointError> {
        self.inner.load(thread_id).await
    }

    async fn stalled_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ThreadId>, CheckpointError> {
        self.inner.stalled_since(cutoff).await
    }
}

/// Returns the same output on every run.
pub(super) struct StaticCollaborator {
    output: StageOutput,
}

impl StaticCollaborator {
    pub(super) fn new(output: StageOutput) -> Arc<Self> {
        Arc::new(Self { output })
    }
}

#[async_trait]
impl StageCollaborator for StaticCollaborator {
    async fn execute(
        &self,
        _thread_id: &ThreadId,
        _state: &ApplicationState,
    ) -> Result<StageOutput, StageError> {
        Ok(self.output.clone())
    }
}

/// Pops a scripted result per attempt; panics when the script runs dry.
pub(super) struct SequenceCollaborator {
    script: Mutex<VecDeque<Result<StageOutput, StageError>>>,
    attempts: AtomicU32,
}

impl SequenceCollaborator {
    pub(super) fn new(script: Vec<Result<StageOutput, StageError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            attempts: AtomicU32::new(0),
        })
    }

    pub(super) fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageCollaborator for SequenceCollaborator {
    async fn execute(
        &self,
        _thread_id: &ThreadId,
        _state: &ApplicationState,
    ) -> Result<StageOutput, StageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .expect("script mutex poisoned")
            .pop_front()
            .expect("scripted collaborator exhausted")
    }
}

/// Fails with the same error on every attempt.
pub(super) struct FailingCollaborator {
    error: StageError,
    attempts: AtomicU32,
}

impl FailingCollaborator {
    pub(super) fn new(error: StageError) -> Arc<Self> {
        Arc::new(Self {
            error,
            attempts: AtomicU32::new(0),
        })
    }

    pub(super) fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageCollaborator for FailingCollaborator {
    async fn execute(
        &self,
        _thread_id: &ThreadId,
        _state: &ApplicationState,
    ) -> Result<StageOutput, StageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// Sleeps past any reasonable stage timeout before answering.
pub(super) struct SlowCollaborator {
    delay: Duration,
    output: StageOutput,
    attempts: AtomicU32,
}

impl SlowCollaborator {
    pub(super) fn new(delay: Duration, output: StageOutput) -> Arc<Self> {
        Arc::new(Self {
            delay,
            output,
            attempts: AtomicU32::new(0),
        })
    }

    pub(super) fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageCollaborator for SlowCollaborator {
    async fn execute(
        &self,
        _thread_id: &ThreadId,
        _state: &ApplicationState,
    ) -> Result<StageOutput, StageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.output.clone())
    }
}

pub(super) fn fast_settings() -> EngineSettings {
    EngineSettings {
        stage_timeout: Duration::from_secs(5),
        max_stage_attempts: 3,
        retry_backoff: Duration::from_millis(100),
    }
}

/// All six stages wired to static happy-path outputs, including bank
/// statements so the full pipeline runs.
pub(super) fn happy_registry() -> StageRegistry {
    StageRegistry::new()
        .register(
            WorkflowStage::DocumentClassification,
            StaticCollaborator::new(classification_output(1, 2, 0.92)),
        )
        .register(
            WorkflowStage::EntityIdentification,
            StaticCollaborator::new(entity_output("partnership", 0.8)),
        )
        .register(
            WorkflowStage::VerificationCompliance,
            StaticCollaborator::new(verification_output(724, 4)),
        )
        .register(
            WorkflowStage::FinancialAnalysis,
            StaticCollaborator::new(financial_output(1.8)),
        )
        .register(WorkflowStage::BankingAnalysis, StaticCollaborator::new(banking_output()))
        .register(WorkflowStage::FinalAssembly, StaticCollaborator::new(assembly_output()))
}

pub(super) fn engine_with<S>(store: Arc<S>, registry: StageRegistry) -> OrchestrationEngine<S>
where
    S: CheckpointStore + 'static,
{
    OrchestrationEngine::new(store, registry, RoutingTable::default(), fast_settings())
}

pub(super) async fn read_json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
