use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;

use lending_ai::workflows::underwriting::{
    ApplicationState, CheckpointError, CheckpointStore, RoutingConfig, StageCollaborator,
    StageError, StageOutput, StageRegistry, ThreadId, WorkflowStage,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// In-memory checkpoint store. The compare-and-swap on version is enforced
/// under one mutex so the check and the write are atomic, matching the
/// contract a database-backed store must provide.
#[derive(Default)]
pub(crate) struct InMemoryCheckpointStore {
    records: Mutex<HashMap<String, ApplicationState>>,
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, state: &ApplicationState) -> Result<(), CheckpointError> {
        let mut guard = self.records.lock().expect("checkpoint mutex poisoned");
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
        let guard = self.records.lock().expect("checkpoint mutex poisoned");
        Ok(guard.get(&thread_id.0).cloned())
    }

    async fn stalled_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ThreadId>, CheckpointError> {
        let guard = self.records.lock().expect("checkpoint mutex poisoned");
        Ok(guard
            .values()
            .filter(|state| !state.is_terminal() && state.updated_at <= cutoff)
            .map(|state| state.thread_id.clone())
            .collect())
    }
}

/// Document classifier stub: categorizes uploads by file name so the demo
/// and local runs exercise every routing branch without an extraction
/// backend.
pub(crate) struct DocumentClassifierStub;

#[async_trait]
impl StageCollaborator for DocumentClassifierStub {
    async fn execute(
        &self,
        _thread_id: &ThreadId,
        state: &ApplicationState,
    ) -> Result<StageOutput, StageError> {
        let documents = &state.submission.documents;
        let pan_count = documents
            .iter()
            .filter(|doc| doc.file_name.to_lowercase().contains("pan"))
            .count();
        let banking_count = documents
            .iter()
            .filter(|doc| {
                let name = doc.file_name.to_lowercase();
                name.contains("statement") || name.contains("bank")
            })
            .count();
        Ok(StageOutput::success(
            json!({
                "classified_document_count": documents.len(),
                "borrower_pan_count": pan_count,
                "banking_document_count": banking_count,
            }),
            Some(0.93),
        ))
    }
}

/// Entity profile stub with full KMP coverage for a two-partner firm.
pub(crate) struct EntityIdentifierStub;

#[async_trait]
impl StageCollaborator for EntityIdentifierStub {
    async fn execute(
        &self,
        _thread_id: &ThreadId,
        state: &ApplicationState,
    ) -> Result<StageOutput, StageError> {
        Ok(StageOutput::success(
            json!({
                "entity_name": state.submission.applicant_name,
                "entity_type": "partnership",
                "kmp_coverage": 0.75,
            }),
            Some(0.88),
        ))
    }
}

/// Verification stub reporting passing bureau pulls.
pub(crate) struct VerificationStub;

#[async_trait]
impl StageCollaborator for VerificationStub {
    async fn execute(
        &self,
        _thread_id: &ThreadId,
        _state: &ApplicationState,
    ) -> Result<StageOutput, StageError> {
        Ok(StageOutput::success(
            json!({
                "eligibility": "approved",
                "consumer_cibil": 726,
                "commercial_cmr": 4,
            }),
            None,
        ))
    }
}

/// Financial ratio stub deriving a servicing capacity from the requested
/// amount.
pub(crate) struct FinancialAnalystStub;

#[async_trait]
impl StageCollaborator for FinancialAnalystStub {
    async fn execute(
        &self,
        _thread_id: &ThreadId,
        state: &ApplicationState,
    ) -> Result<StageOutput, StageError> {
        let amount = state.submission.loan_context.loan_amount as f64;
        let capacity = if amount > 10_000_000.0 { 1.1 } else { 1.7 };
        Ok(StageOutput::success(
            json!({
                "servicing_capacity": capacity,
                "annual_turnover": amount * 4.0,
            }),
            None,
        ))
    }
}

/// Bank statement analysis stub.
pub(crate) struct BankingAnalystStub;

#[async_trait]
impl StageCollaborator for BankingAnalystStub {
    async fn execute(
        &self,
        _thread_id: &ThreadId,
        _state: &ApplicationState,
    ) -> Result<StageOutput, StageError> {
        Ok(StageOutput::success(
            json!({
                "average_monthly_balance": 385_000,
                "bounce_count": 0,
            }),
            None,
        ))
    }
}

/// Final report stub keyed to the thread id.
pub(crate) struct ReportAssemblerStub;

#[async_trait]
impl StageCollaborator for ReportAssemblerStub {
    async fn execute(
        &self,
        thread_id: &ThreadId,
        _state: &ApplicationState,
    ) -> Result<StageOutput, StageError> {
        Ok(StageOutput::success(
            json!({ "report_id": format!("rpt-{thread_id}") }),
            None,
        ))
    }
}

pub(crate) fn stub_registry() -> StageRegistry {
    StageRegistry::new()
        .register(
            WorkflowStage::DocumentClassification,
            Arc::new(DocumentClassifierStub),
        )
        .register(
            WorkflowStage::EntityIdentification,
            Arc::new(EntityIdentifierStub),
        )
        .register(WorkflowStage::VerificationCompliance, Arc::new(VerificationStub))
        .register(WorkflowStage::FinancialAnalysis, Arc::new(FinancialAnalystStub))
        .register(WorkflowStage::BankingAnalysis, Arc::new(BankingAnalystStub))
        .register(WorkflowStage::FinalAssembly, Arc::new(ReportAssemblerStub))
}

pub(crate) fn default_routing_config() -> RoutingConfig {
    RoutingConfig::default()
}
