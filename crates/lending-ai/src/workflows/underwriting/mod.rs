//! Loan application underwriting workflow: durable checkpointed state, a
//! table-driven router over named business conditions, and an orchestration
//! engine that drives stage collaborators with retry, timeout, and
//! compare-and-swap persistence.

pub mod checkpoint;
pub mod domain;
pub mod engine;
pub mod router;
pub mod routing;
pub mod stage;
pub mod state;

#[cfg(test)]
mod tests;

pub use checkpoint::{CheckpointError, CheckpointStore};
pub use domain::{
    CurrentStage, InputRequest, LoanContext, LoanSubmission, MissingItem, StageDisposition,
    StageOutput, StageRecord, StageStatus, SuppliedInput, ThreadId, UploadedDocument,
    WorkflowStage, WorkflowStatus,
};
pub use engine::{
    EngineError, EngineSettings, OrchestrationEngine, ResumeReport, StageRegistry,
};
pub use router::underwriting_router;
pub use routing::{
    ConditionFinding, ConditionKind, ConditionStatus, RouteOutcome, RoutingConfig,
    RoutingDecision, RoutingTable,
};
pub use stage::{StageCollaborator, StageError};
pub use state::{ApplicationState, StateError, StatusView};
