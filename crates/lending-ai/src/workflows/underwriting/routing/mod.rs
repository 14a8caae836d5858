mod config;
mod policy;
mod rules;

pub use config::RoutingConfig;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{InputRequest, WorkflowStage};
use super::state::ApplicationState;

/// Named business conditions evaluated by the routing table. Each condition
/// has exactly one canonical evaluation in [`rules`]; every consumer that
/// needs the answer goes through [`RoutingTable::condition`] rather than
/// re-deriving it from raw fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    DocumentsClassified,
    BorrowerPanAvailable,
    DocumentConfidenceMet,
    EntityIdentified,
    ConstitutionEligible,
    MinimumCoverageMet,
    BureauScoresAcceptable,
    EligibilityCleared,
    ServicingCapacityComputed,
    BankingDocumentsPresent,
    BankingAnalysisCompleted,
    ReportAssembled,
}

impl ConditionKind {
    pub const fn name(self) -> &'static str {
        match self {
            ConditionKind::DocumentsClassified => "documents_classified",
            ConditionKind::BorrowerPanAvailable => "borrower_pan_available",
            ConditionKind::DocumentConfidenceMet => "document_confidence_met",
            ConditionKind::EntityIdentified => "entity_identified",
            ConditionKind::ConstitutionEligible => "constitution_eligible",
            ConditionKind::MinimumCoverageMet => "minimum_coverage_met",
            ConditionKind::BureauScoresAcceptable => "bureau_scores_acceptable",
            ConditionKind::EligibilityCleared => "eligibility_cleared",
            ConditionKind::ServicingCapacityComputed => "servicing_capacity_computed",
            ConditionKind::BankingDocumentsPresent => "banking_documents_present",
            ConditionKind::BankingAnalysisCompleted => "banking_analysis_completed",
            ConditionKind::ReportAssembled => "report_assembled",
        }
    }
}

/// Three-way predicate result: a condition over a field with no value is
/// `Unavailable`, never silently folded into `Unmet`. The two collapse only
/// at the final decision point, and the detail text keeps them apart in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionStatus {
    Met,
    Unmet,
    Unavailable,
}

impl ConditionStatus {
    pub const fn is_met(self) -> bool {
        matches!(self, ConditionStatus::Met)
    }
}

/// Evaluated condition with a human-readable explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionFinding {
    pub kind: ConditionKind,
    pub status: ConditionStatus,
    pub detail: String,
}

/// Where the workflow goes after a stage completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteOutcome {
    Proceed(WorkflowStage),
    AwaitInput(InputRequest),
    Reject,
    Fail,
    Complete,
}

/// Transient value produced by the routing table and folded into the stage
/// history by the engine; never persisted standalone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub outcome: RouteOutcome,
    pub reason_code: String,
    pub satisfied_conditions: BTreeSet<String>,
}

/// Table-driven router: one total decision function per stage, built on the
/// canonical condition evaluations in [`rules`].
#[derive(Debug, Clone)]
pub struct RoutingTable {
    config: RoutingConfig,
}

impl RoutingTable {
    pub fn new(config: RoutingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Read-only predicate accessor: the single source of truth for any
    /// downstream consumer asking "does this application satisfy X".
    pub fn condition(&self, state: &ApplicationState, kind: ConditionKind) -> ConditionFinding {
        rules::evaluate(kind, state, &self.config)
    }

    /// Produces exactly one decision for the just-completed stage. Total over
    /// all reachable states, including insufficient-data and error branches.
    pub fn decide(
        &self,
        stage: WorkflowStage,
        state: &ApplicationState,
        now: DateTime<Utc>,
    ) -> RoutingDecision {
        policy::decide(stage, state, &self.config, now)
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new(RoutingConfig::default())
    }
}
