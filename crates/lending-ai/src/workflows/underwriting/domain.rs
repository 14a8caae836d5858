use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper scoping one loan application's durable state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Analysis stages in execution order. The linear successor chain is the
/// default path; the routing table may divert to awaiting-input or a terminal
/// outcome at any point.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    DocumentClassification,
    EntityIdentification,
    VerificationCompliance,
    FinancialAnalysis,
    BankingAnalysis,
    FinalAssembly,
}

impl WorkflowStage {
    pub const ALL: [WorkflowStage; 6] = [
        WorkflowStage::DocumentClassification,
        WorkflowStage::EntityIdentification,
        WorkflowStage::VerificationCompliance,
        WorkflowStage::FinancialAnalysis,
        WorkflowStage::BankingAnalysis,
        WorkflowStage::FinalAssembly,
    ];

    pub const fn first() -> Self {
        WorkflowStage::DocumentClassification
    }

    pub const fn successor(self) -> Option<Self> {
        match self {
            WorkflowStage::DocumentClassification => Some(WorkflowStage::EntityIdentification),
            WorkflowStage::EntityIdentification => Some(WorkflowStage::VerificationCompliance),
            WorkflowStage::VerificationCompliance => Some(WorkflowStage::FinancialAnalysis),
            WorkflowStage::FinancialAnalysis => Some(WorkflowStage::BankingAnalysis),
            WorkflowStage::BankingAnalysis => Some(WorkflowStage::FinalAssembly),
            WorkflowStage::FinalAssembly => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            WorkflowStage::DocumentClassification => "document_classification",
            WorkflowStage::EntityIdentification => "entity_kmp_identification",
            WorkflowStage::VerificationCompliance => "verification_compliance",
            WorkflowStage::FinancialAnalysis => "financial_analysis",
            WorkflowStage::BankingAnalysis => "banking_analysis",
            WorkflowStage::FinalAssembly => "final_assembly",
        }
    }
}

/// High level status tracked throughout the underwriting workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    InProgress,
    AwaitingInput,
    Completed,
    Rejected,
    Failed,
}

impl WorkflowStatus {
    pub const fn label(self) -> &'static str {
        match self {
            WorkflowStatus::InProgress => "in_progress",
            WorkflowStatus::AwaitingInput => "awaiting_input",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Rejected => "rejected",
            WorkflowStatus::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Rejected | WorkflowStatus::Failed
        )
    }
}

/// Stage the engine will run on the next `advance`, or the terminal sentinel
/// once the workflow has concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrentStage {
    Stage(WorkflowStage),
    Terminal,
}

impl CurrentStage {
    pub const fn stage(self) -> Option<WorkflowStage> {
        match self {
            CurrentStage::Stage(stage) => Some(stage),
            CurrentStage::Terminal => None,
        }
    }
}

/// Loan request details captured at submission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanContext {
    pub loan_type: String,
    pub loan_amount: u64,
    pub tenure_months: Option<u16>,
    pub purpose: Option<String>,
}

/// Metadata for an uploaded document so stages can locate and audit inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedDocument {
    pub file_name: String,
    pub content_type: String,
    pub storage_key: String,
}

/// Inbound loan application payload; everything beyond this arrives through
/// stage collaborators or operator-supplied input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanSubmission {
    pub applicant_name: String,
    pub loan_context: LoanContext,
    pub documents: Vec<UploadedDocument>,
}

/// Collaborator-reported completion status for a single stage run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Partial,
    Error,
}

/// Uniform result shape every stage collaborator returns. The engine treats
/// `data` as opaque beyond the fields the routing table predicates read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    pub status: StageStatus,
    pub data: serde_json::Value,
    pub confidence: Option<f64>,
}

impl StageOutput {
    pub fn success(data: serde_json::Value, confidence: Option<f64>) -> Self {
        Self {
            status: StageStatus::Success,
            data,
            confidence,
        }
    }

    /// Resolved numeric field, `None` when absent or non-numeric.
    pub fn number(&self, field: &str) -> Option<f64> {
        self.data.get(field).and_then(serde_json::Value::as_f64)
    }

    /// Resolved integer field, `None` when absent or non-integer.
    pub fn integer(&self, field: &str) -> Option<i64> {
        self.data.get(field).and_then(serde_json::Value::as_i64)
    }

    /// Resolved string field, `None` when absent or non-string.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(serde_json::Value::as_str)
    }
}

/// Outcome tag recorded for a stage run in the history timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageDisposition {
    Completed,
    Partial,
    Failed,
}

impl From<StageStatus> for StageDisposition {
    fn from(value: StageStatus) -> Self {
        match value {
            StageStatus::Success => StageDisposition::Completed,
            StageStatus::Partial => StageDisposition::Partial,
            StageStatus::Error => StageDisposition::Failed,
        }
    }
}

/// Append-only history entry for one stage execution. The routing decision
/// taken after the run is folded into the same entry once known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: WorkflowStage,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub disposition: StageDisposition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub satisfied_conditions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One document or field an awaiting-input workflow is blocked on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingItem {
    pub name: String,
    pub reason: String,
}

/// Explicit list of missing items recorded when a workflow suspends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRequest {
    pub stage: WorkflowStage,
    pub missing: Vec<MissingItem>,
    pub requested_at: DateTime<Utc>,
}

/// Operator-supplied data resolving an [`InputRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuppliedInput {
    #[serde(default)]
    pub documents: Vec<UploadedDocument>,
    #[serde(default)]
    pub fields: serde_json::Value,
}
