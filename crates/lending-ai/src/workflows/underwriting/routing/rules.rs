//! Canonical condition evaluations. Each predicate reads the stage outputs it
//! depends on and yields a three-way finding: a missing field is reported as
//! `Unavailable` with a "field X unavailable" detail, not folded into `Unmet`.

use super::{ConditionFinding, ConditionKind, ConditionStatus, RoutingConfig};
use crate::workflows::underwriting::domain::{StageOutput, StageStatus, WorkflowStage};
use crate::workflows::underwriting::state::ApplicationState;

pub(super) fn evaluate(
    kind: ConditionKind,
    state: &ApplicationState,
    config: &RoutingConfig,
) -> ConditionFinding {
    match kind {
        ConditionKind::DocumentsClassified => documents_classified(state),
        ConditionKind::BorrowerPanAvailable => borrower_pan_available(state),
        ConditionKind::DocumentConfidenceMet => document_confidence_met(state, config),
        ConditionKind::EntityIdentified => entity_identified(state),
        ConditionKind::ConstitutionEligible => constitution_eligible(state, config),
        ConditionKind::MinimumCoverageMet => minimum_coverage_met(state, config),
        ConditionKind::BureauScoresAcceptable => bureau_scores_acceptable(state, config),
        ConditionKind::EligibilityCleared => eligibility_cleared(state),
        ConditionKind::ServicingCapacityComputed => servicing_capacity_computed(state),
        ConditionKind::BankingDocumentsPresent => banking_documents_present(state),
        ConditionKind::BankingAnalysisCompleted => banking_analysis_completed(state),
        ConditionKind::ReportAssembled => report_assembled(state),
    }
}

fn finding(kind: ConditionKind, status: ConditionStatus, detail: impl Into<String>) -> ConditionFinding {
    ConditionFinding {
        kind,
        status,
        detail: detail.into(),
    }
}

fn output(state: &ApplicationState, stage: WorkflowStage) -> Option<&StageOutput> {
    state.stage_outputs.get(&stage)
}

fn stage_output_unavailable(kind: ConditionKind, stage: WorkflowStage) -> ConditionFinding {
    finding(
        kind,
        ConditionStatus::Unavailable,
        format!("{} output unavailable", stage.label()),
    )
}

fn field_unavailable(kind: ConditionKind, field: &str) -> ConditionFinding {
    finding(
        kind,
        ConditionStatus::Unavailable,
        format!("field {field} unavailable"),
    )
}

fn documents_classified(state: &ApplicationState) -> ConditionFinding {
    let kind = ConditionKind::DocumentsClassified;
    let Some(out) = output(state, WorkflowStage::DocumentClassification) else {
        return stage_output_unavailable(kind, WorkflowStage::DocumentClassification);
    };
    if out.status == StageStatus::Error {
        return finding(
            kind,
            ConditionStatus::Unmet,
            "document classifier reported an error status",
        );
    }
    match out.integer("classified_document_count") {
        None => field_unavailable(kind, "classified_document_count"),
        Some(count) => finding(
            kind,
            ConditionStatus::Met,
            format!("{count} documents classified"),
        ),
    }
}

fn borrower_pan_available(state: &ApplicationState) -> ConditionFinding {
    let kind = ConditionKind::BorrowerPanAvailable;
    let Some(out) = output(state, WorkflowStage::DocumentClassification) else {
        return stage_output_unavailable(kind, WorkflowStage::DocumentClassification);
    };
    match out.integer("borrower_pan_count") {
        None => field_unavailable(kind, "borrower_pan_count"),
        Some(count) if count >= 1 => finding(
            kind,
            ConditionStatus::Met,
            format!("{count} borrower PAN card(s) classified"),
        ),
        Some(_) => finding(
            kind,
            ConditionStatus::Unmet,
            "no borrower PAN card among classified documents",
        ),
    }
}

fn document_confidence_met(state: &ApplicationState, config: &RoutingConfig) -> ConditionFinding {
    let kind = ConditionKind::DocumentConfidenceMet;
    let Some(out) = output(state, WorkflowStage::DocumentClassification) else {
        return stage_output_unavailable(kind, WorkflowStage::DocumentClassification);
    };
    match out.confidence {
        None => field_unavailable(kind, "confidence"),
        Some(value) if value >= config.minimum_document_confidence => finding(
            kind,
            ConditionStatus::Met,
            format!(
                "classification confidence {value:.2} meets minimum {:.2}",
                config.minimum_document_confidence
            ),
        ),
        Some(value) => finding(
            kind,
            ConditionStatus::Unmet,
            format!(
                "classification confidence {value:.2} below minimum {:.2}",
                config.minimum_document_confidence
            ),
        ),
    }
}

fn entity_identified(state: &ApplicationState) -> ConditionFinding {
    let kind = ConditionKind::EntityIdentified;
    let Some(out) = output(state, WorkflowStage::EntityIdentification) else {
        return stage_output_unavailable(kind, WorkflowStage::EntityIdentification);
    };
    match out.text("entity_name") {
        Some(name) => finding(kind, ConditionStatus::Met, format!("entity '{name}' identified")),
        None => finding(
            kind,
            ConditionStatus::Unmet,
            "no entity profile extracted from registration documents",
        ),
    }
}

fn constitution_eligible(state: &ApplicationState, config: &RoutingConfig) -> ConditionFinding {
    let kind = ConditionKind::ConstitutionEligible;
    let Some(out) = output(state, WorkflowStage::EntityIdentification) else {
        return stage_output_unavailable(kind, WorkflowStage::EntityIdentification);
    };
    match out.text("entity_type") {
        None => field_unavailable(kind, "entity_type"),
        Some(entity_type) if config.eligible_constitutions.iter().any(|c| c == entity_type) => {
            finding(
                kind,
                ConditionStatus::Met,
                format!("entity type '{entity_type}' is eligible"),
            )
        }
        Some(entity_type) => finding(
            kind,
            ConditionStatus::Unmet,
            format!("entity type '{entity_type}' outside eligible constitutions"),
        ),
    }
}

fn minimum_coverage_met(state: &ApplicationState, config: &RoutingConfig) -> ConditionFinding {
    let kind = ConditionKind::MinimumCoverageMet;
    let Some(out) = output(state, WorkflowStage::EntityIdentification) else {
        return stage_output_unavailable(kind, WorkflowStage::EntityIdentification);
    };
    match out.number("kmp_coverage") {
        None => field_unavailable(kind, "kmp_coverage"),
        // Boundary is inclusive: coverage exactly at the minimum proceeds.
        Some(coverage) if coverage >= config.minimum_kmp_coverage => finding(
            kind,
            ConditionStatus::Met,
            format!(
                "KMP coverage {coverage:.2} meets minimum {:.2}",
                config.minimum_kmp_coverage
            ),
        ),
        Some(coverage) => finding(
            kind,
            ConditionStatus::Unmet,
            format!(
                "KMP coverage {coverage:.2} below minimum {:.2}",
                config.minimum_kmp_coverage
            ),
        ),
    }
}

fn bureau_scores_acceptable(state: &ApplicationState, config: &RoutingConfig) -> ConditionFinding {
    let kind = ConditionKind::BureauScoresAcceptable;
    let Some(out) = output(state, WorkflowStage::VerificationCompliance) else {
        return stage_output_unavailable(kind, WorkflowStage::VerificationCompliance);
    };
    let Some(cibil) = out.integer("consumer_cibil") else {
        return field_unavailable(kind, "consumer_cibil");
    };
    let Some(cmr) = out.integer("commercial_cmr") else {
        return field_unavailable(kind, "commercial_cmr");
    };
    if cibil < config.minimum_consumer_cibil {
        return finding(
            kind,
            ConditionStatus::Unmet,
            format!(
                "consumer CIBIL {cibil} below minimum {}",
                config.minimum_consumer_cibil
            ),
        );
    }
    if cmr > config.maximum_commercial_cmr {
        return finding(
            kind,
            ConditionStatus::Unmet,
            format!(
                "commercial CMR {cmr} exceeds maximum {}",
                config.maximum_commercial_cmr
            ),
        );
    }
    finding(
        kind,
        ConditionStatus::Met,
        format!("consumer CIBIL {cibil} and commercial CMR {cmr} within thresholds"),
    )
}

fn eligibility_cleared(state: &ApplicationState) -> ConditionFinding {
    let kind = ConditionKind::EligibilityCleared;
    let Some(out) = output(state, WorkflowStage::VerificationCompliance) else {
        return stage_output_unavailable(kind, WorkflowStage::VerificationCompliance);
    };
    match out.text("eligibility") {
        None => field_unavailable(kind, "eligibility"),
        Some("rejected") => {
            let reasons = out
                .data
                .get("rejection_reasons")
                .and_then(serde_json::Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(serde_json::Value::as_str)
                        .collect::<Vec<_>>()
                        .join("; ")
                })
                .filter(|joined| !joined.is_empty())
                .unwrap_or_else(|| "eligibility check rejected the application".to_string());
            finding(kind, ConditionStatus::Unmet, reasons)
        }
        Some(verdict) => finding(
            kind,
            ConditionStatus::Met,
            format!("eligibility verdict '{verdict}'"),
        ),
    }
}

fn servicing_capacity_computed(state: &ApplicationState) -> ConditionFinding {
    let kind = ConditionKind::ServicingCapacityComputed;
    let Some(out) = output(state, WorkflowStage::FinancialAnalysis) else {
        return stage_output_unavailable(kind, WorkflowStage::FinancialAnalysis);
    };
    match out.number("servicing_capacity") {
        None => field_unavailable(kind, "servicing_capacity"),
        Some(capacity) => finding(
            kind,
            ConditionStatus::Met,
            format!("servicing capacity computed at {capacity:.2}"),
        ),
    }
}

fn banking_documents_present(state: &ApplicationState) -> ConditionFinding {
    let kind = ConditionKind::BankingDocumentsPresent;
    let Some(out) = output(state, WorkflowStage::DocumentClassification) else {
        return stage_output_unavailable(kind, WorkflowStage::DocumentClassification);
    };
    match out.integer("banking_document_count") {
        None => field_unavailable(kind, "banking_document_count"),
        Some(count) if count >= 1 => finding(
            kind,
            ConditionStatus::Met,
            format!("{count} bank statement(s) classified"),
        ),
        Some(_) => finding(
            kind,
            ConditionStatus::Unmet,
            "no bank statements among classified documents",
        ),
    }
}

fn banking_analysis_completed(state: &ApplicationState) -> ConditionFinding {
    let kind = ConditionKind::BankingAnalysisCompleted;
    let Some(out) = output(state, WorkflowStage::BankingAnalysis) else {
        return stage_output_unavailable(kind, WorkflowStage::BankingAnalysis);
    };
    if out.status == StageStatus::Error {
        return finding(
            kind,
            ConditionStatus::Unmet,
            "banking analysis reported an error status",
        );
    }
    finding(kind, ConditionStatus::Met, "banking analysis completed")
}

fn report_assembled(state: &ApplicationState) -> ConditionFinding {
    let kind = ConditionKind::ReportAssembled;
    let Some(out) = output(state, WorkflowStage::FinalAssembly) else {
        return stage_output_unavailable(kind, WorkflowStage::FinalAssembly);
    };
    if out.status == StageStatus::Error {
        return finding(
            kind,
            ConditionStatus::Unmet,
            "final assembly reported an error status",
        );
    }
    match out.text("report_id") {
        Some(report_id) => finding(
            kind,
            ConditionStatus::Met,
            format!("underwriting report {report_id} assembled"),
        ),
        None => field_unavailable(kind, "report_id"),
    }
}
