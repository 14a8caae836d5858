//! Per-stage decision policy. Each function is total over the states the
//! engine can hand it: every branch ends in exactly one outcome, and the
//! reason code carries the detail of the finding that settled it.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use super::rules::evaluate;
use super::{
    ConditionFinding, ConditionKind, ConditionStatus, RouteOutcome, RoutingConfig, RoutingDecision,
};
use crate::workflows::underwriting::domain::{InputRequest, MissingItem, WorkflowStage};
use crate::workflows::underwriting::state::ApplicationState;

pub(super) fn decide(
    stage: WorkflowStage,
    state: &ApplicationState,
    config: &RoutingConfig,
    now: DateTime<Utc>,
) -> RoutingDecision {
    match stage {
        WorkflowStage::DocumentClassification => document_classification(state, config, now),
        WorkflowStage::EntityIdentification => entity_identification(state, config, now),
        WorkflowStage::VerificationCompliance => verification_compliance(state, config, now),
        WorkflowStage::FinancialAnalysis => financial_analysis(state, config, now),
        WorkflowStage::BankingAnalysis => banking_analysis(state, config),
        WorkflowStage::FinalAssembly => final_assembly(state, config),
    }
}

fn satisfied(findings: &[&ConditionFinding]) -> BTreeSet<String> {
    findings
        .iter()
        .filter(|finding| finding.status.is_met())
        .map(|finding| finding.kind.name().to_string())
        .collect()
}

fn decision(
    outcome: RouteOutcome,
    reason_code: impl Into<String>,
    findings: &[&ConditionFinding],
) -> RoutingDecision {
    RoutingDecision {
        outcome,
        reason_code: reason_code.into(),
        satisfied_conditions: satisfied(findings),
    }
}

fn await_input(
    stage: WorkflowStage,
    missing: Vec<MissingItem>,
    reason_code: impl Into<String>,
    findings: &[&ConditionFinding],
    now: DateTime<Utc>,
) -> RoutingDecision {
    decision(
        RouteOutcome::AwaitInput(InputRequest {
            stage,
            missing,
            requested_at: now,
        }),
        reason_code,
        findings,
    )
}

fn document_classification(
    state: &ApplicationState,
    config: &RoutingConfig,
    now: DateTime<Utc>,
) -> RoutingDecision {
    let stage = WorkflowStage::DocumentClassification;
    let classified = evaluate(ConditionKind::DocumentsClassified, state, config);
    let confidence = evaluate(ConditionKind::DocumentConfidenceMet, state, config);
    let pan = evaluate(ConditionKind::BorrowerPanAvailable, state, config);
    let findings = [&classified, &confidence, &pan];

    if !classified.status.is_met() {
        return decision(RouteOutcome::Fail, classified.detail.clone(), &findings);
    }
    match confidence.status {
        // Confidence is mandatory classifier metadata; its absence is a data
        // integrity fault rather than something an operator can upload.
        ConditionStatus::Unavailable => {
            return decision(RouteOutcome::Fail, confidence.detail.clone(), &findings);
        }
        ConditionStatus::Unmet => {
            return await_input(
                stage,
                vec![MissingItem {
                    name: "legible_document_scans".to_string(),
                    reason: confidence.detail.clone(),
                }],
                confidence.detail.clone(),
                &findings,
                now,
            );
        }
        ConditionStatus::Met => {}
    }
    if !pan.status.is_met() {
        return await_input(
            stage,
            vec![MissingItem {
                name: "borrower_pan_card".to_string(),
                reason: pan.detail.clone(),
            }],
            pan.detail.clone(),
            &findings,
            now,
        );
    }

    decision(
        RouteOutcome::Proceed(WorkflowStage::EntityIdentification),
        "documents classified with borrower PAN available",
        &findings,
    )
}

fn entity_identification(
    state: &ApplicationState,
    config: &RoutingConfig,
    now: DateTime<Utc>,
) -> RoutingDecision {
    let stage = WorkflowStage::EntityIdentification;
    let identified = evaluate(ConditionKind::EntityIdentified, state, config);
    let constitution = evaluate(ConditionKind::ConstitutionEligible, state, config);
    let coverage = evaluate(ConditionKind::MinimumCoverageMet, state, config);
    let findings = [&identified, &constitution, &coverage];

    // Constitution is a hard disqualifier and dominates everything else
    // observed at this stage.
    match constitution.status {
        ConditionStatus::Unmet => {
            return decision(RouteOutcome::Reject, constitution.detail.clone(), &findings);
        }
        ConditionStatus::Unavailable => {
            return decision(RouteOutcome::Fail, constitution.detail.clone(), &findings);
        }
        ConditionStatus::Met => {}
    }
    if !identified.status.is_met() {
        return await_input(
            stage,
            vec![MissingItem {
                name: "entity_registration_documents".to_string(),
                reason: identified.detail.clone(),
            }],
            identified.detail.clone(),
            &findings,
            now,
        );
    }
    match coverage.status {
        ConditionStatus::Met => decision(
            RouteOutcome::Proceed(WorkflowStage::VerificationCompliance),
            coverage.detail.clone(),
            &findings,
        ),
        ConditionStatus::Unmet => {
            let missing = missing_kmp_items(state, &coverage);
            await_input(stage, missing, coverage.detail.clone(), &findings, now)
        }
        ConditionStatus::Unavailable => await_input(
            stage,
            vec![MissingItem {
                name: "kmp_shareholding_details".to_string(),
                reason: coverage.detail.clone(),
            }],
            coverage.detail.clone(),
            &findings,
            now,
        ),
    }
}

/// Collaborators may name the exact KMPs whose KYC is outstanding; fall back
/// to a generic request when they do not.
fn missing_kmp_items(state: &ApplicationState, coverage: &ConditionFinding) -> Vec<MissingItem> {
    let named = state
        .stage_outputs
        .get(&WorkflowStage::EntityIdentification)
        .and_then(|out| out.data.get("kmp_missing"))
        .and_then(serde_json::Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(serde_json::Value::as_str)
                .map(|name| MissingItem {
                    name: name.to_string(),
                    reason: coverage.detail.clone(),
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if named.is_empty() {
        vec![MissingItem {
            name: "kmp_kyc_documents".to_string(),
            reason: coverage.detail.clone(),
        }]
    } else {
        named
    }
}

fn verification_compliance(
    state: &ApplicationState,
    config: &RoutingConfig,
    now: DateTime<Utc>,
) -> RoutingDecision {
    let stage = WorkflowStage::VerificationCompliance;
    let eligibility = evaluate(ConditionKind::EligibilityCleared, state, config);
    let bureau = evaluate(ConditionKind::BureauScoresAcceptable, state, config);
    let findings = [&eligibility, &bureau];

    match eligibility.status {
        ConditionStatus::Unmet => {
            return decision(RouteOutcome::Reject, eligibility.detail.clone(), &findings);
        }
        ConditionStatus::Unavailable => {
            return decision(RouteOutcome::Fail, eligibility.detail.clone(), &findings);
        }
        ConditionStatus::Met => {}
    }
    match bureau.status {
        ConditionStatus::Met => decision(
            RouteOutcome::Proceed(WorkflowStage::FinancialAnalysis),
            "compliance checks and bureau scores within thresholds",
            &findings,
        ),
        ConditionStatus::Unmet => decision(RouteOutcome::Reject, bureau.detail.clone(), &findings),
        // Bureau pulls can lag; suspend for the report instead of rejecting
        // an application whose scores were never observed.
        ConditionStatus::Unavailable => await_input(
            stage,
            vec![MissingItem {
                name: "bureau_report".to_string(),
                reason: bureau.detail.clone(),
            }],
            bureau.detail.clone(),
            &findings,
            now,
        ),
    }
}

fn financial_analysis(
    state: &ApplicationState,
    config: &RoutingConfig,
    now: DateTime<Utc>,
) -> RoutingDecision {
    let stage = WorkflowStage::FinancialAnalysis;
    let capacity = evaluate(ConditionKind::ServicingCapacityComputed, state, config);
    let banking_docs = evaluate(ConditionKind::BankingDocumentsPresent, state, config);
    let findings = [&capacity, &banking_docs];

    if !capacity.status.is_met() {
        return decision(RouteOutcome::Fail, capacity.detail.clone(), &findings);
    }
    if banking_docs.status.is_met() {
        return decision(
            RouteOutcome::Proceed(WorkflowStage::BankingAnalysis),
            "financial analysis complete, bank statements available for validation",
            &findings,
        );
    }
    if config.skip_banking_without_statements {
        return decision(
            RouteOutcome::Proceed(WorkflowStage::FinalAssembly),
            "no bank statements uploaded, banking analysis bypassed",
            &findings,
        );
    }
    await_input(
        stage,
        vec![MissingItem {
            name: "bank_statements".to_string(),
            reason: banking_docs.detail.clone(),
        }],
        banking_docs.detail.clone(),
        &findings,
        now,
    )
}

fn banking_analysis(state: &ApplicationState, config: &RoutingConfig) -> RoutingDecision {
    let completed = evaluate(ConditionKind::BankingAnalysisCompleted, state, config);
    let findings = [&completed];
    if completed.status.is_met() {
        decision(
            RouteOutcome::Proceed(WorkflowStage::FinalAssembly),
            "banking analysis complete",
            &findings,
        )
    } else {
        decision(RouteOutcome::Fail, completed.detail.clone(), &findings)
    }
}

fn final_assembly(state: &ApplicationState, config: &RoutingConfig) -> RoutingDecision {
    let report = evaluate(ConditionKind::ReportAssembled, state, config);
    let findings = [&report];
    if report.status.is_met() {
        decision(RouteOutcome::Complete, report.detail.clone(), &findings)
    } else {
        decision(RouteOutcome::Fail, report.detail.clone(), &findings)
    }
}
