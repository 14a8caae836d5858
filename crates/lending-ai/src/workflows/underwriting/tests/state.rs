use std::collections::BTreeSet;

use super::common::*;
use crate::workflows::underwriting::domain::{
    CurrentStage, InputRequest, MissingItem, StageDisposition, SuppliedInput, WorkflowStage,
    WorkflowStatus,
};
use crate::workflows::underwriting::routing::{RouteOutcome, RoutingDecision};
use crate::workflows::underwriting::state::{ApplicationState, StateError};

fn proceed_decision(next: WorkflowStage) -> RoutingDecision {
    RoutingDecision {
        outcome: RouteOutcome::Proceed(next),
        reason_code: "test proceed".to_string(),
        satisfied_conditions: BTreeSet::from(["documents_classified".to_string()]),
    }
}

fn await_decision(stage: WorkflowStage) -> RoutingDecision {
    RoutingDecision {
        outcome: RouteOutcome::AwaitInput(InputRequest {
            stage,
            missing: vec![MissingItem {
                name: "borrower_pan_card".to_string(),
                reason: "no borrower PAN card among classified documents".to_string(),
            }],
            requested_at: fixed_now(),
        }),
        reason_code: "awaiting borrower PAN".to_string(),
        satisfied_conditions: BTreeSet::new(),
    }
}

#[test]
fn new_state_starts_at_first_stage_with_version_zero() {
    let state = new_state();
    assert_eq!(state.version, 0);
    assert_eq!(state.status, WorkflowStatus::InProgress);
    assert_eq!(state.active_stage(), Some(WorkflowStage::DocumentClassification));
    assert!(state.stage_history.is_empty());
    assert!(state.pending_input.is_none());
}

#[test]
fn apply_appends_history_and_bumps_version() {
    let state = new_state();
    let next = state.apply(
        WorkflowStage::DocumentClassification,
        classification_output(1, 1, 0.9),
        fixed_now(),
        fixed_now(),
    );

    assert_eq!(next.version, 1);
    assert_eq!(next.stage_history.len(), 1);
    assert_eq!(next.stage_history[0].stage, WorkflowStage::DocumentClassification);
    assert_eq!(next.stage_history[0].disposition, StageDisposition::Completed);
    assert!(next
        .stage_outputs
        .contains_key(&WorkflowStage::DocumentClassification));
    // The original snapshot is untouched.
    assert_eq!(state.version, 0);
    assert!(state.stage_history.is_empty());
}

#[test]
fn reapplying_a_stage_overwrites_the_output_slot_but_extends_history() {
    let state = new_state();
    let first = state.apply(
        WorkflowStage::DocumentClassification,
        classification_output(0, 0, 0.9),
        fixed_now(),
        fixed_now(),
    );
    let second = first.apply(
        WorkflowStage::DocumentClassification,
        classification_output(1, 1, 0.95),
        fixed_now(),
        fixed_now(),
    );

    assert_eq!(second.stage_history.len(), 2);
    assert_eq!(second.stage_outputs.len(), 1);
    let output = &second.stage_outputs[&WorkflowStage::DocumentClassification];
    assert_eq!(output.integer("borrower_pan_count"), Some(1));
}

#[test]
fn record_decision_proceed_moves_the_stage_pointer() {
    let state = new_state().apply(
        WorkflowStage::DocumentClassification,
        classification_output(1, 1, 0.9),
        fixed_now(),
        fixed_now(),
    );
    let decided = state.record_decision(
        &proceed_decision(WorkflowStage::EntityIdentification),
        fixed_now(),
    );

    assert_eq!(decided.active_stage(), Some(WorkflowStage::EntityIdentification));
    assert_eq!(decided.status, WorkflowStatus::InProgress);
    assert_eq!(decided.version, 2);
    let record = decided.stage_history.last().expect("history entry");
    assert_eq!(record.routing_reason.as_deref(), Some("test proceed"));
    assert_eq!(record.satisfied_conditions, vec!["documents_classified".to_string()]);
}

#[test]
fn record_decision_await_input_keeps_the_requesting_stage_current() {
    let state = new_state().apply(
        WorkflowStage::DocumentClassification,
        classification_output(0, 0, 0.9),
        fixed_now(),
        fixed_now(),
    );
    let decided = state.record_decision(
        &await_decision(WorkflowStage::DocumentClassification),
        fixed_now(),
    );

    assert_eq!(decided.status, WorkflowStatus::AwaitingInput);
    assert_eq!(decided.active_stage(), Some(WorkflowStage::DocumentClassification));
    let request = decided.pending_input.as_ref().expect("pending input");
    assert_eq!(request.missing.len(), 1);
    assert_eq!(request.missing[0].name, "borrower_pan_card");
}

#[test]
fn record_decision_terminal_outcomes_clear_the_active_stage() {
    let base = new_state().apply(
        WorkflowStage::EntityIdentification,
        entity_output("trust", 0.9),
        fixed_now(),
        fixed_now(),
    );

    let rejected = base.record_decision(
        &RoutingDecision {
            outcome: RouteOutcome::Reject,
            reason_code: "ineligible constitution".to_string(),
            satisfied_conditions: BTreeSet::new(),
        },
        fixed_now(),
    );
    assert_eq!(rejected.status, WorkflowStatus::Rejected);
    assert_eq!(rejected.current_stage, CurrentStage::Terminal);
    assert!(rejected.is_terminal());
    assert_eq!(rejected.active_stage(), None);
}

#[test]
fn supply_input_rejected_unless_awaiting() {
    let state = new_state();
    let result = state.supply_input(
        SuppliedInput {
            documents: Vec::new(),
            fields: serde_json::Value::Null,
        },
        fixed_now(),
    );
    assert!(matches!(
        result,
        Err(StateError::NotAwaitingInput {
            status: WorkflowStatus::InProgress
        })
    ));
}

#[test]
fn supply_input_merges_documents_and_resumes_the_requesting_stage() {
    let awaiting = new_state()
        .apply(
            WorkflowStage::DocumentClassification,
            classification_output(0, 0, 0.9),
            fixed_now(),
            fixed_now(),
        )
        .record_decision(
            &await_decision(WorkflowStage::DocumentClassification),
            fixed_now(),
        );

    let resumed = awaiting
        .supply_input(
            SuppliedInput {
                documents: vec![document("pan_card_front.pdf", "application/pdf")],
                fields: serde_json::json!({ "pan_number": "ABCDE1234F" }),
            },
            fixed_now(),
        )
        .expect("input accepted");

    assert_eq!(resumed.status, WorkflowStatus::InProgress);
    assert_eq!(resumed.active_stage(), Some(WorkflowStage::DocumentClassification));
    assert!(resumed.pending_input.is_none());
    assert_eq!(resumed.submission.documents.len(), 4);
    assert_eq!(resumed.version, awaiting.version + 1);
    let fields = resumed
        .supplied_fields
        .get(&WorkflowStage::DocumentClassification)
        .expect("fields recorded");
    assert_eq!(fields["pan_number"], "ABCDE1234F");
}

#[test]
fn fail_stage_is_terminal_and_records_the_error() {
    let state = new_state();
    let failed = state.fail_stage(
        WorkflowStage::DocumentClassification,
        "transient stage failure: classifier unreachable",
        fixed_now(),
        fixed_now(),
    );

    assert_eq!(failed.status, WorkflowStatus::Failed);
    assert_eq!(failed.current_stage, CurrentStage::Terminal);
    let record = failed.stage_history.last().expect("history entry");
    assert_eq!(record.routing_reason.as_deref(), Some("stage_retries_exhausted"));
    assert!(record
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("classifier unreachable"));
}

#[test]
fn cancel_records_the_reason_against_the_active_stage() {
    let state = new_state();
    let cancelled = state.cancel("cancelled by operator", fixed_now());

    assert_eq!(cancelled.status, WorkflowStatus::Failed);
    assert!(cancelled.is_terminal());
    let record = cancelled.stage_history.last().expect("history entry");
    assert_eq!(record.stage, WorkflowStage::DocumentClassification);
    assert_eq!(record.routing_reason.as_deref(), Some("cancelled by operator"));
}

#[test]
fn status_view_surfaces_the_latest_rationale_and_missing_items() {
    let awaiting = new_state()
        .apply(
            WorkflowStage::DocumentClassification,
            classification_output(0, 0, 0.9),
            fixed_now(),
            fixed_now(),
        )
        .record_decision(
            &await_decision(WorkflowStage::DocumentClassification),
            fixed_now(),
        );

    let view = awaiting.status_view();
    assert_eq!(view.status, "awaiting_input");
    assert_eq!(view.current_stage, Some("document_classification"));
    assert_eq!(view.decision_rationale, "awaiting borrower PAN");
    assert_eq!(view.missing.as_ref().map(Vec::len), Some(1));
}

#[test]
fn checkpoint_state_survives_serialization() {
    let state = new_state()
        .apply(
            WorkflowStage::DocumentClassification,
            classification_output(1, 1, 0.9),
            fixed_now(),
            fixed_now(),
        )
        .record_decision(
            &proceed_decision(WorkflowStage::EntityIdentification),
            fixed_now(),
        );

    let encoded = serde_json::to_string(&state).expect("serialize");
    let decoded: ApplicationState = serde_json::from_str(&encoded).expect("deserialize");
    assert_eq!(decoded, state);
}
