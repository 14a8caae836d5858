use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;

use super::checkpoint::CheckpointStore;
use super::domain::{LoanSubmission, SuppliedInput, ThreadId};
use super::engine::{EngineError, OrchestrationEngine};
use super::state::StateError;

/// Default lookback window for the recovery sweep when the caller does not
/// provide one.
const DEFAULT_RESUME_LOOKBACK_SECS: i64 = 60;

/// Router builder exposing HTTP endpoints for loan workflow orchestration.
pub fn underwriting_router<S>(engine: Arc<OrchestrationEngine<S>>) -> Router
where
    S: CheckpointStore + 'static,
{
    Router::new()
        .route("/api/v1/loans", post(create_handler::<S>))
        .route("/api/v1/loans/resume", post(resume_handler::<S>))
        .route("/api/v1/loans/:thread_id", get(status_handler::<S>))
        .route("/api/v1/loans/:thread_id/advance", post(advance_handler::<S>))
        .route("/api/v1/loans/:thread_id/input", post(input_handler::<S>))
        .route("/api/v1/loans/:thread_id/cancel", post(cancel_handler::<S>))
        .with_state(engine)
}

fn error_response(error: EngineError) -> Response {
    let status = match &error {
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::State(StateError::NotAwaitingInput { .. }) => StatusCode::CONFLICT,
        EngineError::StageNotRegistered(_) | EngineError::Checkpoint(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let payload = json!({ "error": error.to_string() });
    (status, axum::Json(payload)).into_response()
}

pub(crate) async fn create_handler<S>(
    State(engine): State<Arc<OrchestrationEngine<S>>>,
    axum::Json(submission): axum::Json<LoanSubmission>,
) -> Response
where
    S: CheckpointStore + 'static,
{
    match engine.create(submission).await {
        Ok(state) => (StatusCode::ACCEPTED, axum::Json(state.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn status_handler<S>(
    State(engine): State<Arc<OrchestrationEngine<S>>>,
    Path(thread_id): Path<String>,
) -> Response
where
    S: CheckpointStore + 'static,
{
    match engine.state(&ThreadId(thread_id)).await {
        Ok(state) => (StatusCode::OK, axum::Json(state.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn advance_handler<S>(
    State(engine): State<Arc<OrchestrationEngine<S>>>,
    Path(thread_id): Path<String>,
) -> Response
where
    S: CheckpointStore + 'static,
{
    match engine.run_to_completion(&ThreadId(thread_id)).await {
        Ok(state) => (StatusCode::OK, axum::Json(state.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn input_handler<S>(
    State(engine): State<Arc<OrchestrationEngine<S>>>,
    Path(thread_id): Path<String>,
    axum::Json(input): axum::Json<SuppliedInput>,
) -> Response
where
    S: CheckpointStore + 'static,
{
    let thread_id = ThreadId(thread_id);
    match engine.supply_input(&thread_id, input).await {
        // Resuming immediately after input keeps the API interaction at one
        // round trip: the caller learns where the workflow settled next.
        Ok(_) => match engine.run_to_completion(&thread_id).await {
            Ok(state) => (StatusCode::OK, axum::Json(state.status_view())).into_response(),
            Err(error) => error_response(error),
        },
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CancelRequest {
    #[serde(default)]
    reason: Option<String>,
}

pub(crate) async fn cancel_handler<S>(
    State(engine): State<Arc<OrchestrationEngine<S>>>,
    Path(thread_id): Path<String>,
    axum::Json(request): axum::Json<CancelRequest>,
) -> Response
where
    S: CheckpointStore + 'static,
{
    let reason = request
        .reason
        .unwrap_or_else(|| "operator_cancelled".to_string());
    match engine.cancel(&ThreadId(thread_id), &reason).await {
        Ok(state) => (StatusCode::OK, axum::Json(state.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResumeRequest {
    #[serde(default)]
    lookback_secs: Option<i64>,
}

pub(crate) async fn resume_handler<S>(
    State(engine): State<Arc<OrchestrationEngine<S>>>,
    axum::Json(request): axum::Json<ResumeRequest>,
) -> Response
where
    S: CheckpointStore + 'static,
{
    let lookback = request
        .lookback_secs
        .unwrap_or(DEFAULT_RESUME_LOOKBACK_SECS);
    let cutoff = Utc::now() - Duration::seconds(lookback);
    match engine.resume_all(cutoff).await {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}
