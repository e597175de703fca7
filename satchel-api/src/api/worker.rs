//! Internal worker endpoints
//!
//! Called by the job queue and the scheduler, never by clients. Every route
//! sits behind [`worker_auth_middleware`]. An analysis failure answers 500 so
//! the queue applies its own redelivery policy.

use axum::{extract::State, middleware, routing::post, Json, Router};
use chrono::Utc;
use satchel_common::models::AnalysisJob;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::worker_auth_middleware;
use crate::error::ApiResult;
use crate::services::{AnalysisOutcome, FanOutSummary};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub status: &'static str,
    pub document_id: Uuid,
}

/// POST /worker/analyze
pub async fn analyze(
    State(state): State<AppState>,
    Json(job): Json<AnalysisJob>,
) -> ApiResult<Json<AnalyzeResponse>> {
    let status = match state.worker.analyze(&job).await? {
        AnalysisOutcome::Completed => "completed",
        AnalysisOutcome::AlreadyFinished(_) | AnalysisOutcome::Missing => "skipped",
    };

    Ok(Json(AnalyzeResponse {
        status,
        document_id: job.document_id,
    }))
}

/// POST /worker/morning-digest
pub async fn morning_digest(State(state): State<AppState>) -> ApiResult<Json<FanOutSummary>> {
    let today = Utc::now().date_naive();
    Ok(Json(state.digests.morning_digest(today).await?))
}

/// POST /worker/event-reminder
pub async fn event_reminder(State(state): State<AppState>) -> ApiResult<Json<FanOutSummary>> {
    let today = Utc::now().date_naive();
    Ok(Json(state.digests.event_reminder(today).await?))
}

/// Build worker routes
///
/// Uses `route_layer` so unknown paths still answer 404 rather than 401.
pub fn worker_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/worker/analyze", post(analyze))
        .route("/worker/morning-digest", post(morning_digest))
        .route("/worker/event-reminder", post(event_reminder))
        .route_layer(middleware::from_fn_with_state(state, worker_auth_middleware))
}
