//! Calendar events across all documents of the family

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use satchel_common::models::EventRecord;
use serde::Deserialize;

use crate::auth::FamilyContext;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EventQuery {
    /// Earliest start date, inclusive
    pub from: Option<NaiveDate>,
    /// Latest start date, inclusive (whole day)
    pub to: Option<NaiveDate>,
}

/// GET /events?from=YYYY-MM-DD&to=YYYY-MM-DD
pub async fn list_events(
    FamilyContext(ctx): FamilyContext,
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
) -> ApiResult<Json<Vec<EventRecord>>> {
    let events = state
        .documents
        .list_events(ctx.family_id, query.from, query.to)
        .await?;
    Ok(Json(events))
}

pub fn event_routes() -> Router<AppState> {
    Router::new().route("/events", get(list_events))
}
