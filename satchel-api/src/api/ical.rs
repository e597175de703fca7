//! Public calendar feed
//!
//! The per-identity token in the path is the only credential.

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

const CALENDAR_NAME: &str = "Satchel";
const FEED_FILENAME: &str = "satchel.ics";

/// GET /ical/:token
pub async fn get_feed(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .users
        .find_by_ical_token(&token)
        .await?
        .ok_or_else(|| ApiError::not_found("calendar feed"))?;

    let events = match user.family_id {
        Some(family_id) => state.documents.list_events(family_id, None, None).await?,
        None => Vec::new(),
    };
    debug!(identity = %user.identity, events = events.len(), "Rendering calendar feed");

    let body = state.calendar.render(CALENDAR_NAME, &events);

    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", FEED_FILENAME),
            ),
        ],
        body,
    ))
}

pub fn ical_routes() -> Router<AppState> {
    Router::new().route("/ical/:token", get(get_feed))
}
