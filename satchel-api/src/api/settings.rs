//! Personal settings: notification preferences and calendar feed link

use axum::{extract::State, routing::get, Json, Router};
use satchel_common::models::{Plan, PreferenceUpdate};
use satchel_common::tokens;
use serde::Serialize;

use crate::auth::FamilyContext;
use crate::error::{ApiError, ApiResult};
use crate::services::RequestContext;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub plan: Plan,
    pub documents_this_month: i64,
    pub ical_url: String,
    pub notification_email: bool,
    pub notification_web_push: bool,
}

async fn settings_for(state: &AppState, ctx: &RequestContext) -> ApiResult<SettingsResponse> {
    let family = state.tenants.current_family(ctx.family_id).await?;
    let ical_token = state
        .users
        .ensure_ical_token(&ctx.identity, &tokens::generate_token())
        .await?;
    let user = state
        .users
        .get(&ctx.identity)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("user {}", ctx.identity)))?;

    Ok(SettingsResponse {
        plan: family.plan,
        documents_this_month: family.documents_this_month,
        ical_url: state.config.ical_url(&ical_token),
        notification_email: user.notify_email,
        notification_web_push: user.notify_web_push,
    })
}

/// GET /settings
///
/// Creates the calendar feed token on first read.
pub async fn get_settings(
    FamilyContext(ctx): FamilyContext,
    State(state): State<AppState>,
) -> ApiResult<Json<SettingsResponse>> {
    Ok(Json(settings_for(&state, &ctx).await?))
}

/// PATCH /settings
///
/// Only the preferences present in the body change.
pub async fn update_settings(
    FamilyContext(ctx): FamilyContext,
    State(state): State<AppState>,
    Json(update): Json<PreferenceUpdate>,
) -> ApiResult<Json<SettingsResponse>> {
    state.users.update_preferences(&ctx.identity, &update).await?;
    Ok(Json(settings_for(&state, &ctx).await?))
}

pub fn settings_routes() -> Router<AppState> {
    Router::new().route("/settings", get(get_settings).patch(update_settings))
}
