//! Family member profiles (classifier context)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use satchel_common::models::Profile;
use serde::Deserialize;

use super::parse_path_id;
use crate::auth::FamilyContext;
use crate::error::ApiResult;
use crate::services::ProfileInput;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub grade: String,
    #[serde(default)]
    pub keywords: String,
}

impl From<ProfileRequest> for ProfileInput {
    fn from(req: ProfileRequest) -> Self {
        Self {
            name: req.name,
            grade: req.grade,
            keywords: req.keywords,
        }
    }
}

/// GET /profiles
pub async fn list_profiles(
    FamilyContext(ctx): FamilyContext,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<Profile>>> {
    Ok(Json(state.tenants.list_profiles(ctx.family_id).await?))
}

/// POST /profiles
pub async fn create_profile(
    FamilyContext(ctx): FamilyContext,
    State(state): State<AppState>,
    Json(req): Json<ProfileRequest>,
) -> ApiResult<(StatusCode, Json<Profile>)> {
    let profile = state.tenants.create_profile(&ctx, req.into()).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// PUT /profiles/:id
pub async fn update_profile(
    FamilyContext(ctx): FamilyContext,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ProfileRequest>,
) -> ApiResult<Json<Profile>> {
    let id = parse_path_id(&id, "profile")?;
    Ok(Json(state.tenants.update_profile(&ctx, id, req.into()).await?))
}

/// DELETE /profiles/:id
pub async fn delete_profile(
    FamilyContext(ctx): FamilyContext,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_path_id(&id, "profile")?;
    state.tenants.delete_profile(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/profiles", get(list_profiles).post(create_profile))
        .route("/profiles/:id", put(update_profile).delete(delete_profile))
}
