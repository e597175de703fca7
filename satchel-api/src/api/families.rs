//! Family, membership and invitation endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use satchel_common::models::{Family, Member, Plan, Role};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{AuthenticatedUser, FamilyContext, OwnerContext};
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct FamilyResponse {
    pub id: Uuid,
    pub name: String,
    pub plan: Plan,
    /// Post-reset monthly counter
    pub documents_this_month: i64,
    pub role: Role,
}

impl FamilyResponse {
    fn new(family: Family, role: Role) -> Self {
        Self {
            id: family.id,
            name: family.name,
            plan: family.plan,
            documents_this_month: family.documents_this_month,
            role,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MemberResponse {
    pub identity: String,
    pub role: Role,
    pub display_name: String,
    pub email: String,
    pub joined_at: DateTime<Utc>,
}

impl From<Member> for MemberResponse {
    fn from(m: Member) -> Self {
        Self {
            identity: m.identity,
            role: m.role,
            display_name: m.display_name,
            email: m.email,
            joined_at: m.joined_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct InviteResponse {
    pub invitation_id: Uuid,
    pub invite_url: String,
}

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub family_id: Uuid,
    pub name: String,
    pub role: Role,
}

/// GET /families/me
pub async fn get_my_family(
    FamilyContext(ctx): FamilyContext,
    State(state): State<AppState>,
) -> ApiResult<Json<FamilyResponse>> {
    let family = state.tenants.current_family(ctx.family_id).await?;
    Ok(Json(FamilyResponse::new(family, ctx.role)))
}

/// POST /families
///
/// Renames the caller's family.
pub async fn rename_family(
    FamilyContext(ctx): FamilyContext,
    State(state): State<AppState>,
    Json(req): Json<RenameRequest>,
) -> ApiResult<(StatusCode, Json<FamilyResponse>)> {
    let family = state.tenants.rename(&ctx, &req.name).await?;
    Ok((StatusCode::CREATED, Json(FamilyResponse::new(family, ctx.role))))
}

/// GET /families/members
pub async fn list_members(
    FamilyContext(ctx): FamilyContext,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<MemberResponse>>> {
    let members = state.tenants.list_members(&ctx).await?;
    Ok(Json(members.into_iter().map(MemberResponse::from).collect()))
}

/// POST /families/invite (owner only)
pub async fn invite(
    OwnerContext(ctx): OwnerContext,
    State(state): State<AppState>,
    Json(req): Json<InviteRequest>,
) -> ApiResult<(StatusCode, Json<InviteResponse>)> {
    let issued = state.tenants.invite(&ctx, &req.email).await?;
    Ok((
        StatusCode::CREATED,
        Json(InviteResponse {
            invitation_id: issued.invitation.id,
            invite_url: issued.invite_url,
        }),
    ))
}

/// POST /families/join
///
/// Requires a bearer token but not activation: redeeming an invitation is
/// how a new identity gets activated.
pub async fn join(
    AuthenticatedUser(verified): AuthenticatedUser,
    State(state): State<AppState>,
    Json(req): Json<JoinRequest>,
) -> ApiResult<Json<JoinResponse>> {
    let joined = state.tenants.join(&verified, req.token.trim()).await?;
    Ok(Json(JoinResponse {
        family_id: joined.family.id,
        name: joined.family.name,
        role: joined.role,
    }))
}

/// DELETE /families/members/:identity (owner only)
pub async fn remove_member(
    OwnerContext(ctx): OwnerContext,
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> ApiResult<StatusCode> {
    state.tenants.remove_member(&ctx, &identity).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn family_routes() -> Router<AppState> {
    Router::new()
        .route("/families", post(rename_family))
        .route("/families/me", get(get_my_family))
        .route("/families/members", get(list_members))
        .route("/families/members/:identity", delete(remove_member))
        .route("/families/invite", post(invite))
        .route("/families/join", post(join))
}
