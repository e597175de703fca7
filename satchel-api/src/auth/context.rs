//! Tenant context extractors
//!
//! `FamilyContext` requires a verified, activated identity and resolves (or
//! auto-provisions) its family. `OwnerContext` additionally requires the
//! `owner` role.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use super::identity::AuthenticatedUser;
use crate::error::ApiError;
use crate::services::{require_owner, RequestContext};
use crate::AppState;

#[derive(Debug, Clone)]
pub struct FamilyContext(pub RequestContext);

#[async_trait]
impl FromRequestParts<AppState> for FamilyContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(verified) = AuthenticatedUser::from_request_parts(parts, state).await?;
        let ctx = state.resolver.resolve(&verified).await?;
        Ok(FamilyContext(ctx))
    }
}

#[derive(Debug, Clone)]
pub struct OwnerContext(pub RequestContext);

#[async_trait]
impl FromRequestParts<AppState> for OwnerContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let FamilyContext(ctx) = FamilyContext::from_request_parts(parts, state).await?;
        require_owner(&ctx)?;
        Ok(OwnerContext(ctx))
    }
}
