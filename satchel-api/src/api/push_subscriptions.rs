//! Push subscription registration

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use satchel_common::models::SubscriptionKeys;
use satchel_common::ValidationError;
use serde::Deserialize;

use crate::auth::FamilyContext;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct KeysRequest {
    pub p256dh: Option<String>,
    pub auth: Option<String>,
}

/// Browser `PushSubscription.toJSON()` shape; every field optional so a
/// missing one is reported as `MISSING_FIELDS`
#[derive(Debug, Default, Deserialize)]
pub struct SubscribeRequest {
    pub endpoint: Option<String>,
    pub keys: Option<KeysRequest>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UnsubscribeRequest {
    pub endpoint: Option<String>,
}

/// POST /push-subscriptions
pub async fn subscribe(
    FamilyContext(ctx): FamilyContext,
    State(state): State<AppState>,
    body: Option<Json<SubscribeRequest>>,
) -> ApiResult<StatusCode> {
    let Json(req) = body.unwrap_or_default();

    let keys = req.keys.unwrap_or_default();
    let (Some(endpoint), Some(p256dh), Some(auth)) = (req.endpoint, keys.p256dh, keys.auth) else {
        return Err(ValidationError::MissingFields("endpoint, keys.p256dh, keys.auth".to_string()).into());
    };

    state
        .notifications
        .register(&ctx.identity, &endpoint, SubscriptionKeys { p256dh, auth })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /push-subscriptions/unsubscribe
///
/// Without an endpoint every device of the caller is removed.
pub async fn unsubscribe(
    FamilyContext(ctx): FamilyContext,
    State(state): State<AppState>,
    body: Option<Json<UnsubscribeRequest>>,
) -> ApiResult<StatusCode> {
    let Json(req) = body.unwrap_or_default();
    state
        .notifications
        .remove(&ctx.identity, req.endpoint.as_deref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn push_subscription_routes() -> Router<AppState> {
    Router::new()
        .route("/push-subscriptions", post(subscribe))
        .route("/push-subscriptions/unsubscribe", post(unsubscribe))
}
