//! Worker endpoint authentication
//!
//! `/worker/*` is called by the job queue and the scheduler with a signed
//! HS256 token whose `email` claim must equal the configured worker
//! principal. With no principal or secret configured every call is refused.
//! Verification can be switched off for local development
//! (`worker.verify_tokens = false`).

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use satchel_common::config::WorkerConfig;
use satchel_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

use crate::error::ApiError;
use crate::AppState;

/// Claims of a queue-issued worker token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerClaims {
    pub sub: String,
    pub email: String,
    pub iat: u64,
    pub exp: u64,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Sign a worker token for `principal`, valid for `ttl`
pub fn sign_worker_token(secret: &str, principal: &str, ttl: Duration) -> Result<String> {
    let now = unix_now();
    let claims = WorkerClaims {
        sub: principal.to_string(),
        email: principal.to_string(),
        iat: now,
        exp: now + ttl.as_secs(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| Error::Internal(format!("Failed to sign worker token: {}", e)))
}

/// Worker token policy derived from configuration
#[derive(Debug, Clone)]
pub struct WorkerAuth {
    principal: Option<String>,
    secret: Option<String>,
    verify: bool,
}

impl WorkerAuth {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            principal: config.principal.clone(),
            secret: config.token_secret.clone(),
            verify: config.verify_tokens,
        }
    }

    /// Check an `Authorization` header value
    pub fn check(&self, authorization: Option<&str>) -> Result<()> {
        if !self.verify {
            return Ok(());
        }

        let (Some(principal), Some(secret)) = (&self.principal, &self.secret) else {
            return Err(Error::Unauthorized("worker principal not configured".to_string()));
        };

        let token = authorization
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Unauthorized("missing worker token".to_string()))?;

        let data = decode::<WorkerClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| Error::Unauthorized(format!("invalid worker token: {}", e)))?;

        if &data.claims.email != principal {
            return Err(Error::Unauthorized(format!(
                "unexpected worker principal {}",
                data.claims.email
            )));
        }

        Ok(())
    }
}

/// Middleware guarding `/worker/*`
pub async fn worker_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> std::result::Result<Response, ApiError> {
    let authorization = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if let Err(e) = state.worker_auth.check(authorization) {
        warn!(path = %request.uri().path(), error = %e, "Worker call rejected");
        return Err(e.into());
    }

    Ok(next.run(request).await)
}
