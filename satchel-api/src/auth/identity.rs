//! Client bearer tokens
//!
//! HS256 JWTs carrying `sub`, `email`, `email_verified` and `name`. The
//! `AuthenticatedUser` extractor verifies the `Authorization: Bearer` header
//! and hands the verified identity to the handler.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use satchel_common::ports::{IdentityVerifier, VerifiedIdentity};
use satchel_common::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ApiError;
use crate::AppState;

/// Claims of a client bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientClaims {
    /// Stable identity
    pub sub: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub name: String,
    /// Expiration (Unix timestamp)
    pub exp: u64,
}

/// Verifies HS256 client tokens against a shared secret
pub struct JwtIdentityVerifier {
    /// None when no secret is configured: every token is rejected
    decoding_key: Option<DecodingKey>,
    validation: Validation,
}

impl JwtIdentityVerifier {
    pub fn new(secret: Option<&str>) -> Self {
        Self {
            decoding_key: secret.map(|s| DecodingKey::from_secret(s.as_bytes())),
            validation: Validation::default(),
        }
    }
}

impl IdentityVerifier for JwtIdentityVerifier {
    fn verify(&self, token: &str) -> Result<VerifiedIdentity> {
        let key = self
            .decoding_key
            .as_ref()
            .ok_or_else(|| Error::Unauthorized("client authentication not configured".to_string()))?;

        let data = decode::<ClientClaims>(token, key, &self.validation).map_err(|e| {
            let reason = match e.kind() {
                ErrorKind::ExpiredSignature => "token expired".to_string(),
                ErrorKind::InvalidSignature => "invalid signature".to_string(),
                _ => format!("invalid token: {}", e),
            };
            Error::Unauthorized(reason)
        })?;

        let claims = data.claims;
        if claims.sub.is_empty() {
            return Err(Error::Unauthorized("token has no subject".to_string()));
        }

        Ok(VerifiedIdentity {
            identity: claims.sub,
            email: claims.email,
            email_verified: claims.email_verified,
            display_name: claims.name,
        })
    }
}

/// Sign a client token (operator tooling and tests)
pub fn sign_client_token(secret: &str, claims: &ClientClaims) -> Result<String> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| Error::Internal(format!("Failed to sign token: {}", e)))
}

/// Token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Verified caller, without any tenant or activation check
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub VerifiedIdentity);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> std::result::Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| Error::Unauthorized("missing bearer token".to_string()))?;

        let verified = state.verifier.verify(token).map_err(|e| {
            debug!(error = %e, "Bearer token rejected");
            e
        })?;

        Ok(AuthenticatedUser(verified))
    }
}
