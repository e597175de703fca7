//! Error types for satchel-api
//!
//! Every domain error maps to one status code and one machine-readable
//! `detail` string. Infrastructure failures are logged in full and answered
//! with the generic internal-error body only.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use satchel_common::{Error, ValidationError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Detail code of the generic 500 body
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Domain or infrastructure error from the service layer
    #[error(transparent)]
    Common(#[from] Error),

    /// Handler-local internal failure (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Common(Error::Validation(err))
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Common(Error::Database(err))
    }
}

impl ApiError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ApiError::Common(Error::NotFound(what.into()))
    }

    /// Status code and detail string for this error
    pub fn status_and_detail(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Common(err) => classify(err),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR),
        }
    }
}

fn classify(err: &Error) -> (StatusCode, &'static str) {
    match err {
        Error::Validation(v) => match v {
            ValidationError::FileTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE"),
            ValidationError::TooManyPages { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "TOO_MANY_PAGES")
            }
            ValidationError::Unparseable(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "UNPARSEABLE_DOCUMENT")
            }
            ValidationError::MissingFields(_) => (StatusCode::UNPROCESSABLE_ENTITY, "MISSING_FIELDS"),
            ValidationError::InvalidUpload(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_UPLOAD"),
        },
        Error::QuotaExceeded { .. } => (StatusCode::PAYMENT_REQUIRED, "QUOTA_EXCEEDED"),
        Error::NotActivated(_) => (StatusCode::FORBIDDEN, "ACTIVATION_REQUIRED"),
        Error::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
        Error::EmailMismatch => (StatusCode::FORBIDDEN, "EMAIL_MISMATCH"),
        Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        Error::InvitationUnavailable(_) => (StatusCode::BAD_REQUEST, "INVITATION_INVALID"),
        Error::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        Error::Database(_)
        | Error::Io(_)
        | Error::Config(_)
        | Error::Storage(_)
        | Error::Classifier(_)
        | Error::Queue(_)
        | Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR),
    }
}

/// Generic 500 response; carries no internal detail
pub fn internal_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "detail": INTERNAL_ERROR })),
    )
        .into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = self.status_and_detail();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "Request failed with internal error");
            return internal_error_response();
        }

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
