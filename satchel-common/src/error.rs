//! Common error types for satchel
//!
//! One enum covers both the domain failures that reach clients with a stable
//! status code and the infrastructure failures that collapse into a generic
//! internal error at the HTTP boundary.

use thiserror::Error;

/// Common result type for satchel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Upload size/shape failures
///
/// Oversized files and structurally broken files are distinct kinds so clients
/// can tell "make it smaller" apart from "this file is corrupt".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Byte size above the configured ceiling
    #[error("file too large: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge { size: usize, limit: usize },

    /// PDF page count above the configured ceiling
    #[error("document has {pages} pages, limit is {limit}")]
    TooManyPages { pages: usize, limit: usize },

    /// File failed structural parsing (e.g. corrupt PDF)
    #[error("document could not be parsed: {0}")]
    Unparseable(String),

    /// Required request fields absent
    #[error("missing required fields: {0}")]
    MissingFields(String),

    /// Malformed upload request (multipart framing, empty file)
    #[error("invalid upload: {0}")]
    InvalidUpload(String),
}

/// Common error types across satchel
#[derive(Error, Debug)]
pub enum Error {
    /// Upload or request shape rejected
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Free plan monthly document cap reached
    #[error("Monthly document quota exceeded (limit {limit})")]
    QuotaExceeded { limit: i64 },

    /// Authenticated identity has not been activated
    #[error("Identity {0} is not activated")]
    NotActivated(String),

    /// Caller lacks the role or ownership for the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Invitation target email differs from the caller's verified email
    #[error("Invitation email does not match caller")]
    EmailMismatch,

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invitation token already accepted or past expiry
    #[error("Invitation is no longer valid: {0}")]
    InvitationUnavailable(String),

    /// Missing or invalid credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Blob storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// External classifier failure
    #[error("Classifier error: {0}")]
    Classifier(String),

    /// Job queue dispatch failure
    #[error("Queue error: {0}")]
    Queue(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures a client caused (as opposed to infrastructure faults)
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::QuotaExceeded { .. }
                | Error::NotActivated(_)
                | Error::Forbidden(_)
                | Error::EmailMismatch
                | Error::NotFound(_)
                | Error::InvitationUnavailable(_)
                | Error::Unauthorized(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_converts_into_error() {
        let err: Error = ValidationError::TooManyPages { pages: 4, limit: 3 }.into();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::TooManyPages { pages: 4, limit: 3 })
        ));
        assert!(err.is_domain());
    }

    #[test]
    fn test_infrastructure_errors_are_not_domain() {
        assert!(!Error::Storage("disk full".into()).is_domain());
        assert!(!Error::Classifier("timeout".into()).is_domain());
        assert!(!Error::Internal("boom".into()).is_domain());
    }
}
