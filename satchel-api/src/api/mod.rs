//! HTTP API handlers for satchel-api

pub mod documents;
pub mod events;
pub mod families;
pub mod health;
pub mod ical;
pub mod profiles;
pub mod push_subscriptions;
pub mod settings;
pub mod tasks;
pub mod worker;

pub use documents::document_routes;
pub use events::event_routes;
pub use families::family_routes;
pub use health::health_routes;
pub use ical::ical_routes;
pub use profiles::profile_routes;
pub use push_subscriptions::push_subscription_routes;
pub use settings::settings_routes;
pub use tasks::task_routes;
pub use worker::worker_routes;

use axum::response::Response;
use std::any::Any;
use uuid::Uuid;

use crate::error::{internal_error_response, ApiError};

/// Turn a handler panic into the generic 500 body
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    tracing::error!(panic = %detail, "Handler panicked");
    internal_error_response()
}

/// Parse a path id; malformed ids are reported as not found
pub(crate) fn parse_path_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::not_found(format!("{} {}", what, raw)))
}
