//! satchel-api library
//!
//! Family document service: upload intake, analysis worker, tenants and
//! invitations, push notifications and the HTTP boundary in front of them.
//! Exposed as a library so integration tests can build the router directly.

pub mod adapters;
pub mod api;
pub mod auth;
pub mod db;
pub mod error;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use chrono::{DateTime, Utc};
use satchel_common::config::ServiceConfig;
use satchel_common::ports::{
    BlobStorage, CalendarFeedRenderer, DocumentClassifier, DocumentRepository, FamilyRepository,
    IdentityVerifier, JobQueue, PushTransport, SubscriptionRepository, UserRepository,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::adapters::IcalRenderer;
use crate::auth::WorkerAuth;
use crate::db::{
    SqliteDocumentRepository, SqliteFamilyRepository, SqliteSubscriptionRepository,
    SqliteUserRepository,
};
use crate::services::{
    AnalysisWorker, ContextResolver, DigestService, NotificationService, TenantRegistry,
    UploadIntake,
};

/// Port implementations the services are built from
#[derive(Clone)]
pub struct Ports {
    pub documents: Arc<dyn DocumentRepository>,
    pub families: Arc<dyn FamilyRepository>,
    pub users: Arc<dyn UserRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub blobs: Arc<dyn BlobStorage>,
    pub queue: Arc<dyn JobQueue>,
    pub classifier: Arc<dyn DocumentClassifier>,
    pub push: Arc<dyn PushTransport>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub calendar: Arc<dyn CalendarFeedRenderer>,
}

impl Ports {
    /// SQLite repositories on `pool` plus the given external collaborators
    pub fn sqlite(
        pool: SqlitePool,
        blobs: Arc<dyn BlobStorage>,
        queue: Arc<dyn JobQueue>,
        classifier: Arc<dyn DocumentClassifier>,
        push: Arc<dyn PushTransport>,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Self {
        Self {
            documents: Arc::new(SqliteDocumentRepository::new(pool.clone())),
            families: Arc::new(SqliteFamilyRepository::new(pool.clone())),
            users: Arc::new(SqliteUserRepository::new(pool.clone())),
            subscriptions: Arc::new(SqliteSubscriptionRepository::new(pool)),
            blobs,
            queue,
            classifier,
            push,
            verifier,
            calendar: Arc::new(IcalRenderer),
        }
    }
}

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub documents: Arc<dyn DocumentRepository>,
    pub users: Arc<dyn UserRepository>,
    pub blobs: Arc<dyn BlobStorage>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub calendar: Arc<dyn CalendarFeedRenderer>,
    pub tenants: Arc<TenantRegistry>,
    pub resolver: Arc<ContextResolver>,
    pub intake: Arc<UploadIntake>,
    pub worker: Arc<AnalysisWorker>,
    pub notifications: Arc<NotificationService>,
    pub digests: Arc<DigestService>,
    pub worker_auth: Arc<WorkerAuth>,
    /// Service startup timestamp for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Wire the services from configuration and port implementations
    pub fn new(config: ServiceConfig, ports: Ports) -> Self {
        let config = Arc::new(config);

        let tenants = Arc::new(TenantRegistry::new(
            ports.families.clone(),
            ports.users.clone(),
            config.clone(),
        ));
        let resolver = Arc::new(ContextResolver::new(
            ports.users.clone(),
            ports.families.clone(),
            tenants.clone(),
            config.clone(),
        ));
        let notifications = Arc::new(NotificationService::new(
            ports.users.clone(),
            ports.subscriptions.clone(),
            ports.push.clone(),
            config.push.enabled,
        ));
        let intake = Arc::new(UploadIntake::new(
            ports.documents.clone(),
            ports.families.clone(),
            ports.blobs.clone(),
            ports.queue.clone(),
            tenants.clone(),
            config.clone(),
        ));
        let worker = Arc::new(AnalysisWorker::new(
            ports.documents.clone(),
            ports.families.clone(),
            ports.blobs.clone(),
            ports.classifier.clone(),
            notifications.clone(),
        ));
        let digests = Arc::new(DigestService::new(
            ports.users.clone(),
            ports.documents.clone(),
            notifications.clone(),
        ));
        let worker_auth = Arc::new(WorkerAuth::from_config(&config.worker));

        Self {
            config,
            documents: ports.documents,
            users: ports.users,
            blobs: ports.blobs,
            verifier: ports.verifier,
            calendar: ports.calendar,
            tenants,
            resolver,
            intake,
            worker,
            notifications,
            digests,
            worker_auth,
            startup_time: Utc::now(),
        }
    }
}

fn cors_layer(config: &ServiceConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Build application router
///
/// CORS is the outermost layer so every response, including the generic 500
/// produced for a panicking handler, carries the cross-origin headers.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .merge(api::health_routes())
        .merge(api::document_routes(&state.config))
        .merge(api::event_routes())
        .merge(api::task_routes())
        .merge(api::profile_routes())
        .merge(api::family_routes())
        .merge(api::settings_routes())
        .merge(api::push_subscription_routes())
        .merge(api::ical_routes())
        .merge(api::worker_routes(state.clone()))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(api::handle_panic))
        .layer(cors)
}
