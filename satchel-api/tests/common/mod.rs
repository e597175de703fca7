//! Shared helpers for satchel-api integration tests
//!
//! Builds the full router on an in-memory database with fake external
//! collaborators (classifier, job queue, push transport).

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use lopdf::{dictionary, Document, Object, Stream};
use satchel_api::adapters::FsBlobStorage;
use satchel_api::auth::{sign_client_token, sign_worker_token, ClientClaims, JwtIdentityVerifier};
use satchel_api::{build_router, AppState, Ports};
use satchel_common::config::ServiceConfig;
use satchel_common::db::init_memory_database;
use satchel_common::models::{
    AnalysisJob, Category, DocumentAnalysis, EventData, Profile, PushMessage, PushSubscription,
    TaskData,
};
use satchel_common::ports::{DeliveryError, DocumentClassifier, JobQueue, PushTransport};
use satchel_common::{Error, Result};
use serde_json::Value;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt;

pub const CLIENT_SECRET: &str = "client-test-secret";
pub const WORKER_SECRET: &str = "worker-test-secret";
pub const WORKER_PRINCIPAL: &str = "queue@satchel.internal";
pub const ORIGIN: &str = "http://localhost:3000";

/// Job queue that records jobs instead of running them
#[derive(Default)]
pub struct RecordingQueue {
    pub jobs: Mutex<Vec<AnalysisJob>>,
    pub fail: AtomicBool,
}

impl RecordingQueue {
    pub fn jobs(&self) -> Vec<AnalysisJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn enqueue(&self, job: &AnalysisJob) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Queue("queue unavailable".to_string()));
        }
        self.jobs.lock().unwrap().push(job.clone());
        Ok(())
    }
}

/// Classifier returning a fixed analysis, or failing when none is set
pub struct StaticClassifier {
    pub analysis: Mutex<Option<DocumentAnalysis>>,
    pub calls: Mutex<usize>,
    /// Panic inside the request instead of answering
    pub panic: AtomicBool,
    /// Milliseconds to wait before answering
    pub delay_ms: AtomicU64,
}

impl StaticClassifier {
    pub fn new(analysis: Option<DocumentAnalysis>) -> Self {
        Self {
            analysis: Mutex::new(analysis),
            calls: Mutex::new(0),
            panic: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    pub fn set(&self, analysis: Option<DocumentAnalysis>) {
        *self.analysis.lock().unwrap() = analysis;
    }
}

#[async_trait]
impl DocumentClassifier for StaticClassifier {
    async fn classify(
        &self,
        _bytes: &[u8],
        _mime_type: &str,
        _profiles: &[Profile],
    ) -> Result<DocumentAnalysis> {
        *self.calls.lock().unwrap() += 1;
        if self.panic.load(Ordering::SeqCst) {
            panic!("classifier exploded");
        }
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.analysis
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::Classifier("model unavailable".to_string()))
    }
}

/// Push transport recording deliveries; endpoints in `gone` answer 410
#[derive(Default)]
pub struct RecordingPush {
    pub sent: Mutex<Vec<(String, PushMessage)>>,
    pub gone: Mutex<HashSet<String>>,
}

impl RecordingPush {
    pub fn sent(&self) -> Vec<(String, PushMessage)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushTransport for RecordingPush {
    async fn send(
        &self,
        subscription: &PushSubscription,
        message: &PushMessage,
    ) -> std::result::Result<(), DeliveryError> {
        if self.gone.lock().unwrap().contains(&subscription.endpoint) {
            return Err(DeliveryError::Gone("410 Gone".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((subscription.endpoint.clone(), message.clone()));
        Ok(())
    }
}

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub pool: SqlitePool,
    pub queue: Arc<RecordingQueue>,
    pub classifier: Arc<StaticClassifier>,
    pub push: Arc<RecordingPush>,
    _blob_dir: TempDir,
}

pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.auth.token_secret = Some(CLIENT_SECRET.to_string());
    config.auth.auto_activate = true;
    config.worker.principal = Some(WORKER_PRINCIPAL.to_string());
    config.worker.token_secret = Some(WORKER_SECRET.to_string());
    config.worker.verify_tokens = true;
    config.push.enabled = true;
    config.server.public_base_url = "https://satchel.test".to_string();
    config.server.cors_origins = vec![ORIGIN.to_string()];
    config
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

pub async fn spawn_app_with(configure: impl FnOnce(&mut ServiceConfig)) -> TestApp {
    let mut config = test_config();
    configure(&mut config);

    let pool = init_memory_database().await.unwrap();
    let blob_dir = tempfile::tempdir().unwrap();

    let queue = Arc::new(RecordingQueue::default());
    let classifier = Arc::new(StaticClassifier::new(Some(sample_analysis())));
    let push = Arc::new(RecordingPush::default());

    let ports = Ports::sqlite(
        pool.clone(),
        Arc::new(FsBlobStorage::new(blob_dir.path())),
        queue.clone(),
        classifier.clone(),
        push.clone(),
        Arc::new(JwtIdentityVerifier::new(Some(CLIENT_SECRET))),
    );
    let state = AppState::new(config, ports);
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        pool,
        queue,
        classifier,
        push,
        _blob_dir: blob_dir,
    }
}

pub fn sample_analysis() -> DocumentAnalysis {
    DocumentAnalysis {
        summary: "Class trip to the science museum".to_string(),
        category: Category::Event,
        related_profile_ids: vec![],
        events: vec![EventData {
            summary: "Science museum trip".to_string(),
            start: "2025-10-25T08:30:00".to_string(),
            end: "2025-10-25T15:00:00".to_string(),
            location: "City museum".to_string(),
            description: String::new(),
            confidence: "HIGH".to_string(),
        }],
        tasks: vec![TaskData {
            title: "Sign permission slip".to_string(),
            due_date: "2025-10-20".to_string(),
            assignee: "PARENT".to_string(),
            note: String::new(),
        }],
        archive_filename: "2025-10-25_museum_trip.pdf".to_string(),
    }
}

fn expiry() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
        + 3600
}

/// Client token with a verified email
pub fn client_token(identity: &str, email: &str) -> String {
    client_token_with(identity, email, true)
}

pub fn client_token_with(identity: &str, email: &str, email_verified: bool) -> String {
    let claims = ClientClaims {
        sub: identity.to_string(),
        email: email.to_string(),
        email_verified,
        name: identity.to_string(),
        exp: expiry(),
    };
    sign_client_token(CLIENT_SECRET, &claims).unwrap()
}

pub fn worker_token() -> String {
    sign_worker_token(WORKER_SECRET, WORKER_PRINCIPAL, Duration::from_secs(300)).unwrap()
}

pub fn json_request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

const BOUNDARY: &str = "satchel-test-boundary";

/// Multipart upload with a single `file` field
pub fn upload_request(token: &str, filename: &str, mime_type: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/documents/upload")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

impl TestApp {
    /// Send a request; returns status and the body parsed as JSON (Null when empty)
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, bytes) = self.send_raw(request).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn send_raw(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(json_request(Method::GET, uri, Some(token), None)).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(json_request(Method::POST, uri, Some(token), Some(body)))
            .await
    }

    pub async fn upload(&self, token: &str, filename: &str, mime_type: &str, bytes: &[u8]) -> (StatusCode, Value) {
        self.send(upload_request(token, filename, mime_type, bytes)).await
    }

    /// Run a recorded job through the worker endpoint
    pub async fn run_job(&self, job: &AnalysisJob) -> (StatusCode, Value) {
        let token = worker_token();
        self.send(json_request(
            Method::POST,
            "/worker/analyze",
            Some(&token),
            Some(serde_json::to_value(job).unwrap()),
        ))
        .await
    }
}

/// Minimal valid PDF with `pages` empty pages
pub fn pdf_with_pages(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids: Vec<Object> = Vec::new();
    for _ in 0..pages {
        let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}
