//! Push subscriptions, settings, scheduled fan-out and the calendar feed

mod common;

use axum::http::{header, Method, StatusCode};
use chrono::{Duration, Utc};
use common::{client_token, json_request, spawn_app, spawn_app_with, worker_token, TestApp};
use satchel_common::models::{Category, DocumentAnalysis, EventData};
use serde_json::{json, Value};

fn subscription(endpoint: &str) -> Value {
    json!({ "endpoint": endpoint, "keys": { "p256dh": "BNc", "auth": "tBH" } })
}

async fn enable_push(app: &TestApp, token: &str) {
    let (status, _) = app
        .send(json_request(
            Method::PATCH,
            "/settings",
            Some(token),
            Some(json!({ "notification_web_push": true })),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
}

/// Upload and analyze one document whose single event starts on `date`
async fn analyzed_event_on(app: &TestApp, token: &str, date: &str) {
    app.classifier.set(Some(DocumentAnalysis {
        summary: "Parent evening".to_string(),
        category: Category::Event,
        related_profile_ids: vec![],
        events: vec![EventData {
            summary: "Parent evening".to_string(),
            start: date.to_string(),
            end: date.to_string(),
            location: String::new(),
            description: String::new(),
            confidence: "HIGH".to_string(),
        }],
        tasks: vec![],
        archive_filename: String::new(),
    }));

    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(date.as_bytes());
    let (status, _) = app.upload(token, "evening.png", "image/png", &bytes).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let job = app.queue.jobs().pop().unwrap();
    let (status, _) = app.run_job(&job).await;
    assert_eq!(status, StatusCode::OK);
}

async fn call_worker(app: &TestApp, path: &str) -> (StatusCode, Value) {
    app.send(json_request(Method::POST, path, Some(&worker_token()), None))
        .await
}

#[tokio::test]
async fn test_subscribe_validates_fields() {
    let app = spawn_app().await;
    let token = client_token("alice", "alice@example.com");

    let (status, _) = app
        .post("/push-subscriptions", &token, subscription("https://push.example/a"))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app
        .post(
            "/push-subscriptions",
            &token,
            json!({ "endpoint": "https://push.example/b", "keys": { "p256dh": "BNc" } }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"], "MISSING_FIELDS");

    let (status, body) = app.post("/push-subscriptions", &token, json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"], "MISSING_FIELDS");
}

#[tokio::test]
async fn test_reregistration_overwrites_device() {
    let app = spawn_app().await;
    let token = client_token("alice", "alice@example.com");

    app.post("/push-subscriptions", &token, subscription("https://push.example/a"))
        .await;
    app.post("/push-subscriptions", &token, subscription("https://push.example/a"))
        .await;
    app.post("/push-subscriptions", &token, subscription("https://push.example/b"))
        .await;

    let devices = app.state.notifications.remove("alice", None).await.unwrap();
    assert_eq!(devices, 2);
}

#[tokio::test]
async fn test_unsubscribe_one_or_all() {
    let app = spawn_app().await;
    let token = client_token("alice", "alice@example.com");
    for endpoint in ["https://push.example/a", "https://push.example/b", "https://push.example/c"] {
        app.post("/push-subscriptions", &token, subscription(endpoint))
            .await;
    }

    let (status, _) = app
        .post(
            "/push-subscriptions/unsubscribe",
            &token,
            json!({ "endpoint": "https://push.example/a" }),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // No body: every device goes
    let (status, _) = app
        .send(json_request(
            Method::POST,
            "/push-subscriptions/unsubscribe",
            Some(&token),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let remaining = app.state.notifications.remove("alice", None).await.unwrap();
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn test_settings_and_feed_link() {
    let app = spawn_app().await;
    let token = client_token("alice", "alice@example.com");

    let (status, settings) = app.get("/settings", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settings["plan"], "free");
    assert_eq!(settings["documents_this_month"], 0);
    assert_eq!(settings["notification_email"], true);
    assert_eq!(settings["notification_web_push"], false);

    let ical_url = settings["ical_url"].as_str().unwrap().to_string();
    assert!(ical_url.starts_with("https://satchel.test/ical/"));

    // The feed token is stable
    let (_, again) = app.get("/settings", &token).await;
    assert_eq!(again["ical_url"], ical_url.as_str());

    let (status, updated) = app
        .send(json_request(
            Method::PATCH,
            "/settings",
            Some(&token),
            Some(json!({ "notification_email": false })),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["notification_email"], false);
    assert_eq!(updated["notification_web_push"], false);
    assert_eq!(updated["ical_url"], ical_url.as_str());
}

#[tokio::test]
async fn test_calendar_feed() {
    let app = spawn_app().await;
    let token = client_token("alice", "alice@example.com");
    analyzed_event_on(&app, &token, "2025-11-03").await;

    let (_, settings) = app.get("/settings", &token).await;
    let feed_path = settings["ical_url"]
        .as_str()
        .unwrap()
        .trim_start_matches("https://satchel.test")
        .to_string();

    let response = tower::ServiceExt::oneshot(
        app.app.clone(),
        json_request(Method::GET, &feed_path, None, None),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/calendar; charset=utf-8"
    );
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"satchel.ics\""
    );

    let (_, body) = app
        .send_raw(json_request(Method::GET, &feed_path, None, None))
        .await;
    let text = String::from_utf8(body).unwrap();
    assert!(text.starts_with("BEGIN:VCALENDAR\r\n"));
    assert!(text.contains("SUMMARY:Parent evening"));
    assert!(text.contains("DTSTART;VALUE=DATE:20251103"));
    assert!(text.trim_end().ends_with("END:VCALENDAR"));

    let (status, _) = app
        .send_raw(json_request(Method::GET, "/ical/not-a-token", None, None))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_event_reminder_for_tomorrow() {
    let app = spawn_app().await;
    let token = client_token("alice", "alice@example.com");
    let tomorrow = (Utc::now().date_naive() + Duration::days(1))
        .format("%Y-%m-%d")
        .to_string();

    enable_push(&app, &token).await;
    app.post("/push-subscriptions", &token, subscription("https://push.example/a"))
        .await;
    analyzed_event_on(&app, &token, &tomorrow).await;

    let (status, body) = call_worker(&app, "/worker/event-reminder").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok", "sent": 1, "errors": 0 }));

    let sent = app.push.sent();
    let reminder = sent.last().unwrap();
    assert_eq!(reminder.1.body, "1 events tomorrow");
}

#[tokio::test]
async fn test_morning_digest_prunes_gone_devices() {
    let app = spawn_app().await;
    let token = client_token("alice", "alice@example.com");

    enable_push(&app, &token).await;
    app.post("/push-subscriptions", &token, subscription("https://push.example/live"))
        .await;
    app.post("/push-subscriptions", &token, subscription("https://push.example/gone"))
        .await;

    // One open task from the sample analysis
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(b"slip");
    app.upload(&token, "slip.png", "image/png", &bytes).await;
    let job = app.queue.jobs().pop().unwrap();
    app.run_job(&job).await;

    app.push
        .gone
        .lock()
        .unwrap()
        .insert("https://push.example/gone".to_string());
    let before = app.push.sent().len();

    let (status, body) = call_worker(&app, "/worker/morning-digest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok", "sent": 1, "errors": 1 }));
    assert_eq!(app.push.sent().len(), before + 1);

    // The gone device was removed, the live one kept
    let (_, body) = call_worker(&app, "/worker/morning-digest").await;
    assert_eq!(body, json!({ "status": "ok", "sent": 1, "errors": 0 }));
}

#[tokio::test]
async fn test_digest_skips_identities_with_nothing_to_report() {
    let app = spawn_app().await;
    let token = client_token("alice", "alice@example.com");
    enable_push(&app, &token).await;
    app.post("/push-subscriptions", &token, subscription("https://push.example/a"))
        .await;

    let (_, body) = call_worker(&app, "/worker/morning-digest").await;
    assert_eq!(body, json!({ "status": "ok", "sent": 0, "errors": 0 }));

    let (_, body) = call_worker(&app, "/worker/event-reminder").await;
    assert_eq!(body, json!({ "status": "ok", "sent": 0, "errors": 0 }));
    assert!(app.push.sent().is_empty());
}

#[tokio::test]
async fn test_fan_out_skipped_when_push_disabled() {
    let app = spawn_app_with(|c| c.push.enabled = false).await;

    let (status, body) = call_worker(&app, "/worker/morning-digest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "skipped", "sent": 0, "errors": 0 }));
}

#[tokio::test]
async fn test_health() {
    let app = spawn_app().await;

    let (status, body) = app
        .send(json_request(Method::GET, "/health", None, None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "satchel-api");
    assert!(!body["git_hash"].as_str().unwrap().is_empty());
}
