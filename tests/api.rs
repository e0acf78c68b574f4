// Intake API integration tests
//
// Drives the axum router in-process and points webhooks at wiremock servers.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use preapproval_relay::api::{router, AppState};
use preapproval_relay::applications::{
    Application, ApplicationFilter, ApplicationStore, MemoryApplicationStore, StoreError,
};
use preapproval_relay::config::WebhooksConfig;
use preapproval_relay::rate_limit::LeadTriggerLimiter;
use preapproval_relay::webhooks::{DeliveryService, RetryConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retry() -> RetryConfig {
    RetryConfig {
        base_delay_ms: 10,
        attempt_timeout_secs: 2,
        ..RetryConfig::default()
    }
}

fn state_with(webhooks: WebhooksConfig, applications: Arc<dyn ApplicationStore>) -> AppState {
    AppState {
        delivery: DeliveryService::new(fast_retry()).unwrap(),
        limiter: Arc::new(LeadTriggerLimiter::in_memory(Duration::from_secs(600))),
        applications,
        webhooks,
        lead_tracking_enabled: true,
    }
}

fn webhooks_for(server: &MockServer) -> WebhooksConfig {
    WebhooksConfig {
        lead_in_url: Some(format!("{}/lead", server.uri())),
        completion_url: Some(format!("{}/complete", server.uri())),
        ..WebhooksConfig::default()
    }
}

fn app_for(server: &MockServer) -> Router {
    router(
        state_with(webhooks_for(server), Arc::new(MemoryApplicationStore::new())),
        false,
    )
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn lead_from(ip: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/lead-in")
        .header("content-type", "application/json")
        .header("x-forwarded-for", ip)
        .body(Body::from(json!({ "page": "/apply", "action": "focus" }).to_string()))
        .unwrap()
}

fn valid_submission() -> Value {
    json!({
        "legalName": "Acme Holdings LLC",
        "dbaName": "Acme Coffee",
        "contactFirstName": "Dana",
        "contactLastName": "Reyes",
        "businessEmail": "dana@acme.example",
        "contactPhone": "555-0142"
    })
}

/// Wait until the mock server has seen `count` requests
async fn wait_for_requests(server: &MockServer, count: usize) -> Vec<wiremock::Request> {
    for _ in 0..100 {
        let received = server.received_requests().await.unwrap_or_default();
        if received.len() >= count {
            return received;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    server.received_requests().await.unwrap_or_default()
}

#[tokio::test]
async fn test_health() {
    let server = MockServer::start().await;
    let app = app_for(&server);

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_submission_delivers_completion_webhook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/complete"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let app = app_for(&server);

    let (status, body) = send(&app, post_json("/api/preapproval", valid_submission())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["webhookSent"], true);

    let application_id = body["applicationId"].as_str().unwrap().to_string();
    assert!(application_id.starts_with("APP-"));

    let received = server.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(sent["event"], "application_submitted");
    assert_eq!(sent["applicationId"], application_id.as_str());
    assert_eq!(sent["businessName"], "Acme Coffee");
    assert_eq!(sent["contactName"], "Dana Reyes");
    assert_eq!(sent["contactEmail"], "dana@acme.example");
    assert_eq!(sent["contactPhone"], "555-0142");
    assert_eq!(sent["webhookVersion"], "1.0");
    assert_eq!(sent["source"], "merchant-preapproval-relay");

    let request = Request::builder()
        .uri(format!("/api/applications/{}", application_id))
        .body(Body::empty())
        .unwrap();
    let (status, record) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["webhookSent"], true);
    assert_eq!(record["fields"]["legalName"], "Acme Holdings LLC");
}

#[tokio::test]
async fn test_submission_with_failing_webhook_is_still_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/complete"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;
    let app = app_for(&server);

    let (status, body) = send(&app, post_json("/api/preapproval", valid_submission())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["webhookSent"], false);
    assert_eq!(body["message"], "Application submitted successfully");

    let request = Request::builder()
        .uri("/api/applications?webhookSent=false")
        .body(Body::empty())
        .unwrap();
    let (status, listed) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_submission_validation_errors() {
    let server = MockServer::start().await;
    let app = app_for(&server);

    let (status, body) = send(
        &app,
        post_json("/api/preapproval", json!({ "businessEmail": "not-an-email" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert!(body["errors"]["legalName"].is_string());
    assert!(body["errors"]["businessEmail"].is_string());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dry_run_submission_sends_nothing() {
    let server = MockServer::start().await;
    let webhooks = WebhooksConfig {
        dry_run: true,
        ..webhooks_for(&server)
    };
    let app = router(
        state_with(webhooks, Arc::new(MemoryApplicationStore::new())),
        false,
    );

    let (status, body) = send(&app, post_json("/api/preapproval", valid_submission())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["webhookSent"], true);
    assert!(server.received_requests().await.unwrap().is_empty());
}

fn post_multipart(uri: &str, parts: &[(&str, &str)]) -> Request<Body> {
    let mut body = String::new();
    for (name, value) in parts {
        body.push_str(&format!(
            "--XB\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
            name, value
        ));
    }
    body.push_str("--XB--\r\n");

    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "multipart/form-data; boundary=XB")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_multipart_form_submission() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/complete"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let app = app_for(&server);

    let request = post_multipart(
        "/api/preapproval",
        &[
            ("legalName", "Acme Holdings LLC"),
            ("contactFirstName", "Dana"),
            ("contactLastName", "Reyes"),
            ("contactPhone", "555-0142"),
            ("businessEmail", "dana@acme.example"),
            ("productService", "goods"),
            ("productService", "services"),
        ],
    );
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["webhookSent"], true);

    let received = server.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(sent["businessName"], "Acme Holdings LLC");
    assert_eq!(sent["contactName"], "Dana Reyes");
    assert_eq!(sent["contactPhone"], "555-0142");

    let request = Request::builder()
        .uri(format!("/api/applications/{}", body["applicationId"].as_str().unwrap()))
        .body(Body::empty())
        .unwrap();
    let (_, record) = send(&app, request).await;
    assert_eq!(record["fields"]["productService"], json!(["goods", "services"]));
}

#[tokio::test]
async fn test_multipart_validation_errors_are_json() {
    let server = MockServer::start().await;
    let app = app_for(&server);

    let request = post_multipart("/api/preapproval", &[("legalName", "Acme Holdings LLC")]);
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["businessEmail"].is_string());
}

#[tokio::test]
async fn test_urlencoded_form_submission() {
    let server = MockServer::start().await;
    let app = router(
        state_with(
            WebhooksConfig {
                dry_run: true,
                ..webhooks_for(&server)
            },
            Arc::new(MemoryApplicationStore::new()),
        ),
        false,
    );

    let request = Request::builder()
        .method("POST")
        .uri("/api/preapproval")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("dbaName=Acme+Coffee&businessEmail=dana%40acme.example"))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_unsupported_body_gets_json_error() {
    let server = MockServer::start().await;
    let app = app_for(&server);

    let request = Request::builder()
        .method("POST")
        .uri("/api/preapproval")
        .header("content-type", "text/plain")
        .body(Body::from("legalName=Acme"))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["success"], false);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_unknown_application_is_404() {
    let server = MockServer::start().await;
    let app = app_for(&server);

    let request = Request::builder()
        .uri("/api/applications/APP-MISSING")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_lead_in_is_rate_limited_per_client() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/lead"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    let app = app_for(&server);

    let (status, first) = send(&app, lead_from("203.0.113.7")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, json!({ "success": true, "forwarded": true }));

    let (_, second) = send(&app, lead_from("203.0.113.7")).await;
    assert_eq!(second["forwarded"], false);

    let (_, other) = send(&app, lead_from("198.51.100.1")).await;
    assert_eq!(other["forwarded"], true);

    let received = wait_for_requests(&server, 2).await;
    assert_eq!(received.len(), 2);

    let mut clients: Vec<String> = received
        .iter()
        .map(|r| {
            let body: Value = serde_json::from_slice(&r.body).unwrap();
            assert_eq!(body["event"], "lead_engagement_started");
            assert_eq!(body["page"], "/apply");
            body["clientId"].as_str().unwrap().to_string()
        })
        .collect();
    clients.sort();
    assert_eq!(clients, vec!["198.51.100.1", "203.0.113.7"]);
}

#[tokio::test]
async fn test_lead_in_responds_before_slow_webhook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/lead"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;
    let app = app_for(&server);

    let started = std::time::Instant::now();
    let (status, body) = send(&app, lead_from("192.0.2.10")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["forwarded"], true);
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn test_lead_in_disabled_never_forwards() {
    let server = MockServer::start().await;
    let mut state = state_with(webhooks_for(&server), Arc::new(MemoryApplicationStore::new()));
    state.lead_tracking_enabled = false;
    let app = router(state, false);

    let (status, body) = send(&app, lead_from("192.0.2.44")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["forwarded"], false);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_lead_in_accepts_empty_body() {
    let server = MockServer::start().await;
    let app = app_for(&server);

    let request = Request::builder()
        .method("POST")
        .uri("/api/lead-in")
        .header("x-forwarded-for", "192.0.2.99")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

/// Store whose writes always fail
struct UnavailableStore;

#[async_trait]
impl ApplicationStore for UnavailableStore {
    async fn insert(&self, _application: Application) -> Result<(), StoreError> {
        Err(StoreError::Backend("database unavailable".into()))
    }

    async fn get(&self, _id: &str) -> Result<Option<Application>, StoreError> {
        Ok(None)
    }

    async fn list(&self, _filter: &ApplicationFilter) -> Result<Vec<Application>, StoreError> {
        Ok(Vec::new())
    }

    async fn mark_webhook_sent(&self, id: &str, _sent: bool) -> Result<(), StoreError> {
        Err(StoreError::NotFound(id.to_string()))
    }
}

#[tokio::test]
async fn test_store_failure_is_500_and_skips_webhook() {
    let server = MockServer::start().await;
    let app = router(state_with(webhooks_for(&server), Arc::new(UnavailableStore)), false);

    let (status, body) = send(&app, post_json("/api/preapproval", valid_submission())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_metrics_route_only_when_enabled() {
    let server = MockServer::start().await;
    let state = state_with(webhooks_for(&server), Arc::new(MemoryApplicationStore::new()));

    let request = || Request::builder().uri("/metrics").body(Body::empty()).unwrap();

    let disabled = router(state.clone(), false);
    let response = disabled.oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    preapproval_relay::metrics::init().unwrap();
    let enabled = router(state, true);
    let response = enabled.oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
