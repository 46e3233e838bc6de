use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header::RETRY_AFTER, Request};
use chrono::{Duration, Utc};
use mentions_cache::QueryCache;
use mentions_core::{FetchError, Monitor, Platform, PlatformFetcher, PlatformQuery, RawPost};
use mentions_gate::{AiBudget, RateLimits};
use mentions_scan::{InMemoryStore, ScanScheduler, ScanSettings, ScanStore, ScanWorkerPool};
use mentions_signals::LexiconAnalyzer;
use mentions_sources::FetcherRegistry;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use super::*;

/// Never answers, so an accepted scan stays in flight for the whole test.
struct StalledFetcher;

#[async_trait]
impl PlatformFetcher for StalledFetcher {
    fn platform(&self) -> Platform {
        Platform::Reddit
    }

    async fn fetch(&self, _query: &PlatformQuery) -> Result<Vec<RawPost>, FetchError> {
        tokio::time::sleep(StdDuration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}

fn monitor(user_id: &str) -> Monitor {
    Monitor {
        id: Uuid::new_v4(),
        user_id: user_id.to_owned(),
        name: "Acme watch".to_owned(),
        company_name: "Acme".to_owned(),
        keywords: vec![],
        platforms: vec![Platform::Reddit],
        is_active: true,
        schedule: None,
        is_scanning: false,
        last_manual_scan_at: None,
        last_checked_at: None,
        new_match_count: 0,
    }
}

/// The returned pool must stay alive for the queue to accept jobs.
fn test_app(
    store: &Arc<InMemoryStore>,
    limits: RateLimits,
    auth: AuthState,
) -> (Router, ScanWorkerPool) {
    let mut registry = FetcherRegistry::new();
    registry.register(Arc::new(StalledFetcher));
    let rate_gate = Arc::new(RateGate::new(None, limits));
    let scheduler = Arc::new(ScanScheduler::new(
        Arc::clone(store) as Arc<dyn ScanStore>,
        registry,
        QueryCache::new(16),
        Arc::clone(&rate_gate),
        Arc::new(AiBudget::new(None, chrono_tz::UTC)),
        Arc::new(LexiconAnalyzer::new()),
        ScanSettings {
            fetch_timeout: StdDuration::from_secs(3600),
            ..ScanSettings::default()
        },
    ));
    let (queue, workers) = ScanWorkerPool::spawn(scheduler, 2, 8);
    (
        build_app(AppState { queue, pool: None }, auth, rate_gate),
        workers,
    )
}

fn open_auth() -> AuthState {
    AuthState::from_keys("", true).expect("auth")
}

fn scan_request(user: &str, monitor_id: Uuid) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/scan")
        .header("content-type", "application/json")
        .header(USER_ID_HEADER, user)
        .body(Body::from(json!({"monitorId": monitor_id}).to_string()))
        .expect("request")
}

fn status_request(user: &str, monitor_id: Uuid) -> Request<Body> {
    Request::builder()
        .uri(format!("/api/v1/scan/status?monitorId={monitor_id}"))
        .header(USER_ID_HEADER, user)
        .body(Body::empty())
        .expect("request")
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&body).expect("json parse")
}

#[tokio::test]
async fn health_without_database_is_degraded() {
    let store = Arc::new(InMemoryStore::new());
    let (app, _workers) = test_app(&store, RateLimits::default(), open_auth());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.headers().contains_key("x-request-id"));
    let json = body_json(response).await;
    assert_eq!(json["data"]["database"], "unavailable");
}

#[tokio::test]
async fn scan_requires_bearer_token_when_keys_configured() {
    let store = Arc::new(InMemoryStore::new());
    let m = monitor("u1");
    store.insert_monitor(m.clone()).await;
    let auth = AuthState::from_keys("secret", false).expect("auth");
    let (app, _workers) = test_app(&store, RateLimits::default(), auth);

    let denied = app
        .clone()
        .oneshot(scan_request("u1", m.id))
        .await
        .expect("response");
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let mut req = scan_request("u1", m.id);
    req.headers_mut().insert(
        header::AUTHORIZATION,
        "Bearer secret".parse().expect("header"),
    );
    let allowed = app.oneshot(req).await.expect("response");
    assert_eq!(allowed.status(), StatusCode::OK);
}

#[tokio::test]
async fn scan_requires_user_identity() {
    let store = Arc::new(InMemoryStore::new());
    let (app, _workers) = test_app(&store, RateLimits::default(), open_auth());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/scan")
                .header("content-type", "application/json")
                .body(Body::from(json!({"monitorId": Uuid::new_v4()}).to_string()))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn second_scan_while_running_conflicts() {
    let store = Arc::new(InMemoryStore::new());
    let m = monitor("u1");
    store.insert_monitor(m.clone()).await;
    let (app, _workers) = test_app(&store, RateLimits::default(), open_auth());

    let first = app
        .clone()
        .oneshot(scan_request("u1", m.id))
        .await
        .expect("response");
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(body_json(first).await, json!({"started": true}));

    let second = app.oneshot(scan_request("u1", m.id)).await.expect("response");
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(second).await, json!({"scanInProgress": true}));
}

#[tokio::test]
async fn cooldown_reports_remaining_seconds_and_next_time() {
    let store = Arc::new(InMemoryStore::new());
    let m = Monitor {
        last_manual_scan_at: Some(Utc::now() - Duration::hours(1)),
        ..monitor("u1")
    };
    store.insert_monitor(m.clone()).await;
    let (app, _workers) = test_app(&store, RateLimits::default(), open_auth());

    let response = app.oneshot(scan_request("u1", m.id)).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    let remaining = json["cooldownRemaining"].as_i64().expect("seconds");
    assert!((82_700..=82_800).contains(&remaining), "got {remaining}");
    assert!(json["nextScanAt"].is_string());
}

#[tokio::test]
async fn cooldown_seconds_round_up_near_the_end() {
    let store = Arc::new(InMemoryStore::new());
    let m = Monitor {
        last_manual_scan_at: Some(
            Utc::now() - Duration::hours(24) + Duration::milliseconds(1500),
        ),
        ..monitor("u1")
    };
    store.insert_monitor(m.clone()).await;
    let (app, _workers) = test_app(&store, RateLimits::default(), open_auth());

    let response = app.oneshot(scan_request("u1", m.id)).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let remaining = body_json(response).await["cooldownRemaining"]
        .as_i64()
        .expect("seconds");
    assert!((1..=2).contains(&remaining), "got {remaining}");
}

#[tokio::test]
async fn inactive_monitor_is_a_bad_request() {
    let store = Arc::new(InMemoryStore::new());
    let m = Monitor {
        is_active: false,
        ..monitor("u1")
    };
    store.insert_monitor(m.clone()).await;
    let (app, _workers) = test_app(&store, RateLimits::default(), open_auth());

    let response = app.oneshot(scan_request("u1", m.id)).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "inactive_monitor");
}

#[tokio::test]
async fn foreign_monitor_is_not_found() {
    let store = Arc::new(InMemoryStore::new());
    let m = monitor("owner");
    store.insert_monitor(m.clone()).await;
    let (app, _workers) = test_app(&store, RateLimits::default(), open_auth());

    let response = app
        .oneshot(scan_request("someone-else", m.id))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn write_limit_returns_retry_after() {
    let store = Arc::new(InMemoryStore::new());
    let m = monitor("u1");
    store.insert_monitor(m.clone()).await;
    let limits = RateLimits {
        write: 0,
        ..RateLimits::default()
    };
    let (app, _workers) = test_app(&store, limits, open_auth());

    let response = app.oneshot(scan_request("u1", m.id)).await.expect("response");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let header: u64 = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .expect("retry-after header");
    let json = body_json(response).await;
    assert_eq!(json["retryAfter"].as_u64(), Some(header));
}

#[tokio::test]
async fn status_reports_camel_case_fields() {
    let store = Arc::new(InMemoryStore::new());
    let m = Monitor {
        new_match_count: 3,
        ..monitor("u1")
    };
    store.insert_monitor(m.clone()).await;
    let (app, _workers) = test_app(&store, RateLimits::default(), open_auth());

    let response = app.oneshot(status_request("u1", m.id)).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["isScanning"], false);
    assert_eq!(json["canScan"], true);
    assert_eq!(json["newMatchCount"], 3);
    assert!(json["cooldownRemaining"].is_null());
    assert!(json["lastCheckedAt"].is_null());
}

#[tokio::test]
async fn status_reads_are_limited_per_user() {
    let store = Arc::new(InMemoryStore::new());
    let m = monitor("u1");
    store.insert_monitor(m.clone()).await;
    let limits = RateLimits {
        read: 1,
        ..RateLimits::default()
    };
    let (app, _workers) = test_app(&store, limits, open_auth());

    let first = app
        .clone()
        .oneshot(status_request("u1", m.id))
        .await
        .expect("response");
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .clone()
        .oneshot(status_request("u1", m.id))
        .await
        .expect("response");
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(second.headers().contains_key(RETRY_AFTER));

    let other_user = app
        .oneshot(status_request("u2", m.id))
        .await
        .expect("response");
    assert_eq!(other_user.status(), StatusCode::NOT_FOUND);
}
