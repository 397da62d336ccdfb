//! Drives the axum router in-process against an in-memory SQLite archive and
//! a mocked remote instance.

use std::sync::Arc;
use std::time::Duration;

use api_adapters::{router, AppState};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use domains::{
    AccountKey, AccountRepository, DomainError, MockRemotePostSource, Post, PostId, RemoteAccount, Visibility,
};
use serde_json::{json, Value};
use services::{AccountService, FixedInterval, SyncService};
use storage_adapters::SqliteArchive;
use tower::ServiceExt;

const HOST: &str = "example.social";

fn post(id: &str, visibility: Visibility) -> Post {
    Post {
        id: PostId::from(id),
        account_id: "42".into(),
        host: HOST.into(),
        text: format!("status number {id}"),
        url: format!("https://{HOST}/@alice/{id}"),
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        visibility,
    }
}

/// A remote that accepts the token `good` as alice (id 42).
fn remote() -> MockRemotePostSource {
    let mut remote = MockRemotePostSource::new();
    remote.expect_verify_credentials().returning(|_, token| {
        if token.expose() == "good" {
            Ok(RemoteAccount {
                id: "42".into(),
                user_name: "alice".into(),
            })
        } else {
            Err(DomainError::Auth("token rejected".into()))
        }
    });
    remote
}

async fn build(remote: MockRemotePostSource, pacing: Duration) -> (AppState, SqliteArchive) {
    let archive = SqliteArchive::in_memory().await.unwrap();
    archive.migrate().await.unwrap();

    let remote = Arc::new(remote);
    let sync = SyncService::new(
        Arc::new(archive.clone()),
        Arc::new(archive.clone()),
        remote.clone(),
        Arc::new(FixedInterval(pacing)),
    );
    let accounts = AccountService::new(Arc::new(archive.clone()), Arc::new(archive.clone()), remote);
    let state = AppState::new(Arc::new(sync), Arc::new(accounts))
        .with_display_tz(chrono_tz::Asia::Tokyo);
    (state, archive)
}

fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, "Bearer good")
        .header("x-instance-host", HOST);
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, body)
}

async fn login(app: &Router) {
    let (status, _) = send(app, request("POST", "/api/session", None)).await;
    assert!(status.is_success());
}

#[tokio::test]
async fn test_healthz() {
    let (state, _) = build(MockRemotePostSource::new(), Duration::ZERO).await;
    let app = router(state);
    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));
}

#[tokio::test]
async fn test_missing_credentials_is_401() {
    let (state, _) = build(MockRemotePostSource::new(), Duration::ZERO).await;
    let app = router(state);
    let req = Request::builder()
        .uri("/api/statuses")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("bearer"));
}

#[tokio::test]
async fn test_rejected_token_is_401() {
    let (state, _) = build(remote(), Duration::ZERO).await;
    let app = router(state);
    let req = Request::builder()
        .method("POST")
        .uri("/api/session")
        .header(header::AUTHORIZATION, "Bearer stale")
        .header("x-instance-host", HOST)
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_session_creates_account_once() {
    let (state, _) = build(remote(), Duration::ZERO).await;
    let app = router(state);

    let (status, body) = send(&app, request("POST", "/api/session", None)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["created"], json!(true));
    assert_eq!(body["account"]["user_name"], json!("alice"));
    assert_eq!(body["account"]["all_fetched"], json!(false));

    let (status, body) = send(&app, request("POST", "/api/session", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created"], json!(false));
}

#[tokio::test]
async fn test_head_sync_then_archive_listing() {
    let mut remote = remote();
    remote
        .expect_fetch_since()
        .times(1)
        .returning(|_, _, _| Ok(vec![post("102", Visibility::Public), post("101", Visibility::Private)]));
    let (state, _) = build(remote, Duration::ZERO).await;
    let app = router(state);
    login(&app).await;

    let (status, body) = send(&app, request("POST", "/api/statuses/sync/head", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "inserted_count": 2, "had_new_posts": true }));

    let (status, body) = send(&app, request("GET", "/api/statuses", None)).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["posts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["102", "101"]);
    // rendered in the display zone
    assert_eq!(body["posts"][0]["created_at"], json!("2024-05-01T21:00:00+09:00"));

    let (_, body) = send(&app, request("GET", "/api/statuses?q=number%20101", None)).await;
    assert_eq!(body["posts"].as_array().unwrap().len(), 1);
    assert_eq!(body["posts"][0]["id"], json!("101"));
}

#[tokio::test]
async fn test_tail_sync_marks_history_complete() {
    let mut remote = remote();
    remote.expect_fetch_before().returning(|_, _, before| {
        Ok(match before.as_ref().map(PostId::as_str) {
            None => vec![post("11", Visibility::Public), post("10", Visibility::Public)],
            Some("10") => vec![post("9", Visibility::Unlisted)],
            _ => vec![],
        })
    });
    let (state, _) = build(remote, Duration::ZERO).await;
    let app = router(state);
    login(&app).await;

    let (_, body) = send(&app, request("GET", "/api/account/fetch-state", None)).await;
    assert_eq!(body, json!({ "all_fetched": false, "state": "empty" }));

    let (status, body) = send(&app, request("POST", "/api/statuses/sync/tail", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "completed": true, "inserted_total": 3 }));

    let (_, body) = send(&app, request("GET", "/api/account/fetch-state", None)).await;
    assert_eq!(body, json!({ "all_fetched": true, "state": "complete" }));
}

#[tokio::test]
async fn test_sync_before_login_is_404() {
    let mut remote = remote();
    remote.expect_fetch_since().never();
    remote.expect_fetch_before().never();
    let (state, archive) = build(remote, Duration::ZERO).await;
    let app = router(state);

    for path in ["/api/statuses/sync/head", "/api/statuses/sync/tail"] {
        let (status, body) = send(&app, request("POST", path, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
        assert!(body["error"].is_string());
    }
    assert!(!archive
        .is_all_fetched(&AccountKey::new("42", HOST))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_concurrent_tail_sync_is_409() {
    let mut remote = remote();
    remote.expect_fetch_before().never();
    let (state, _) = build(remote, Duration::ZERO).await;
    let running = state
        .in_flight
        .try_acquire(&AccountKey::new("42", HOST))
        .unwrap();
    let app = router(state);

    let (status, body) = send(&app, request("POST", "/api/statuses/sync/tail", None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already running"));
    drop(running);
}

#[tokio::test]
async fn test_tail_sync_timeout_reports_incomplete() {
    let mut remote = remote();
    // an endless history, one post older than the cursor each time
    remote.expect_fetch_before().returning(|_, _, before| {
        let next = before
            .map(|id| id.as_str().parse::<u64>().unwrap() - 1)
            .unwrap_or(1_000);
        Ok(vec![post(&next.to_string(), Visibility::Public)])
    });
    let (state, _) = build(remote, Duration::from_secs(3600)).await;
    let state = state.with_backfill_timeout(Duration::from_millis(100));
    let app = router(state.clone());
    login(&app).await;

    let (status, body) = send(&app, request("POST", "/api/statuses/sync/tail", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "completed": false, "inserted_total": 1 }));

    let (_, body) = send(&app, request("GET", "/api/account/fetch-state", None)).await;
    assert_eq!(body["state"], json!("partial"));
    assert!(!state.in_flight.is_running(&AccountKey::new("42", HOST)));
}

#[tokio::test]
async fn test_rate_limit_is_429_with_retry_after() {
    let mut remote = remote();
    remote.expect_fetch_since().returning(|_, _, _| {
        Err(DomainError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        })
    });
    let (state, _) = build(remote, Duration::ZERO).await;
    let app = router(state);
    login(&app).await;

    let response = app
        .clone()
        .oneshot(request("POST", "/api/statuses/sync/head", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], "30");
}

#[tokio::test]
async fn test_public_profile_respects_settings() {
    let mut remote = remote();
    remote.expect_fetch_since().returning(|_, _, _| {
        Ok(vec![
            post("103", Visibility::Direct),
            post("102", Visibility::Unlisted),
            post("101", Visibility::Public),
        ])
    });
    let (state, _) = build(remote, Duration::ZERO).await;
    let app = router(state);
    login(&app).await;
    send(&app, request("POST", "/api/statuses/sync/head", None)).await;

    let anonymous = || {
        Request::builder()
            .uri(format!("/users/{HOST}/alice"))
            .body(Body::empty())
            .unwrap()
    };

    let (status, _) = send(&app, anonymous()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, request("PUT", "/api/account/public", Some(json!({ "public": true })))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, anonymous()).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["posts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["101"]);

    let exposure = json!({ "unlisted": true, "private": false, "direct": false });
    let (status, _) = send(&app, request("PUT", "/api/account/visibility", Some(exposure))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(&app, anonymous()).await;
    assert_eq!(body["posts"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_metrics_exposition() {
    let mut remote = remote();
    remote.expect_fetch_since().returning(|_, _, _| Ok(vec![]));
    let (state, _) = build(remote, Duration::ZERO).await;
    let app = router(state);
    login(&app).await;
    send(&app, request("POST", "/api/statuses/sync/head", None)).await;

    let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains(r#"statuslog_sync_passes_total{kind="Head",outcome="Ok"} 1"#));
}
