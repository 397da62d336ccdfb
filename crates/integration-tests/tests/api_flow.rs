//! A client's full session through the HTTP surface.

use std::sync::Arc;

use api_adapters::{router, AppState};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use integration_tests::{FakeInstance, Harness, HOST, TOKEN, USER_NAME};
use serde_json::{json, Value};
use services::{AccountService, FixedInterval, SyncService};
use tower::ServiceExt;

struct App {
    router: Router,
    remote: Arc<FakeInstance>,
}

async fn app(remote: FakeInstance) -> App {
    let h = Harness::without_account(remote).await;
    let sync = SyncService::new(
        Arc::new(h.archive.clone()),
        Arc::new(h.archive.clone()),
        h.remote.clone(),
        Arc::new(FixedInterval(std::time::Duration::ZERO)),
    );
    let accounts = AccountService::new(
        Arc::new(h.archive.clone()),
        Arc::new(h.archive.clone()),
        h.remote.clone(),
    );
    App {
        router: router(AppState::new(Arc::new(sync), Arc::new(accounts))),
        remote: h.remote,
    }
}

async fn call(app: &App, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .header("x-instance-host", HOST);
    let req = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn ids(body: &Value) -> Vec<String> {
    body["posts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn login_backfill_catch_up_and_publish() {
    let app = app(FakeInstance::with_history(23, 10)).await;

    let (status, body) = call(&app, "POST", "/api/session", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["account"]["user_name"], json!(USER_NAME));

    let (status, body) = call(&app, "POST", "/api/statuses/sync/tail", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "completed": true, "inserted_total": 23 }));

    let (_, body) = call(&app, "GET", "/api/account/fetch-state", None).await;
    assert_eq!(body, json!({ "all_fetched": true, "state": "complete" }));

    // a second backfill request is answered from the flag alone
    let before = app.remote.before_calls();
    let (_, body) = call(&app, "POST", "/api/statuses/sync/tail", None).await;
    assert_eq!(body, json!({ "completed": true, "inserted_total": 0 }));
    assert_eq!(app.remote.before_calls(), before);

    app.remote.publish([24, 25]);
    let (_, body) = call(&app, "POST", "/api/statuses/sync/head", None).await;
    assert_eq!(body, json!({ "inserted_count": 2, "had_new_posts": true }));
    let (_, body) = call(&app, "POST", "/api/statuses/sync/head", None).await;
    assert_eq!(body, json!({ "inserted_count": 0, "had_new_posts": false }));

    let (_, body) = call(&app, "GET", "/api/statuses", None).await;
    let listed = ids(&body);
    assert_eq!(listed.len(), 25);
    assert_eq!(listed.first().map(String::as_str), Some("25"));
    assert_eq!(listed.last().map(String::as_str), Some("1"));
    assert_eq!(body["all_fetched"], json!(true));

    let (status, _) = call(&app, "PUT", "/api/account/public", Some(json!({ "public": true }))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = call(&app, "GET", &format!("/users/{HOST}/{USER_NAME}"), None).await;
    assert_eq!(status, StatusCode::OK);
    // only ids divisible by four are public in the fixture
    assert_eq!(ids(&body).len(), 6);
}

#[tokio::test]
async fn unknown_profile_is_404() {
    let app = app(FakeInstance::with_history(0, 10)).await;
    let (status, body) = call(&app, "GET", &format!("/users/{HOST}/nobody"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}
