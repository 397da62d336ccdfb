//! Route table and the middleware stack wrapped around it.

use axum::http::HeaderName;
use axum::routing::{get, post, put};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(state: AppState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .route("/api/session", post(handlers::create_session))
        .route("/api/statuses", get(handlers::list_statuses))
        .route("/api/statuses/sync/head", post(handlers::sync_head))
        .route("/api/statuses/sync/tail", post(handlers::sync_tail))
        .route("/api/account/fetch-state", get(handlers::fetch_state))
        .route("/api/account/public", put(handlers::set_public))
        .route("/api/account/visibility", put(handlers::set_visibility))
        .route("/users/{host}/{user_name}", get(handlers::public_profile))
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::metrics))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id))
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}
