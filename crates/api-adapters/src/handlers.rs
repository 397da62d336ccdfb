//! # Handlers
//!
//! Thin glue between HTTP and the services: extract, call, map to DTO.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use domains::DomainError;
use services::{HeadSync, TailSync};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dto::{
    ArchiveDto, ArchiveQuery, FetchStateDto, PublicProfileDto, PublicRequest, SessionDto,
    VisibilityRequest,
};
use crate::error::ApiError;
use crate::extract::{Credentials, Owner};
use crate::metrics::{Outcome, SyncKind, CONTENT_TYPE};
use crate::state::AppState;

type ApiResult<T> = Result<T, ApiError>;

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

pub async fn create_session(
    State(state): State<AppState>,
    creds: Credentials,
) -> ApiResult<(StatusCode, Json<SessionDto>)> {
    let outcome = state
        .accounts
        .register_login(&creds.host, &creds.token)
        .await?;
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome.into())))
}

pub async fn list_statuses(
    State(state): State<AppState>,
    owner: Owner,
    Query(query): Query<ArchiveQuery>,
) -> ApiResult<Json<ArchiveDto>> {
    let view = state
        .accounts
        .archive(&owner.key, query.q.as_deref())
        .await?;
    Ok(Json(ArchiveDto::new(view, state.display_tz)))
}

pub async fn sync_head(State(state): State<AppState>, owner: Owner) -> ApiResult<Json<HeadSync>> {
    let result = state.sync.sync_head(&owner.key, &owner.token).await;
    match &result {
        Ok(head) => {
            state.metrics.record_pass(SyncKind::Head, Outcome::Ok);
            state.metrics.record_inserted(SyncKind::Head, head.inserted_count);
        }
        Err(_) => state.metrics.record_pass(SyncKind::Head, Outcome::Error),
    }
    Ok(Json(result?))
}

/// Runs one backfill pass. A second request for the same account while the
/// first is running gets 409; the pass is cancelled once the configured
/// timeout elapses and reports `completed: false`.
pub async fn sync_tail(State(state): State<AppState>, owner: Owner) -> ApiResult<Json<TailSync>> {
    let Some(_slot) = state.in_flight.try_acquire(&owner.key) else {
        state.metrics.record_pass(SyncKind::Tail, Outcome::Rejected);
        warn!(account = %owner.key, "backfill already running");
        let msg = format!("a backfill for {} is already running", owner.key);
        return Err(DomainError::Conflict(msg).into());
    };

    let cancel = CancellationToken::new();
    let pass = state.sync.sync_tail(&owner.key, &owner.token, &cancel);
    tokio::pin!(pass);

    // on timeout the pass is cancelled, not dropped, so it can report what it stored
    let result = match tokio::time::timeout(state.backfill_timeout, &mut pass).await {
        Ok(result) => result,
        Err(_) => {
            info!(account = %owner.key, timeout = ?state.backfill_timeout, "backfill timed out, cancelling");
            cancel.cancel();
            pass.await
        }
    };

    match &result {
        Ok(tail) => {
            let outcome = if tail.completed {
                Outcome::Ok
            } else {
                Outcome::Cancelled
            };
            state.metrics.record_pass(SyncKind::Tail, outcome);
            state.metrics.record_inserted(SyncKind::Tail, tail.inserted_total);
        }
        Err(_) => state.metrics.record_pass(SyncKind::Tail, Outcome::Error),
    }
    Ok(Json(result?))
}

pub async fn fetch_state(
    State(state): State<AppState>,
    owner: Owner,
) -> ApiResult<Json<FetchStateDto>> {
    let fetch_state = state.sync.fetch_state(&owner.key).await?;
    Ok(Json(fetch_state.into()))
}

pub async fn set_public(
    State(state): State<AppState>,
    owner: Owner,
    Json(body): Json<PublicRequest>,
) -> ApiResult<StatusCode> {
    state.accounts.set_public(&owner.key, body.public).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_visibility(
    State(state): State<AppState>,
    owner: Owner,
    Json(body): Json<VisibilityRequest>,
) -> ApiResult<StatusCode> {
    state
        .accounts
        .set_visibility_exposure(&owner.key, body.into())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn public_profile(
    State(state): State<AppState>,
    Path((host, user_name)): Path<(String, String)>,
) -> ApiResult<Json<PublicProfileDto>> {
    let profile = state
        .accounts
        .public_profile(&host.to_ascii_lowercase(), &user_name)
        .await?;
    Ok(Json(PublicProfileDto::new(profile, state.display_tz)))
}
