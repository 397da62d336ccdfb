//! Request extractors for the remote credentials the client presents.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use domains::{AccessToken, AccountKey};
use services::validate_host;

use crate::error::ApiError;
use crate::state::AppState;

pub const INSTANCE_HOST_HEADER: &str = "x-instance-host";

/// Bearer token plus the instance it belongs to, not yet verified.
#[derive(Debug)]
pub struct Credentials {
    pub host: String,
    pub token: AccessToken,
}

impl Credentials {
    fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;

        let host = headers
            .get(INSTANCE_HOST_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ApiError::unauthorized("missing X-Instance-Host header"))?;
        validate_host(host)?;

        Ok(Self {
            host: host.to_ascii_lowercase(),
            token: AccessToken::new(token),
        })
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Credentials {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}

/// Credentials verified against the remote, resolved to the local account key.
#[derive(Debug)]
pub struct Owner {
    pub key: AccountKey,
    pub token: AccessToken,
}

impl FromRequestParts<AppState> for Owner {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let creds = Credentials::from_headers(&parts.headers)?;
        let key = state.accounts.resolve(&creds.host, &creds.token).await?;
        Ok(Self {
            key,
            token: creds.token,
        })
    }
}
