//! HTTP failures mapped onto domain errors.

use std::time::Duration;

use chrono::{DateTime, Utc};
use domains::DomainError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;

const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

pub(crate) fn transport_error(err: reqwest::Error) -> DomainError {
    if err.is_timeout() {
        DomainError::Transport(format!("request timed out: {err}"))
    } else if err.is_decode() {
        DomainError::Transport(format!("undecodable response: {err}"))
    } else {
        DomainError::Transport(err.to_string())
    }
}

/// Maps a non-success status to the error the sync engine reacts to.
pub(crate) fn status_error(status: StatusCode, headers: &HeaderMap, what: &str) -> DomainError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            DomainError::Auth(format!("{what}: remote answered {status}"))
        }
        StatusCode::NOT_FOUND => DomainError::not_found("remote resource", what),
        StatusCode::TOO_MANY_REQUESTS => DomainError::RateLimited {
            retry_after: retry_after(headers, Utc::now()),
        },
        _ => DomainError::Transport(format!("{what}: remote answered {status}")),
    }
}

/// `Retry-After` in seconds wins; otherwise the distance to Mastodon's
/// `X-RateLimit-Reset` timestamp.
fn retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let header = |name| headers.get(name).and_then(|v| v.to_str().ok());

    if let Some(secs) = header(RETRY_AFTER.as_str()).and_then(|v| v.trim().parse::<u64>().ok()) {
        return Some(Duration::from_secs(secs));
    }

    let reset = DateTime::parse_from_rfc3339(header(RATE_LIMIT_RESET)?).ok()?;
    let wait = reset.with_timezone(&Utc) - now;
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));
        assert_eq!(retry_after(&headers, Utc::now()), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_retry_after_from_reset_timestamp() {
        let now = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut headers = HeaderMap::new();
        headers.insert(
            RATE_LIMIT_RESET,
            HeaderValue::from_static("2024-05-01T12:05:00.000Z"),
        );
        assert_eq!(retry_after(&headers, now), Some(Duration::from_secs(300)));

        // a reset in the past means "go ahead"
        let later = now + chrono::Duration::hours(1);
        assert_eq!(retry_after(&headers, later), Some(Duration::ZERO));
    }

    #[test]
    fn test_status_mapping() {
        let headers = HeaderMap::new();
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, &headers, "statuses"),
            DomainError::Auth(_)
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, &headers, "statuses"),
            DomainError::NotFound(..)
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, &headers, "statuses"),
            DomainError::RateLimited { retry_after: None }
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, &headers, "statuses"),
            DomainError::Transport(_)
        ));
    }
}
