//! # DomainError
//!
//! Centralized error handling for statuslog.
//! Adapters translate library failures into these variants at the port boundary.

use std::time::Duration;

use thiserror::Error;

/// The primary error type for all domain and port operations.
#[derive(Error, Debug)]
pub enum DomainError {
    /// Resource not found (e.g., Account, App)
    #[error("{0} not found: {1}")]
    NotFound(String, String),

    /// Remote instance unreachable, timed out, or answered with garbage
    #[error("transport error: {0}")]
    Transport(String),

    /// Credentials rejected by the remote; retrying needs re-authentication
    #[error("unauthorized: {0}")]
    Auth(String),

    /// Remote asked us to slow down
    #[error("rate limited by remote instance")]
    RateLimited { retry_after: Option<Duration> },

    /// Local persistence failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Resource already exists (e.g., duplicate app registration)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Input rejected before reaching any collaborator
    #[error("validation error: {0}")]
    Validation(String),
}

impl DomainError {
    pub fn not_found(entity: &str, key: impl ToString) -> Self {
        DomainError::NotFound(entity.to_string(), key.to_string())
    }

    /// Whether the same call may succeed later without user intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DomainError::Transport(_) | DomainError::RateLimited { .. } | DomainError::Storage(_)
        )
    }
}

/// A specialized Result type for statuslog logic.
pub type Result<T> = std::result::Result<T, DomainError>;
