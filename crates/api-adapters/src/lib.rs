//! # api-adapters
//!
//! The JSON HTTP surface. Framework-neutral pieces (DTOs, metrics, the
//! in-flight registry, shared state) always compile; the axum router,
//! extractors and handlers sit behind the `web-axum` feature.

pub mod dto;
pub mod inflight;
pub mod metrics;
pub mod state;

#[cfg(feature = "web-axum")]
pub mod error;
#[cfg(feature = "web-axum")]
pub mod extract;
#[cfg(feature = "web-axum")]
pub mod handlers;
#[cfg(feature = "web-axum")]
pub mod routes;

pub use inflight::{InFlight, InFlightSlot};
pub use metrics::Metrics;
pub use state::AppState;

#[cfg(feature = "web-axum")]
pub use error::ApiError;
#[cfg(feature = "web-axum")]
pub use routes::router;
