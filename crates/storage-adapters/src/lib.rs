//! # storage-adapters
//!
//! sqlx implementations of the repository ports. Each backend sits behind
//! its own cargo feature; migrations live next to the crate and are embedded
//! at compile time.

use std::time::Duration;

#[cfg(any(feature = "db-postgres", feature = "db-sqlite"))]
mod error;

#[cfg(feature = "db-postgres")]
pub mod postgres;
#[cfg(feature = "db-postgres")]
pub use postgres::PgArchive;

#[cfg(feature = "db-sqlite")]
pub mod sqlite;
#[cfg(feature = "db-sqlite")]
pub use sqlite::SqliteArchive;

/// Connection pool sizing shared by both backends.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}
