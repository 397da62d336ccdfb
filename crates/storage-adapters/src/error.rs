//! Translation of sqlx failures into domain errors.

use domains::DomainError;

/// Unique violations are conflicts the caller can act on; everything else,
/// including foreign-key violations, is a storage failure.
pub(crate) fn storage_error(err: sqlx::Error) -> DomainError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            DomainError::Conflict(db.message().to_string())
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            DomainError::Storage(format!("constraint violated: {}", db.message()))
        }
        _ => DomainError::Storage(err.to_string()),
    }
}

pub(crate) fn migrate_error(err: sqlx::migrate::MigrateError) -> DomainError {
    DomainError::Storage(format!("migration failed: {err}"))
}
