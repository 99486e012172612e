//! Database queries for the PostgreSQL store.

pub mod application;
pub mod deployment_log;
pub mod environment;
pub mod registry;
pub mod secret;

use crate::error::AppError;

/// Convert a stored port column back into a port number.
pub(crate) fn port_from_column(column: &str, value: i32) -> Result<u16, AppError> {
    u16::try_from(value)
        .map_err(|_| AppError::Internal(format!("Stored {} {} is out of range", column, value)))
}

/// Map a unique-constraint violation to `Conflict`.
pub(crate) fn conflict_on_unique(err: sqlx::Error, what: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(format!("{} already exists", what))
        }
        _ => AppError::Database(err),
    }
}
