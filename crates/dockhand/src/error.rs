//! Error types for the Dockhand deployer.
//!
//! `AppError` covers both the deployment taxonomy (validation, pull,
//! lifecycle, ...) and the management API. It implements `IntoResponse`
//! so handlers can return it directly.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Not found error
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Request failed validation before any side effect
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict error (duplicate key, referenced record, default registry)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Bad request error
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Registry reference could not be resolved
    #[error("Registry resolution error: {0}")]
    RegistryResolution(String),

    /// Image pull failed (network, auth, manifest)
    #[error("Pull error: {0}")]
    Pull(String),

    /// Stop/remove/create/start failed
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// A single environment entry could not be resolved
    #[error("Environment resolution error: {0}")]
    Environment(String),

    /// Tampered ciphertext, wrong key or malformed input
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// Encryption setup or encryption failure
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Callback delivery failed
    #[error("Callback delivery error: {0}")]
    Callback(String),
}

impl AppError {
    /// HTTP status this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::RegistryResolution(_) => StatusCode::BAD_REQUEST,
            AppError::Pull(_) => StatusCode::BAD_GATEWAY,
            AppError::Callback(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_)
            | AppError::Internal(_)
            | AppError::Config(_)
            | AppError::Serialization(_)
            | AppError::Lifecycle(_)
            | AppError::Environment(_)
            | AppError::Decryption(_)
            | AppError::Encryption(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_message = match &self {
            AppError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                self.to_string()
            }
            AppError::Serialization(e) => {
                tracing::error!(error = %e, "Serialization error");
                self.to_string()
            }
            AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::Conflict(msg)
            | AppError::BadRequest(msg)
            | AppError::RegistryResolution(msg) => msg.clone(),
            AppError::Pull(msg) | AppError::Callback(msg) => {
                tracing::warn!(error = %msg, "External service error");
                msg.clone()
            }
            AppError::Internal(msg)
            | AppError::Config(msg)
            | AppError::Lifecycle(msg)
            | AppError::Environment(msg)
            | AppError::Decryption(msg)
            | AppError::Encryption(msg) => {
                tracing::error!(error = %msg, "Internal error");
                msg.clone()
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<envy::Error> for AppError {
    fn from(err: envy::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Database(err.into())
    }
}
