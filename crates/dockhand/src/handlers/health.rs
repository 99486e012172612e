//! Health check endpoints.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::config::StoreBackend;
use crate::db::pool::health_check as db_health_check;
use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: String,
}

/// Detailed health check response for the API.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealthResponse {
    /// Overall health status ("ok" or "unhealthy")
    pub status: String,

    /// Docker engine status ("ok" or "unreachable")
    pub docker: String,

    /// Database connectivity status, Postgres store only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    pub store: String,

    pub uptime_seconds: u64,

    pub version: String,
}

/// `GET /health`
///
/// Liveness only; never touches dependencies.
pub async fn health_check() -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "ok".to_string(),
    })
}

/// `GET /api/health`
///
/// Pings the Docker engine and, when configured, the database.
/// Returns `503 Service Unavailable` if either is unhealthy.
pub async fn api_health(State(state): State<AppState>) -> (StatusCode, Json<ApiHealthResponse>) {
    let docker_ok = match state.engine.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Docker engine ping failed");
            false
        }
    };

    let database_ok = match state.db {
        Some(ref pool) => Some(db_health_check(pool).await),
        None => None,
    };

    let healthy = docker_ok && database_ok.unwrap_or(true);
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let store = match state.config.store {
        StoreBackend::Memory => "memory",
        StoreBackend::Postgres => "postgres",
    };

    (
        status,
        Json(ApiHealthResponse {
            status: if healthy { "ok" } else { "unhealthy" }.to_string(),
            docker: if docker_ok { "ok" } else { "unreachable" }.to_string(),
            database: database_ok.map(|ok| if ok { "ok" } else { "unhealthy" }.to_string()),
            store: store.to_string(),
            uptime_seconds: state.uptime_seconds(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}
