//! Environment entry handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::db::models::{EnvEntryRequest, EnvScope, EnvironmentEntry};
use crate::error::AppResult;
use crate::services::environment::EnvironmentPreview;
use crate::services::EnvironmentService;

/// Query parameters for listing entries.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListEnvQuery {
    pub scope: Option<EnvScope>,
    pub project_id: Option<i64>,
}

/// Create or replace an entry.
///
/// `POST /api/env`
///
/// ```json
/// {"scope": "project", "projectId": 3, "key": "DATABASE_URL",
///  "valueType": "secretRef", "secretId": 12}
/// ```
pub async fn upsert(
    State(service): State<EnvironmentService>,
    Json(request): Json<EnvEntryRequest>,
) -> AppResult<Json<EnvironmentEntry>> {
    Ok(Json(service.upsert(request).await?))
}

/// `GET /api/env?scope=project&projectId=3`
pub async fn list(
    State(service): State<EnvironmentService>,
    Query(query): Query<ListEnvQuery>,
) -> AppResult<Json<Vec<EnvironmentEntry>>> {
    Ok(Json(service.list(query.scope, query.project_id).await?))
}

/// `DELETE /api/env/{id}`
pub async fn delete(
    State(service): State<EnvironmentService>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Keys an application would receive on its next deployment.
///
/// `GET /api/env/preview/{application_id}`
pub async fn preview(
    State(service): State<EnvironmentService>,
    Path(application_id): Path<i64>,
) -> AppResult<Json<EnvironmentPreview>> {
    Ok(Json(service.preview(application_id).await?))
}
