//! Secret API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::db::models::{SecretCreateRequest, SecretResponse};
use crate::error::AppResult;
use crate::services::SecretService;

/// Query parameters for getting a secret.
#[derive(Debug, Deserialize, Default)]
pub struct GetSecretQuery {
    /// Include the decrypted value in the response
    #[serde(default)]
    pub reveal: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSecretValue {
    pub value: String,
}

/// Create a secret.
///
/// `POST /api/secrets`
///
/// ```json
/// {"groupId": 1, "name": "db-password", "value": "hunter2"}
/// ```
pub async fn create(
    State(service): State<SecretService>,
    Json(request): Json<SecretCreateRequest>,
) -> AppResult<(StatusCode, Json<SecretResponse>)> {
    let response = service.create(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// `GET /api/secrets`
pub async fn list(State(service): State<SecretService>) -> AppResult<Json<Vec<SecretResponse>>> {
    Ok(Json(service.list().await?))
}

/// `GET /api/secrets/{id}?reveal=true`
pub async fn get(
    State(service): State<SecretService>,
    Path(id): Path<i64>,
    Query(query): Query<GetSecretQuery>,
) -> AppResult<Json<SecretResponse>> {
    Ok(Json(service.get(id, query.reveal).await?))
}

/// Replace a secret's value.
///
/// `PUT /api/secrets/{id}`
pub async fn update(
    State(service): State<SecretService>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateSecretValue>,
) -> AppResult<Json<SecretResponse>> {
    Ok(Json(service.update_value(id, &body.value).await?))
}

/// `DELETE /api/secrets/{id}`
pub async fn delete(
    State(service): State<SecretService>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
