//! Registry credential handlers.
//!
//! Passwords and tokens are accepted on input and never returned.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::db::models::{RegistryCredential, RegistryCredentialRequest};
use crate::error::AppResult;
use crate::services::RegistryService;

/// `POST /api/registries`
pub async fn create(
    State(service): State<RegistryService>,
    Json(request): Json<RegistryCredentialRequest>,
) -> AppResult<(StatusCode, Json<RegistryCredential>)> {
    Ok((StatusCode::CREATED, Json(service.create(request).await?)))
}

/// `GET /api/registries`
pub async fn list(
    State(service): State<RegistryService>,
) -> AppResult<Json<Vec<RegistryCredential>>> {
    Ok(Json(service.list().await?))
}

/// `GET /api/registries/{id}`
pub async fn get(
    State(service): State<RegistryService>,
    Path(id): Path<i64>,
) -> AppResult<Json<RegistryCredential>> {
    Ok(Json(service.get(id).await?))
}

/// `PUT /api/registries/{id}`
pub async fn update(
    State(service): State<RegistryService>,
    Path(id): Path<i64>,
    Json(request): Json<RegistryCredentialRequest>,
) -> AppResult<Json<RegistryCredential>> {
    Ok(Json(service.update(id, request).await?))
}

/// `POST /api/registries/{id}/default`
pub async fn set_default(
    State(service): State<RegistryService>,
    Path(id): Path<i64>,
) -> AppResult<Json<RegistryCredential>> {
    Ok(Json(service.set_default(id).await?))
}

/// `DELETE /api/registries/{id}`
pub async fn delete(
    State(service): State<RegistryService>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
