//! Deployment and application endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::db::models::{Application, DeploymentLogRecord};
use crate::deploy::{DeploymentRequest, DeploymentResult};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Deploy a container.
///
/// `POST /api/deploy`
///
/// # Request Body
///
/// ```json
/// {
///   "name": "web",
///   "image": "nginx",
///   "version": "1.27",
///   "hostPort": 8080,
///   "containerPort": 80,
///   "repositoryId": 2,
///   "extraEnv": {"FEATURE_X": "on"},
///   "triggerType": "webhook"
/// }
/// ```
///
/// The response status mirrors `code` in the body. Requests for the same
/// container name are handled one at a time.
pub async fn deploy(
    State(state): State<AppState>,
    Json(request): Json<DeploymentRequest>,
) -> (StatusCode, Json<DeploymentResult>) {
    let _guard = state.deploy_locks.acquire(&request.target_name()).await;
    let result = state.orchestrator.deploy(request).await;
    let status = StatusCode::from_u16(result.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(result))
}

/// `GET /api/applications`
pub async fn list_applications(State(state): State<AppState>) -> AppResult<Json<Vec<Application>>> {
    Ok(Json(state.stores.applications.list().await?))
}

/// `GET /api/applications/{name}/deployments`
///
/// Deployment history, newest first.
pub async fn list_deployments(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<Vec<DeploymentLogRecord>>> {
    let application = state
        .stores
        .applications
        .get_by_name(&name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Application '{}' not found", name)))?;

    Ok(Json(
        state
            .stores
            .deployment_logs
            .list_for_application(application.id)
            .await?,
    ))
}
