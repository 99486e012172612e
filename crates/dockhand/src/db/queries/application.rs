//! Application queries.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::{conflict_on_unique, port_from_column};
use crate::db::models::{Application, ApplicationUpdate, NewApplication};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};

const COLUMNS: &str = "id, name, image, version, host_port, container_port, repository_id, \
                       status, last_deployed_at, created_at, updated_at";

#[derive(Debug, FromRow)]
struct ApplicationRow {
    id: i64,
    name: String,
    image: String,
    version: String,
    host_port: i32,
    container_port: i32,
    repository_id: Option<i64>,
    status: String,
    last_deployed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ApplicationRow> for Application {
    type Error = AppError;

    fn try_from(row: ApplicationRow) -> Result<Self, Self::Error> {
        Ok(Application {
            id: row.id,
            name: row.name,
            image: row.image,
            version: row.version,
            host_port: port_from_column("host_port", row.host_port)?,
            container_port: port_from_column("container_port", row.container_port)?,
            repository_id: row.repository_id,
            status: row.status.parse()?,
            last_deployed_at: row.last_deployed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Get an application by ID.
pub async fn get_by_id(pool: &DbPool, id: i64) -> AppResult<Option<Application>> {
    let row = sqlx::query_as::<_, ApplicationRow>(&format!(
        "SELECT {} FROM application WHERE id = $1",
        COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(Application::try_from).transpose()
}

/// Get an application by name.
pub async fn get_by_name(pool: &DbPool, name: &str) -> AppResult<Option<Application>> {
    let row = sqlx::query_as::<_, ApplicationRow>(&format!(
        "SELECT {} FROM application WHERE name = $1",
        COLUMNS
    ))
    .bind(name)
    .fetch_optional(pool)
    .await?;

    row.map(Application::try_from).transpose()
}

/// Insert a new application in `stopped` state.
pub async fn insert(pool: &DbPool, app: &NewApplication) -> AppResult<Application> {
    let row = sqlx::query_as::<_, ApplicationRow>(&format!(
        r#"
        INSERT INTO application (name, image, version, host_port, container_port, repository_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {}
        "#,
        COLUMNS
    ))
    .bind(&app.name)
    .bind(&app.image)
    .bind(&app.version)
    .bind(i32::from(app.host_port))
    .bind(i32::from(app.container_port))
    .bind(app.repository_id)
    .fetch_one(pool)
    .await
    .map_err(|e| conflict_on_unique(e, &format!("Application '{}'", app.name)))?;

    row.try_into()
}

/// Apply a partial update.
pub async fn update(pool: &DbPool, id: i64, update: &ApplicationUpdate) -> AppResult<Application> {
    let row = sqlx::query_as::<_, ApplicationRow>(&format!(
        r#"
        UPDATE application
        SET status = COALESCE($2, status),
            last_deployed_at = COALESCE($3, last_deployed_at),
            version = COALESCE($4, version),
            image = COALESCE($5, image),
            host_port = COALESCE($6, host_port),
            container_port = COALESCE($7, container_port),
            repository_id = CASE WHEN $8 THEN $9 ELSE repository_id END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        COLUMNS
    ))
    .bind(id)
    .bind(update.status.map(|s| s.as_str()))
    .bind(update.last_deployed_at)
    .bind(update.version.as_deref())
    .bind(update.image.as_deref())
    .bind(update.host_port.map(i32::from))
    .bind(update.container_port.map(i32::from))
    .bind(update.repository_id.is_some())
    .bind(update.repository_id.flatten())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Application {} not found", id)))?;

    row.try_into()
}

/// List all applications ordered by name.
pub async fn list(pool: &DbPool) -> AppResult<Vec<Application>> {
    let rows = sqlx::query_as::<_, ApplicationRow>(&format!(
        "SELECT {} FROM application ORDER BY name",
        COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Application::try_from).collect()
}
