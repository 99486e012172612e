//! Deployment log queries.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::db::models::{DeploymentLogRecord, DeploymentStatus, NewDeploymentLog};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};

const COLUMNS: &str = "id, application_id, deployment_id, version, trigger_type, status, \
                       started_at, completed_at, duration_ms, error_message";

#[derive(Debug, FromRow)]
struct DeploymentLogRow {
    id: i64,
    application_id: i64,
    deployment_id: Uuid,
    version: String,
    trigger_type: String,
    status: String,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    duration_ms: Option<i64>,
    error_message: Option<String>,
}

impl TryFrom<DeploymentLogRow> for DeploymentLogRecord {
    type Error = AppError;

    fn try_from(row: DeploymentLogRow) -> Result<Self, Self::Error> {
        Ok(DeploymentLogRecord {
            id: row.id,
            application_id: row.application_id,
            deployment_id: row.deployment_id,
            version: row.version,
            trigger_type: row.trigger_type.parse()?,
            status: row.status.parse()?,
            started_at: row.started_at,
            completed_at: row.completed_at,
            duration_ms: row.duration_ms,
            error_message: row.error_message,
        })
    }
}

/// Insert a pending log record.
pub async fn insert(pool: &DbPool, log: &NewDeploymentLog) -> AppResult<i64> {
    let result: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO deployment_log
            (application_id, deployment_id, version, trigger_type, status, started_at)
        VALUES ($1, $2, $3, $4, 'pending', $5)
        RETURNING id
        "#,
    )
    .bind(log.application_id)
    .bind(log.deployment_id)
    .bind(&log.version)
    .bind(log.trigger_type.as_str())
    .bind(log.started_at)
    .fetch_one(pool)
    .await?;

    Ok(result.0)
}

/// Complete a pending log. Returns `false` when no pending row matched.
pub async fn complete(
    pool: &DbPool,
    id: i64,
    status: DeploymentStatus,
    error_message: Option<&str>,
    completed_at: DateTime<Utc>,
) -> AppResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE deployment_log
        SET status = $2,
            error_message = $3,
            completed_at = $4,
            duration_ms = GREATEST(0, (EXTRACT(EPOCH FROM ($4 - started_at)) * 1000)::BIGINT)
        WHERE id = $1 AND status = 'pending'
        "#,
    )
    .bind(id)
    .bind(status.as_str())
    .bind(error_message)
    .bind(completed_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Get a log record by ID.
pub async fn get_by_id(pool: &DbPool, id: i64) -> AppResult<Option<DeploymentLogRecord>> {
    let row = sqlx::query_as::<_, DeploymentLogRow>(&format!(
        "SELECT {} FROM deployment_log WHERE id = $1",
        COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(DeploymentLogRecord::try_from).transpose()
}

/// List an application's logs, most recent first.
pub async fn list_for_application(
    pool: &DbPool,
    application_id: i64,
) -> AppResult<Vec<DeploymentLogRecord>> {
    let rows = sqlx::query_as::<_, DeploymentLogRow>(&format!(
        "SELECT {} FROM deployment_log WHERE application_id = $1 ORDER BY started_at DESC, id DESC",
        COLUMNS
    ))
    .bind(application_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(DeploymentLogRecord::try_from).collect()
}
