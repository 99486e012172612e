//! Environment entry queries.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::db::models::{EnvEntryRequest, EnvScope, EnvironmentEntry};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};

const COLUMNS: &str =
    "id, scope, project_id, key, value_type, secret_id, plain_value, created_at, updated_at";

#[derive(Debug, FromRow)]
struct EnvEntryRow {
    id: i64,
    scope: String,
    project_id: Option<i64>,
    key: String,
    value_type: String,
    secret_id: Option<i64>,
    plain_value: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EnvEntryRow> for EnvironmentEntry {
    type Error = AppError;

    fn try_from(row: EnvEntryRow) -> Result<Self, Self::Error> {
        Ok(EnvironmentEntry {
            id: row.id,
            scope: row.scope.parse()?,
            project_id: row.project_id,
            key: row.key,
            value_type: row.value_type.parse()?,
            secret_id: row.secret_id,
            plain_value: row.plain_value,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Convert rows one at a time. A row whose scope or value type does not
/// parse is logged and skipped so the remaining entries still resolve.
fn entries_from_rows(rows: Vec<EnvEntryRow>) -> Vec<EnvironmentEntry> {
    rows.into_iter()
        .filter_map(|row| {
            let (id, key) = (row.id, row.key.clone());
            match EnvironmentEntry::try_from(row) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(entry_id = id, key = %key, error = %e, "Skipping malformed environment entry");
                    None
                }
            }
        })
        .collect()
}

/// List the entries of one scope.
pub async fn list_for_scope(
    pool: &DbPool,
    scope: EnvScope,
    project_id: Option<i64>,
) -> AppResult<Vec<EnvironmentEntry>> {
    let rows = match scope {
        EnvScope::Global => {
            sqlx::query_as::<_, EnvEntryRow>(&format!(
                "SELECT {} FROM env_entry WHERE scope = 'global' ORDER BY key",
                COLUMNS
            ))
            .fetch_all(pool)
            .await?
        }
        EnvScope::Project => {
            sqlx::query_as::<_, EnvEntryRow>(&format!(
                "SELECT {} FROM env_entry WHERE scope = 'project' AND project_id = $1 ORDER BY key",
                COLUMNS
            ))
            .bind(project_id)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(entries_from_rows(rows))
}

/// List every entry.
pub async fn list_all(pool: &DbPool) -> AppResult<Vec<EnvironmentEntry>> {
    let rows = sqlx::query_as::<_, EnvEntryRow>(&format!(
        "SELECT {} FROM env_entry ORDER BY scope, project_id NULLS FIRST, key",
        COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    Ok(entries_from_rows(rows))
}

/// Insert or replace the entry at `(scope, project_id, key)`.
pub async fn upsert(pool: &DbPool, request: &EnvEntryRequest) -> AppResult<EnvironmentEntry> {
    let row = sqlx::query_as::<_, EnvEntryRow>(&format!(
        r#"
        INSERT INTO env_entry (scope, project_id, key, value_type, secret_id, plain_value)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (scope, (COALESCE(project_id, 0)), key)
        DO UPDATE SET value_type = EXCLUDED.value_type,
                      secret_id = EXCLUDED.secret_id,
                      plain_value = EXCLUDED.plain_value,
                      updated_at = NOW()
        RETURNING {}
        "#,
        COLUMNS
    ))
    .bind(request.scope.as_str())
    .bind(request.project_id)
    .bind(&request.key)
    .bind(request.value_type.as_str())
    .bind(request.secret_id)
    .bind(request.plain_value.as_deref())
    .fetch_one(pool)
    .await?;

    row.try_into()
}

/// Delete an entry by ID.
pub async fn delete(pool: &DbPool, id: i64) -> AppResult<bool> {
    let result = sqlx::query("DELETE FROM env_entry WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Count entries referencing a secret.
pub async fn count_secret_references(pool: &DbPool, secret_id: i64) -> AppResult<i64> {
    let count: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM env_entry WHERE value_type = 'secretRef' AND secret_id = $1",
    )
    .bind(secret_id)
    .fetch_one(pool)
    .await?;

    Ok(count.0)
}
