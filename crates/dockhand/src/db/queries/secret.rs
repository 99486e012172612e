//! Secret queries.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::conflict_on_unique;
use crate::db::models::{NewSecret, SecretRecord};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};

const COLUMNS: &str = "id, group_id, name, encrypted_value, source, created_at, updated_at";

#[derive(Debug, FromRow)]
struct SecretRow {
    id: i64,
    group_id: i64,
    name: String,
    encrypted_value: String,
    source: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SecretRow> for SecretRecord {
    type Error = AppError;

    fn try_from(row: SecretRow) -> Result<Self, Self::Error> {
        Ok(SecretRecord {
            id: row.id,
            group_id: row.group_id,
            name: row.name,
            encrypted_value: row.encrypted_value,
            source: row.source.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Get only the encrypted value of a secret.
pub async fn get_encrypted_value(pool: &DbPool, id: i64) -> AppResult<Option<String>> {
    let value: Option<(String,)> =
        sqlx::query_as("SELECT encrypted_value FROM secret WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

    Ok(value.map(|v| v.0))
}

/// Get a secret by ID.
pub async fn get_by_id(pool: &DbPool, id: i64) -> AppResult<Option<SecretRecord>> {
    let row = sqlx::query_as::<_, SecretRow>(&format!(
        "SELECT {} FROM secret WHERE id = $1",
        COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(SecretRecord::try_from).transpose()
}

/// List secrets ordered by group and name.
pub async fn list(pool: &DbPool) -> AppResult<Vec<SecretRecord>> {
    let rows = sqlx::query_as::<_, SecretRow>(&format!(
        "SELECT {} FROM secret ORDER BY group_id, name",
        COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(SecretRecord::try_from).collect()
}

/// Insert a new secret.
pub async fn insert(pool: &DbPool, secret: &NewSecret) -> AppResult<SecretRecord> {
    let row = sqlx::query_as::<_, SecretRow>(&format!(
        r#"
        INSERT INTO secret (group_id, name, encrypted_value, source)
        VALUES ($1, $2, $3, $4)
        RETURNING {}
        "#,
        COLUMNS
    ))
    .bind(secret.group_id)
    .bind(&secret.name)
    .bind(&secret.encrypted_value)
    .bind(secret.source.as_str())
    .fetch_one(pool)
    .await
    .map_err(|e| conflict_on_unique(e, &format!("Secret '{}'", secret.name)))?;

    row.try_into()
}

/// Replace the encrypted value of a secret.
pub async fn update_value(pool: &DbPool, id: i64, encrypted_value: &str) -> AppResult<SecretRecord> {
    let row = sqlx::query_as::<_, SecretRow>(&format!(
        r#"
        UPDATE secret SET encrypted_value = $2, updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        COLUMNS
    ))
    .bind(id)
    .bind(encrypted_value)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Secret {} not found", id)))?;

    row.try_into()
}

/// Delete a secret by ID.
pub async fn delete(pool: &DbPool, id: i64) -> AppResult<bool> {
    let result = sqlx::query("DELETE FROM secret WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
