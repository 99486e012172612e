//! Registry credential queries.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, Transaction};

use super::conflict_on_unique;
use crate::db::models::{RegistryCredential, RegistryCredentialRequest};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};

const COLUMNS: &str = "id, name, registry_url, auth_type, username, password, token, \
                       is_default, created_at, updated_at";

#[derive(Debug, FromRow)]
struct RegistryRow {
    id: i64,
    name: String,
    registry_url: String,
    auth_type: String,
    username: Option<String>,
    password: Option<String>,
    token: Option<String>,
    is_default: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RegistryRow> for RegistryCredential {
    type Error = AppError;

    fn try_from(row: RegistryRow) -> Result<Self, Self::Error> {
        Ok(RegistryCredential {
            id: row.id,
            name: row.name,
            registry_url: row.registry_url,
            auth_type: row.auth_type.parse()?,
            username: row.username,
            password: row.password,
            token: row.token,
            is_default: row.is_default,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Demote whichever credential is currently the default.
async fn clear_default(tx: &mut Transaction<'_, Postgres>, except: Option<i64>) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE registry_credential
        SET is_default = FALSE, updated_at = NOW()
        WHERE is_default AND ($1::BIGINT IS NULL OR id <> $1)
        "#,
    )
    .bind(except)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Get a registry credential by ID.
pub async fn get_by_id(pool: &DbPool, id: i64) -> AppResult<Option<RegistryCredential>> {
    let row = sqlx::query_as::<_, RegistryRow>(&format!(
        "SELECT {} FROM registry_credential WHERE id = $1",
        COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(RegistryCredential::try_from).transpose()
}

/// Get the default registry credential, if any.
pub async fn get_default(pool: &DbPool) -> AppResult<Option<RegistryCredential>> {
    let row = sqlx::query_as::<_, RegistryRow>(&format!(
        "SELECT {} FROM registry_credential WHERE is_default LIMIT 1",
        COLUMNS
    ))
    .fetch_optional(pool)
    .await?;

    row.map(RegistryCredential::try_from).transpose()
}

/// List registry credentials ordered by name.
pub async fn list(pool: &DbPool) -> AppResult<Vec<RegistryCredential>> {
    let rows = sqlx::query_as::<_, RegistryRow>(&format!(
        "SELECT {} FROM registry_credential ORDER BY name",
        COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(RegistryCredential::try_from).collect()
}

/// Insert a credential, demoting the previous default when needed.
pub async fn insert(
    pool: &DbPool,
    request: &RegistryCredentialRequest,
) -> AppResult<RegistryCredential> {
    let mut tx = pool.begin().await?;
    if request.is_default {
        clear_default(&mut tx, None).await?;
    }

    let row = sqlx::query_as::<_, RegistryRow>(&format!(
        r#"
        INSERT INTO registry_credential
            (name, registry_url, auth_type, username, password, token, is_default)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {}
        "#,
        COLUMNS
    ))
    .bind(&request.name)
    .bind(&request.registry_url)
    .bind(request.auth_type.as_str())
    .bind(request.username.as_deref())
    .bind(request.password.as_deref())
    .bind(request.token.as_deref())
    .bind(request.is_default)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| conflict_on_unique(e, &format!("Registry '{}'", request.name)))?;

    tx.commit().await?;
    row.try_into()
}

/// Update a credential in place.
pub async fn update(
    pool: &DbPool,
    id: i64,
    request: &RegistryCredentialRequest,
) -> AppResult<RegistryCredential> {
    let mut tx = pool.begin().await?;
    if request.is_default {
        clear_default(&mut tx, Some(id)).await?;
    }

    let row = sqlx::query_as::<_, RegistryRow>(&format!(
        r#"
        UPDATE registry_credential
        SET name = $2, registry_url = $3, auth_type = $4, username = $5,
            password = $6, token = $7, is_default = $8, updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        COLUMNS
    ))
    .bind(id)
    .bind(&request.name)
    .bind(&request.registry_url)
    .bind(request.auth_type.as_str())
    .bind(request.username.as_deref())
    .bind(request.password.as_deref())
    .bind(request.token.as_deref())
    .bind(request.is_default)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| conflict_on_unique(e, &format!("Registry '{}'", request.name)))?
    .ok_or_else(|| AppError::NotFound(format!("Registry {} not found", id)))?;

    tx.commit().await?;
    row.try_into()
}

/// Promote a credential to default.
pub async fn set_default(pool: &DbPool, id: i64) -> AppResult<RegistryCredential> {
    let mut tx = pool.begin().await?;
    clear_default(&mut tx, Some(id)).await?;

    let row = sqlx::query_as::<_, RegistryRow>(&format!(
        r#"
        UPDATE registry_credential
        SET is_default = TRUE, updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Registry {} not found", id)))?;

    tx.commit().await?;
    row.try_into()
}

/// Delete a credential by ID.
pub async fn delete(pool: &DbPool, id: i64) -> AppResult<bool> {
    let result = sqlx::query("DELETE FROM registry_credential WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
