//! PostgreSQL-backed store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ApplicationStore, DeploymentLogStore, EnvEntryStore, RepositoryStore, SecretStore};
use crate::db::models::{
    Application, ApplicationUpdate, DeploymentLogRecord, DeploymentStatus, EnvEntryRequest,
    EnvScope, EnvironmentEntry, NewApplication, NewDeploymentLog, NewSecret, RegistryCredential,
    RegistryCredentialRequest, SecretRecord,
};
use crate::db::pool::health_check;
use crate::db::queries;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};

/// Store backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Check database connectivity.
    pub async fn is_healthy(&self) -> bool {
        health_check(&self.pool).await
    }
}

#[async_trait]
impl ApplicationStore for PgStore {
    async fn get_by_id(&self, id: i64) -> AppResult<Option<Application>> {
        queries::application::get_by_id(&self.pool, id).await
    }

    async fn get_by_name(&self, name: &str) -> AppResult<Option<Application>> {
        queries::application::get_by_name(&self.pool, name).await
    }

    async fn create(&self, app: NewApplication) -> AppResult<Application> {
        queries::application::insert(&self.pool, &app).await
    }

    async fn update(&self, id: i64, update: ApplicationUpdate) -> AppResult<Application> {
        queries::application::update(&self.pool, id, &update).await
    }

    async fn list(&self) -> AppResult<Vec<Application>> {
        queries::application::list(&self.pool).await
    }
}

#[async_trait]
impl RepositoryStore for PgStore {
    async fn get_by_id(&self, id: i64) -> AppResult<Option<RegistryCredential>> {
        queries::registry::get_by_id(&self.pool, id).await
    }

    async fn get_default(&self) -> AppResult<Option<RegistryCredential>> {
        queries::registry::get_default(&self.pool).await
    }

    async fn list(&self) -> AppResult<Vec<RegistryCredential>> {
        queries::registry::list(&self.pool).await
    }

    async fn create(&self, request: RegistryCredentialRequest) -> AppResult<RegistryCredential> {
        queries::registry::insert(&self.pool, &request).await
    }

    async fn update(
        &self,
        id: i64,
        request: RegistryCredentialRequest,
    ) -> AppResult<RegistryCredential> {
        queries::registry::update(&self.pool, id, &request).await
    }

    async fn set_default(&self, id: i64) -> AppResult<RegistryCredential> {
        queries::registry::set_default(&self.pool, id).await
    }

    async fn delete(&self, id: i64) -> AppResult<bool> {
        queries::registry::delete(&self.pool, id).await
    }
}

#[async_trait]
impl EnvEntryStore for PgStore {
    async fn list_for_scope(
        &self,
        scope: EnvScope,
        project_id: Option<i64>,
    ) -> AppResult<Vec<EnvironmentEntry>> {
        queries::environment::list_for_scope(&self.pool, scope, project_id).await
    }

    async fn list_all(&self) -> AppResult<Vec<EnvironmentEntry>> {
        queries::environment::list_all(&self.pool).await
    }

    async fn upsert(&self, request: EnvEntryRequest) -> AppResult<EnvironmentEntry> {
        queries::environment::upsert(&self.pool, &request).await
    }

    async fn delete(&self, id: i64) -> AppResult<bool> {
        queries::environment::delete(&self.pool, id).await
    }

    async fn count_secret_references(&self, secret_id: i64) -> AppResult<i64> {
        queries::environment::count_secret_references(&self.pool, secret_id).await
    }
}

#[async_trait]
impl SecretStore for PgStore {
    async fn get_encrypted_value(&self, secret_id: i64) -> AppResult<Option<String>> {
        queries::secret::get_encrypted_value(&self.pool, secret_id).await
    }

    async fn get(&self, secret_id: i64) -> AppResult<Option<SecretRecord>> {
        queries::secret::get_by_id(&self.pool, secret_id).await
    }

    async fn list(&self) -> AppResult<Vec<SecretRecord>> {
        queries::secret::list(&self.pool).await
    }

    async fn create(&self, secret: NewSecret) -> AppResult<SecretRecord> {
        queries::secret::insert(&self.pool, &secret).await
    }

    async fn update_value(
        &self,
        secret_id: i64,
        encrypted_value: String,
    ) -> AppResult<SecretRecord> {
        queries::secret::update_value(&self.pool, secret_id, &encrypted_value).await
    }

    async fn delete(&self, secret_id: i64) -> AppResult<bool> {
        queries::secret::delete(&self.pool, secret_id).await
    }
}

#[async_trait]
impl DeploymentLogStore for PgStore {
    async fn create(&self, log: NewDeploymentLog) -> AppResult<i64> {
        queries::deployment_log::insert(&self.pool, &log).await
    }

    async fn complete(
        &self,
        log_id: i64,
        status: DeploymentStatus,
        error_message: Option<String>,
        completed_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let updated = queries::deployment_log::complete(
            &self.pool,
            log_id,
            status,
            error_message.as_deref(),
            completed_at,
        )
        .await?;

        if updated {
            return Ok(());
        }
        match queries::deployment_log::get_by_id(&self.pool, log_id).await? {
            Some(_) => Err(AppError::Conflict(format!(
                "Deployment log {} is already completed",
                log_id
            ))),
            None => Err(AppError::NotFound(format!(
                "Deployment log {} not found",
                log_id
            ))),
        }
    }

    async fn get(&self, log_id: i64) -> AppResult<Option<DeploymentLogRecord>> {
        queries::deployment_log::get_by_id(&self.pool, log_id).await
    }

    async fn list_for_application(
        &self,
        application_id: i64,
    ) -> AppResult<Vec<DeploymentLogRecord>> {
        queries::deployment_log::list_for_application(&self.pool, application_id).await
    }
}
