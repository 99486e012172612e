//! Storage interfaces consumed by the deployment core.
//!
//! Two implementations ship with the crate: [`MemoryStore`] for development
//! and tests, and [`PgStore`] backed by PostgreSQL.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::models::{
    Application, ApplicationUpdate, DeploymentLogRecord, DeploymentStatus, EnvEntryRequest,
    EnvScope, EnvironmentEntry, NewApplication, NewDeploymentLog, NewSecret, RegistryCredential,
    RegistryCredentialRequest, SecretRecord,
};
use crate::error::AppResult;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn get_by_id(&self, id: i64) -> AppResult<Option<Application>>;

    async fn get_by_name(&self, name: &str) -> AppResult<Option<Application>>;

    /// Register a new application. Names are unique.
    async fn create(&self, app: NewApplication) -> AppResult<Application>;

    async fn update(&self, id: i64, update: ApplicationUpdate) -> AppResult<Application>;

    async fn list(&self) -> AppResult<Vec<Application>>;
}

#[async_trait]
pub trait RepositoryStore: Send + Sync {
    async fn get_by_id(&self, id: i64) -> AppResult<Option<RegistryCredential>>;

    async fn get_default(&self) -> AppResult<Option<RegistryCredential>>;

    async fn list(&self) -> AppResult<Vec<RegistryCredential>>;

    /// Create a credential. A new default demotes the previous one.
    async fn create(&self, request: RegistryCredentialRequest) -> AppResult<RegistryCredential>;

    /// Update in place. Setting `is_default` demotes the previous default.
    async fn update(
        &self,
        id: i64,
        request: RegistryCredentialRequest,
    ) -> AppResult<RegistryCredential>;

    /// Promote a credential to default, demoting any other.
    async fn set_default(&self, id: i64) -> AppResult<RegistryCredential>;

    async fn delete(&self, id: i64) -> AppResult<bool>;
}

#[async_trait]
pub trait EnvEntryStore: Send + Sync {
    /// Entries of one scope. `project_id` is ignored for the global scope.
    async fn list_for_scope(
        &self,
        scope: EnvScope,
        project_id: Option<i64>,
    ) -> AppResult<Vec<EnvironmentEntry>>;

    async fn list_all(&self) -> AppResult<Vec<EnvironmentEntry>>;

    /// Create or replace the entry at `(scope, project_id, key)`.
    async fn upsert(&self, request: EnvEntryRequest) -> AppResult<EnvironmentEntry>;

    async fn delete(&self, id: i64) -> AppResult<bool>;

    /// Number of entries that reference a secret.
    async fn count_secret_references(&self, secret_id: i64) -> AppResult<i64>;
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_encrypted_value(&self, secret_id: i64) -> AppResult<Option<String>>;

    async fn get(&self, secret_id: i64) -> AppResult<Option<SecretRecord>>;

    async fn list(&self) -> AppResult<Vec<SecretRecord>>;

    /// Create a secret. `(group_id, name)` is unique.
    async fn create(&self, secret: NewSecret) -> AppResult<SecretRecord>;

    async fn update_value(&self, secret_id: i64, encrypted_value: String)
        -> AppResult<SecretRecord>;

    async fn delete(&self, secret_id: i64) -> AppResult<bool>;
}

#[async_trait]
pub trait DeploymentLogStore: Send + Sync {
    /// Record a `pending` attempt and return its id.
    async fn create(&self, log: NewDeploymentLog) -> AppResult<i64>;

    /// Move a pending log to its terminal status.
    ///
    /// Completing an already completed log is a `Conflict`.
    async fn complete(
        &self,
        log_id: i64,
        status: DeploymentStatus,
        error_message: Option<String>,
        completed_at: DateTime<Utc>,
    ) -> AppResult<()>;

    async fn get(&self, log_id: i64) -> AppResult<Option<DeploymentLogRecord>>;

    /// Most recent first.
    async fn list_for_application(&self, application_id: i64)
        -> AppResult<Vec<DeploymentLogRecord>>;
}

/// Handles to every store, shared by services and the orchestrator.
#[derive(Clone)]
pub struct Stores {
    pub applications: Arc<dyn ApplicationStore>,
    pub repositories: Arc<dyn RepositoryStore>,
    pub env_entries: Arc<dyn EnvEntryStore>,
    pub secrets: Arc<dyn SecretStore>,
    pub deployment_logs: Arc<dyn DeploymentLogStore>,
}

impl Stores {
    /// Use one backend for every store.
    pub fn single<S>(backend: Arc<S>) -> Self
    where
        S: ApplicationStore
            + RepositoryStore
            + EnvEntryStore
            + SecretStore
            + DeploymentLogStore
            + 'static,
    {
        Self {
            applications: backend.clone(),
            repositories: backend.clone(),
            env_entries: backend.clone(),
            secrets: backend.clone(),
            deployment_logs: backend,
        }
    }
}
