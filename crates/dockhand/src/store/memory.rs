//! In-memory store.
//!
//! Keeps every record in `BTreeMap`s behind one `RwLock`, enforcing the same
//! uniqueness rules as the PostgreSQL schema. Data is lost on restart.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{ApplicationStore, DeploymentLogStore, EnvEntryStore, RepositoryStore, SecretStore};
use crate::db::models::{
    Application, ApplicationStatus, ApplicationUpdate, DeploymentLogRecord, DeploymentStatus,
    EnvEntryRequest, EnvScope, EnvValueType, EnvironmentEntry, NewApplication, NewDeploymentLog,
    NewSecret, RegistryCredential, RegistryCredentialRequest, SecretRecord,
};
use crate::error::{AppError, AppResult};

#[derive(Default)]
struct Inner {
    next_id: i64,
    applications: BTreeMap<i64, Application>,
    registries: BTreeMap<i64, RegistryCredential>,
    env_entries: BTreeMap<i64, EnvironmentEntry>,
    secrets: BTreeMap<i64, SecretRecord>,
    deployment_logs: BTreeMap<i64, DeploymentLogRecord>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn clear_default_registry(&mut self, except: i64) {
        for registry in self.registries.values_mut() {
            if registry.id != except {
                registry.is_default = false;
            }
        }
    }
}

/// Store holding everything in process memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApplicationStore for MemoryStore {
    async fn get_by_id(&self, id: i64) -> AppResult<Option<Application>> {
        Ok(self.inner.read().await.applications.get(&id).cloned())
    }

    async fn get_by_name(&self, name: &str) -> AppResult<Option<Application>> {
        let inner = self.inner.read().await;
        Ok(inner.applications.values().find(|a| a.name == name).cloned())
    }

    async fn create(&self, app: NewApplication) -> AppResult<Application> {
        let mut inner = self.inner.write().await;
        if inner.applications.values().any(|a| a.name == app.name) {
            return Err(AppError::Conflict(format!(
                "Application '{}' already exists",
                app.name
            )));
        }

        let now = Utc::now();
        let record = Application {
            id: inner.next_id(),
            name: app.name,
            image: app.image,
            version: app.version,
            host_port: app.host_port,
            container_port: app.container_port,
            repository_id: app.repository_id,
            status: ApplicationStatus::Stopped,
            last_deployed_at: None,
            created_at: now,
            updated_at: now,
        };
        inner.applications.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(&self, id: i64, update: ApplicationUpdate) -> AppResult<Application> {
        let mut inner = self.inner.write().await;
        let app = inner
            .applications
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Application {} not found", id)))?;
        update.apply(app);
        app.updated_at = Utc::now();
        Ok(app.clone())
    }

    async fn list(&self) -> AppResult<Vec<Application>> {
        Ok(self.inner.read().await.applications.values().cloned().collect())
    }
}

#[async_trait]
impl RepositoryStore for MemoryStore {
    async fn get_by_id(&self, id: i64) -> AppResult<Option<RegistryCredential>> {
        Ok(self.inner.read().await.registries.get(&id).cloned())
    }

    async fn get_default(&self) -> AppResult<Option<RegistryCredential>> {
        let inner = self.inner.read().await;
        Ok(inner.registries.values().find(|r| r.is_default).cloned())
    }

    async fn list(&self) -> AppResult<Vec<RegistryCredential>> {
        Ok(self.inner.read().await.registries.values().cloned().collect())
    }

    async fn create(&self, request: RegistryCredentialRequest) -> AppResult<RegistryCredential> {
        let mut inner = self.inner.write().await;
        if inner.registries.values().any(|r| r.name == request.name) {
            return Err(AppError::Conflict(format!(
                "Registry '{}' already exists",
                request.name
            )));
        }

        let now = Utc::now();
        let record = RegistryCredential {
            id: inner.next_id(),
            name: request.name,
            registry_url: request.registry_url,
            auth_type: request.auth_type,
            username: request.username,
            password: request.password,
            token: request.token,
            is_default: request.is_default,
            created_at: now,
            updated_at: now,
        };
        if record.is_default {
            inner.clear_default_registry(record.id);
        }
        inner.registries.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        id: i64,
        request: RegistryCredentialRequest,
    ) -> AppResult<RegistryCredential> {
        let mut inner = self.inner.write().await;
        if inner
            .registries
            .values()
            .any(|r| r.id != id && r.name == request.name)
        {
            return Err(AppError::Conflict(format!(
                "Registry '{}' already exists",
                request.name
            )));
        }
        if request.is_default {
            inner.clear_default_registry(id);
        }

        let record = inner
            .registries
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Registry {} not found", id)))?;
        record.name = request.name;
        record.registry_url = request.registry_url;
        record.auth_type = request.auth_type;
        record.username = request.username;
        record.password = request.password;
        record.token = request.token;
        record.is_default = request.is_default;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn set_default(&self, id: i64) -> AppResult<RegistryCredential> {
        let mut inner = self.inner.write().await;
        if !inner.registries.contains_key(&id) {
            return Err(AppError::NotFound(format!("Registry {} not found", id)));
        }
        inner.clear_default_registry(id);

        let record = inner
            .registries
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Registry {} not found", id)))?;
        record.is_default = true;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn delete(&self, id: i64) -> AppResult<bool> {
        Ok(self.inner.write().await.registries.remove(&id).is_some())
    }
}

#[async_trait]
impl EnvEntryStore for MemoryStore {
    async fn list_for_scope(
        &self,
        scope: EnvScope,
        project_id: Option<i64>,
    ) -> AppResult<Vec<EnvironmentEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .env_entries
            .values()
            .filter(|e| match scope {
                EnvScope::Global => e.scope == EnvScope::Global,
                EnvScope::Project => e.scope == EnvScope::Project && e.project_id == project_id,
            })
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> AppResult<Vec<EnvironmentEntry>> {
        Ok(self.inner.read().await.env_entries.values().cloned().collect())
    }

    async fn upsert(&self, request: EnvEntryRequest) -> AppResult<EnvironmentEntry> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();

        let existing = inner.env_entries.values_mut().find(|e| {
            e.scope == request.scope && e.project_id == request.project_id && e.key == request.key
        });
        if let Some(entry) = existing {
            entry.value_type = request.value_type;
            entry.secret_id = request.secret_id;
            entry.plain_value = request.plain_value;
            entry.updated_at = now;
            return Ok(entry.clone());
        }

        let entry = EnvironmentEntry {
            id: inner.next_id(),
            scope: request.scope,
            project_id: request.project_id,
            key: request.key,
            value_type: request.value_type,
            secret_id: request.secret_id,
            plain_value: request.plain_value,
            created_at: now,
            updated_at: now,
        };
        inner.env_entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn delete(&self, id: i64) -> AppResult<bool> {
        Ok(self.inner.write().await.env_entries.remove(&id).is_some())
    }

    async fn count_secret_references(&self, secret_id: i64) -> AppResult<i64> {
        let inner = self.inner.read().await;
        let count = inner
            .env_entries
            .values()
            .filter(|e| e.value_type == EnvValueType::SecretRef && e.secret_id == Some(secret_id))
            .count();
        Ok(count as i64)
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn get_encrypted_value(&self, secret_id: i64) -> AppResult<Option<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .secrets
            .get(&secret_id)
            .map(|s| s.encrypted_value.clone()))
    }

    async fn get(&self, secret_id: i64) -> AppResult<Option<SecretRecord>> {
        Ok(self.inner.read().await.secrets.get(&secret_id).cloned())
    }

    async fn list(&self) -> AppResult<Vec<SecretRecord>> {
        Ok(self.inner.read().await.secrets.values().cloned().collect())
    }

    async fn create(&self, secret: NewSecret) -> AppResult<SecretRecord> {
        let mut inner = self.inner.write().await;
        if inner
            .secrets
            .values()
            .any(|s| s.group_id == secret.group_id && s.name == secret.name)
        {
            return Err(AppError::Conflict(format!(
                "Secret '{}' already exists in group {}",
                secret.name, secret.group_id
            )));
        }

        let now = Utc::now();
        let record = SecretRecord {
            id: inner.next_id(),
            group_id: secret.group_id,
            name: secret.name,
            encrypted_value: secret.encrypted_value,
            source: secret.source,
            created_at: now,
            updated_at: now,
        };
        inner.secrets.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_value(
        &self,
        secret_id: i64,
        encrypted_value: String,
    ) -> AppResult<SecretRecord> {
        let mut inner = self.inner.write().await;
        let record = inner
            .secrets
            .get_mut(&secret_id)
            .ok_or_else(|| AppError::NotFound(format!("Secret {} not found", secret_id)))?;
        record.encrypted_value = encrypted_value;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn delete(&self, secret_id: i64) -> AppResult<bool> {
        Ok(self.inner.write().await.secrets.remove(&secret_id).is_some())
    }
}

#[async_trait]
impl DeploymentLogStore for MemoryStore {
    async fn create(&self, log: NewDeploymentLog) -> AppResult<i64> {
        let mut inner = self.inner.write().await;
        let record = DeploymentLogRecord {
            id: inner.next_id(),
            application_id: log.application_id,
            deployment_id: log.deployment_id,
            version: log.version,
            trigger_type: log.trigger_type,
            status: DeploymentStatus::Pending,
            started_at: log.started_at,
            completed_at: None,
            duration_ms: None,
            error_message: None,
        };
        let id = record.id;
        inner.deployment_logs.insert(id, record);
        Ok(id)
    }

    async fn complete(
        &self,
        log_id: i64,
        status: DeploymentStatus,
        error_message: Option<String>,
        completed_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .deployment_logs
            .get_mut(&log_id)
            .ok_or_else(|| AppError::NotFound(format!("Deployment log {} not found", log_id)))?;

        if !record.complete(status, error_message, completed_at) {
            return Err(AppError::Conflict(format!(
                "Deployment log {} is already completed",
                log_id
            )));
        }
        Ok(())
    }

    async fn get(&self, log_id: i64) -> AppResult<Option<DeploymentLogRecord>> {
        Ok(self.inner.read().await.deployment_logs.get(&log_id).cloned())
    }

    async fn list_for_application(
        &self,
        application_id: i64,
    ) -> AppResult<Vec<DeploymentLogRecord>> {
        let inner = self.inner.read().await;
        let mut logs: Vec<DeploymentLogRecord> = inner
            .deployment_logs
            .values()
            .filter(|l| l.application_id == application_id)
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{RegistryAuthType, TriggerType};
    use uuid::Uuid;

    fn registry(name: &str, is_default: bool) -> RegistryCredentialRequest {
        RegistryCredentialRequest {
            name: name.to_string(),
            registry_url: format!("https://{}.example.com", name),
            auth_type: RegistryAuthType::None,
            username: None,
            password: None,
            token: None,
            is_default,
        }
    }

    #[tokio::test]
    async fn test_single_default_registry() {
        let store = MemoryStore::new();
        let a = RepositoryStore::create(&store, registry("a", true)).await.unwrap();
        let b = RepositoryStore::create(&store, registry("b", true)).await.unwrap();

        let default = store.get_default().await.unwrap().unwrap();
        assert_eq!(default.id, b.id);
        assert!(!RepositoryStore::get_by_id(&store, a.id).await.unwrap().unwrap().is_default);

        store.set_default(a.id).await.unwrap();
        let defaults: Vec<_> = RepositoryStore::list(&store)
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.is_default)
            .collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, a.id);
    }

    #[tokio::test]
    async fn test_env_upsert_replaces_same_key() {
        let store = MemoryStore::new();
        let first = store
            .upsert(EnvEntryRequest::plain(EnvScope::Project, Some(7), "PORT", "80"))
            .await
            .unwrap();
        let second = store
            .upsert(EnvEntryRequest::plain(EnvScope::Project, Some(7), "PORT", "8080"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        let entries = store
            .list_for_scope(EnvScope::Project, Some(7))
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].plain_value.as_deref(), Some("8080"));
        assert!(store
            .list_for_scope(EnvScope::Project, Some(8))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_log_completes_once() {
        let store = MemoryStore::new();
        let started_at = Utc::now();
        let id = DeploymentLogStore::create(
            &store,
            NewDeploymentLog {
                application_id: 1,
                deployment_id: Uuid::new_v4(),
                version: "latest".to_string(),
                trigger_type: TriggerType::Api,
                started_at,
            },
        )
        .await
        .unwrap();

        store
            .complete(id, DeploymentStatus::Success, None, started_at)
            .await
            .unwrap();
        let again = store
            .complete(id, DeploymentStatus::Failed, Some("late".to_string()), started_at)
            .await;
        assert!(matches!(again, Err(AppError::Conflict(_))));

        let log = DeploymentLogStore::get(&store, id).await.unwrap().unwrap();
        assert_eq!(log.status, DeploymentStatus::Success);
        assert_eq!(log.duration_ms, Some(0));
    }

    #[tokio::test]
    async fn test_duplicate_application_name() {
        let store = MemoryStore::new();
        let app = NewApplication {
            name: "web".to_string(),
            image: "nginx".to_string(),
            version: "latest".to_string(),
            host_port: 8080,
            container_port: 80,
            repository_id: None,
        };
        ApplicationStore::create(&store, app.clone()).await.unwrap();
        assert!(matches!(
            ApplicationStore::create(&store, app).await,
            Err(AppError::Conflict(_))
        ));
    }
}
