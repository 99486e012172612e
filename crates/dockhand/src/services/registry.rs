//! Registry credential service.

use std::sync::Arc;

use crate::db::models::{RegistryCredential, RegistryCredentialRequest};
use crate::deploy::registry_auth::{registry_host, CredentialKind};
use crate::error::{AppError, AppResult};
use crate::store::RepositoryStore;

#[derive(Clone)]
pub struct RegistryService {
    repositories: Arc<dyn RepositoryStore>,
}

impl RegistryService {
    pub fn new(repositories: Arc<dyn RepositoryStore>) -> Self {
        Self { repositories }
    }

    fn validate(request: &RegistryCredentialRequest) -> AppResult<()> {
        if request.name.trim().is_empty() {
            return Err(AppError::Validation(
                "Registry name must not be empty".to_string(),
            ));
        }
        registry_host(&request.registry_url)
            .and_then(|_| CredentialKind::try_from(request))
            .map(|_| ())
            .map_err(|e| match e {
                AppError::RegistryResolution(msg) => AppError::Validation(msg),
                other => other,
            })
    }

    pub async fn list(&self) -> AppResult<Vec<RegistryCredential>> {
        self.repositories.list().await
    }

    pub async fn get(&self, id: i64) -> AppResult<RegistryCredential> {
        self.repositories
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Registry {} not found", id)))
    }

    pub async fn create(&self, request: RegistryCredentialRequest) -> AppResult<RegistryCredential> {
        Self::validate(&request)?;
        let created = self.repositories.create(request).await?;
        tracing::info!(
            registry_id = created.id,
            name = %created.name,
            auth_type = %created.auth_type,
            is_default = created.is_default,
            "Registry credential created"
        );
        Ok(created)
    }

    pub async fn update(
        &self,
        id: i64,
        request: RegistryCredentialRequest,
    ) -> AppResult<RegistryCredential> {
        Self::validate(&request)?;
        self.get(id).await?;
        self.repositories.update(id, request).await
    }

    pub async fn set_default(&self, id: i64) -> AppResult<RegistryCredential> {
        self.get(id).await?;
        let updated = self.repositories.set_default(id).await?;
        tracing::info!(registry_id = id, "Default registry changed");
        Ok(updated)
    }

    /// Delete a credential. The default registry must be replaced first.
    pub async fn delete(&self, id: i64) -> AppResult<()> {
        let existing = self.get(id).await?;
        if existing.is_default {
            return Err(AppError::Conflict(format!(
                "Registry {} is the default; promote another registry first",
                id
            )));
        }
        self.repositories.delete(id).await?;
        Ok(())
    }
}
