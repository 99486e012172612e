//! Secret service for managing encrypted secret values.

use std::sync::Arc;

use crate::crypto::SecretCipher;
use crate::db::models::{NewSecret, SecretCreateRequest, SecretResponse};
use crate::error::{AppError, AppResult};
use crate::store::{EnvEntryStore, SecretStore};

/// Service for secret operations.
#[derive(Clone)]
pub struct SecretService {
    secrets: Arc<dyn SecretStore>,
    env_entries: Arc<dyn EnvEntryStore>,
    cipher: SecretCipher,
}

impl SecretService {
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        env_entries: Arc<dyn EnvEntryStore>,
        cipher: SecretCipher,
    ) -> Self {
        Self {
            secrets,
            env_entries,
            cipher,
        }
    }

    /// Encrypt and store a new secret. The value is never echoed back.
    pub async fn create(&self, request: SecretCreateRequest) -> AppResult<SecretResponse> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Secret name must not be empty".to_string()));
        }

        let record = self
            .secrets
            .create(NewSecret {
                group_id: request.group_id,
                name: name.to_string(),
                encrypted_value: self.cipher.encrypt(&request.value)?,
                source: request.source,
            })
            .await?;

        tracing::info!(secret_id = record.id, group_id = record.group_id, name = %record.name, "Secret created");
        Ok(SecretResponse::from_record(record, None))
    }

    pub async fn list(&self) -> AppResult<Vec<SecretResponse>> {
        Ok(self
            .secrets
            .list()
            .await?
            .into_iter()
            .map(|r| SecretResponse::from_record(r, None))
            .collect())
    }

    /// Get a secret, decrypting the value only when asked to.
    pub async fn get(&self, id: i64, reveal: bool) -> AppResult<SecretResponse> {
        let record = self
            .secrets
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Secret {} not found", id)))?;

        let value = if reveal {
            Some(self.cipher.decrypt(&record.encrypted_value)?)
        } else {
            None
        };
        Ok(SecretResponse::from_record(record, value))
    }

    /// Replace a secret's value with a freshly encrypted one.
    pub async fn update_value(&self, id: i64, value: &str) -> AppResult<SecretResponse> {
        let record = self
            .secrets
            .update_value(id, self.cipher.encrypt(value)?)
            .await?;
        tracing::info!(secret_id = id, "Secret value rotated");
        Ok(SecretResponse::from_record(record, None))
    }

    /// Delete a secret that no environment entry references.
    pub async fn delete(&self, id: i64) -> AppResult<()> {
        let references = self.env_entries.count_secret_references(id).await?;
        if references > 0 {
            return Err(AppError::Conflict(format!(
                "Secret {} is referenced by {} environment entries",
                id, references
            )));
        }

        if !self.secrets.delete(id).await? {
            return Err(AppError::NotFound(format!("Secret {} not found", id)));
        }
        tracing::info!(secret_id = id, "Secret deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::EncryptionKey;
    use crate::db::models::{EnvEntryRequest, EnvScope, SecretSource};
    use crate::store::MemoryStore;

    fn service() -> (SecretService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let cipher = SecretCipher::new(&EncryptionKey::generate()).unwrap();
        (SecretService::new(store.clone(), store.clone(), cipher), store)
    }

    fn request(name: &str, value: &str) -> SecretCreateRequest {
        SecretCreateRequest {
            group_id: 1,
            name: name.to_string(),
            value: value.to_string(),
            source: SecretSource::Manual,
        }
    }

    #[tokio::test]
    async fn test_values_are_stored_encrypted() {
        let (service, store) = service();
        let created = service.create(request("api-key", "k-123")).await.unwrap();
        assert!(created.value.is_none());

        let stored = store.get_encrypted_value(created.id).await.unwrap().unwrap();
        assert_ne!(stored, "k-123");
        assert_eq!(stored.split(':').count(), 3);

        let revealed = service.get(created.id, true).await.unwrap();
        assert_eq!(revealed.value.as_deref(), Some("k-123"));
        assert!(service.get(created.id, false).await.unwrap().value.is_none());
    }

    #[tokio::test]
    async fn test_rotate_value() {
        let (service, _) = service();
        let created = service.create(request("token", "old")).await.unwrap();
        service.update_value(created.id, "new").await.unwrap();

        let revealed = service.get(created.id, true).await.unwrap();
        assert_eq!(revealed.value.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_referenced_secret_cannot_be_deleted() {
        let (service, store) = service();
        let created = service.create(request("db", "pw")).await.unwrap();
        store
            .upsert(EnvEntryRequest::secret_ref(
                EnvScope::Global,
                None,
                "DB_PASSWORD",
                created.id,
            ))
            .await
            .unwrap();

        assert!(matches!(
            service.delete(created.id).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_and_missing() {
        let (service, _) = service();
        let created = service.create(request("tmp", "x")).await.unwrap();
        service.delete(created.id).await.unwrap();

        assert!(matches!(
            service.delete(created.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service.get(created.id, false).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_name_in_group() {
        let (service, _) = service();
        service.create(request("same", "a")).await.unwrap();
        assert!(matches!(
            service.create(request("same", "b")).await,
            Err(AppError::Conflict(_))
        ));
    }
}
