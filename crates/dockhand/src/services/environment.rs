//! Environment resolution and management.
//!
//! Global entries are applied first, then project entries, so a project key
//! overrides a global key of the same name. Secret references are decrypted
//! at build time. A key that cannot be resolved is skipped and reported; it
//! never aborts the build.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::crypto::SecretCipher;
use crate::db::models::{EnvEntryRequest, EnvScope, EnvValueType, EnvironmentEntry};
use crate::error::{AppError, AppResult};
use crate::store::{EnvEntryStore, SecretStore};

/// A key left out of the container environment.
#[derive(Debug)]
pub struct SkippedKey {
    pub key: String,
    pub scope: EnvScope,
    pub error: AppError,
}

/// Resolved environment for one application.
#[derive(Debug, Default)]
pub struct EnvironmentBuild {
    pub values: BTreeMap<String, String>,
    pub skipped: Vec<SkippedKey>,
}

#[derive(Clone)]
pub struct EnvironmentResolver {
    entries: Arc<dyn EnvEntryStore>,
    secrets: Arc<dyn SecretStore>,
    cipher: SecretCipher,
}

impl EnvironmentResolver {
    pub fn new(
        entries: Arc<dyn EnvEntryStore>,
        secrets: Arc<dyn SecretStore>,
        cipher: SecretCipher,
    ) -> Self {
        Self {
            entries,
            secrets,
            cipher,
        }
    }

    /// Build the environment for an application.
    ///
    /// Only a failure to list entries is returned as an error.
    pub async fn build_for_application(&self, application_id: i64) -> AppResult<EnvironmentBuild> {
        let global = self.entries.list_for_scope(EnvScope::Global, None).await?;
        let project = self
            .entries
            .list_for_scope(EnvScope::Project, Some(application_id))
            .await?;

        let mut build = EnvironmentBuild::default();
        for entry in global.iter().chain(project.iter()) {
            match self.resolve_entry(entry).await {
                Ok(value) => {
                    build.values.insert(entry.key.clone(), value);
                }
                Err(error) => {
                    tracing::warn!(
                        key = %entry.key,
                        scope = %entry.scope,
                        application_id,
                        error = %error,
                        "Skipping environment key"
                    );
                    // A failed project override must not leave the global value behind.
                    if entry.scope == EnvScope::Project {
                        build.values.remove(&entry.key);
                    }
                    build.skipped.push(SkippedKey {
                        key: entry.key.clone(),
                        scope: entry.scope,
                        error,
                    });
                }
            }
        }

        Ok(build)
    }

    async fn resolve_entry(&self, entry: &EnvironmentEntry) -> AppResult<String> {
        match entry.value_type {
            EnvValueType::Plain => entry.plain_value.clone().ok_or_else(|| {
                AppError::Environment(format!("'{}' has no plain value", entry.key))
            }),
            EnvValueType::SecretRef => {
                let secret_id = entry.secret_id.ok_or_else(|| {
                    AppError::Environment(format!("'{}' references no secret", entry.key))
                })?;
                let encrypted = self
                    .secrets
                    .get_encrypted_value(secret_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Environment(format!(
                            "'{}' references missing secret {}",
                            entry.key, secret_id
                        ))
                    })?;
                self.cipher.decrypt(&encrypted)
            }
        }
    }
}

/// Keys an application would receive, without their values.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentPreview {
    pub application_id: i64,
    pub keys: Vec<String>,
    pub skipped: Vec<SkippedPreview>,
}

#[derive(Debug, Serialize)]
pub struct SkippedPreview {
    pub key: String,
    pub scope: EnvScope,
    pub error: String,
}

/// Service for environment entry operations.
#[derive(Clone)]
pub struct EnvironmentService {
    entries: Arc<dyn EnvEntryStore>,
    secrets: Arc<dyn SecretStore>,
    resolver: EnvironmentResolver,
}

impl EnvironmentService {
    pub fn new(
        entries: Arc<dyn EnvEntryStore>,
        secrets: Arc<dyn SecretStore>,
        resolver: EnvironmentResolver,
    ) -> Self {
        Self {
            entries,
            secrets,
            resolver,
        }
    }

    pub async fn list(
        &self,
        scope: Option<EnvScope>,
        project_id: Option<i64>,
    ) -> AppResult<Vec<EnvironmentEntry>> {
        match scope {
            Some(scope) => self.entries.list_for_scope(scope, project_id).await,
            None => self.entries.list_all().await,
        }
    }

    /// Create or replace an entry. Secret references must point at an existing secret.
    pub async fn upsert(&self, request: EnvEntryRequest) -> AppResult<EnvironmentEntry> {
        let request = request.normalize()?;

        if let Some(secret_id) = request.secret_id {
            if self.secrets.get(secret_id).await?.is_none() {
                return Err(AppError::Validation(format!(
                    "Secret {} does not exist",
                    secret_id
                )));
            }
        }

        let entry = self.entries.upsert(request).await?;
        tracing::info!(
            key = %entry.key,
            scope = %entry.scope,
            project_id = ?entry.project_id,
            "Environment entry saved"
        );
        Ok(entry)
    }

    pub async fn delete(&self, id: i64) -> AppResult<()> {
        if !self.entries.delete(id).await? {
            return Err(AppError::NotFound(format!(
                "Environment entry {} not found",
                id
            )));
        }
        Ok(())
    }

    pub async fn preview(&self, application_id: i64) -> AppResult<EnvironmentPreview> {
        let build = self.resolver.build_for_application(application_id).await?;
        Ok(EnvironmentPreview {
            application_id,
            keys: build.values.into_keys().collect(),
            skipped: build
                .skipped
                .into_iter()
                .map(|s| SkippedPreview {
                    key: s.key,
                    scope: s.scope,
                    error: s.error.to_string(),
                })
                .collect(),
        })
    }
}
