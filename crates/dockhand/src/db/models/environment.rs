//! Environment entry model.
//!
//! Entries are either global or scoped to one project (application), and
//! either carry a literal value or reference an encrypted secret.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvScope {
    Global,
    Project,
}

text_enum!(EnvScope {
    Global => "global",
    Project => "project",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnvValueType {
    Plain,
    SecretRef,
}

text_enum!(EnvValueType {
    Plain => "plain",
    SecretRef => "secretRef",
});

/// Stored environment entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentEntry {
    pub id: i64,
    pub scope: EnvScope,
    pub project_id: Option<i64>,
    pub key: String,
    pub value_type: EnvValueType,
    pub secret_id: Option<i64>,
    pub plain_value: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create or replace the entry at `(scope, projectId, key)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvEntryRequest {
    pub scope: EnvScope,
    #[serde(default)]
    pub project_id: Option<i64>,
    pub key: String,
    pub value_type: EnvValueType,
    #[serde(default)]
    pub secret_id: Option<i64>,
    #[serde(default)]
    pub plain_value: Option<String>,
}

impl EnvEntryRequest {
    pub fn plain(scope: EnvScope, project_id: Option<i64>, key: &str, value: &str) -> Self {
        Self {
            scope,
            project_id,
            key: key.to_string(),
            value_type: EnvValueType::Plain,
            secret_id: None,
            plain_value: Some(value.to_string()),
        }
    }

    pub fn secret_ref(scope: EnvScope, project_id: Option<i64>, key: &str, secret_id: i64) -> Self {
        Self {
            scope,
            project_id,
            key: key.to_string(),
            value_type: EnvValueType::SecretRef,
            secret_id: Some(secret_id),
            plain_value: None,
        }
    }

    /// Check the shape invariants that do not need the store.
    ///
    /// Global entries never carry a project id; the unused value field of
    /// the other value type is cleared.
    pub fn normalize(mut self) -> AppResult<Self> {
        let key = self.key.trim();
        if key.is_empty() || key.contains('=') || key.contains('\0') {
            return Err(AppError::Validation(format!(
                "Invalid environment key '{}'",
                self.key
            )));
        }
        self.key = key.to_string();

        match self.scope {
            EnvScope::Project if self.project_id.is_none() => {
                return Err(AppError::Validation(
                    "Project-scoped entries require a projectId".to_string(),
                ));
            }
            EnvScope::Global => self.project_id = None,
            EnvScope::Project => {}
        }

        match self.value_type {
            EnvValueType::SecretRef => {
                if self.secret_id.is_none() {
                    return Err(AppError::Validation(
                        "secretRef entries require a secretId".to_string(),
                    ));
                }
                self.plain_value = None;
            }
            EnvValueType::Plain => {
                if self.plain_value.is_none() {
                    return Err(AppError::Validation(
                        "plain entries require a plainValue".to_string(),
                    ));
                }
                self.secret_id = None;
            }
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_scope_needs_project_id() {
        let request = EnvEntryRequest::plain(EnvScope::Project, None, "PORT", "80");
        assert!(matches!(request.normalize(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_global_scope_drops_project_id() {
        let request = EnvEntryRequest::plain(EnvScope::Global, Some(4), " PORT ", "80");
        let normalized = request.normalize().unwrap();
        assert_eq!(normalized.project_id, None);
        assert_eq!(normalized.key, "PORT");
    }

    #[test]
    fn test_secret_ref_needs_secret_id() {
        let mut request = EnvEntryRequest::secret_ref(EnvScope::Global, None, "TOKEN", 1);
        request.secret_id = None;
        assert!(request.normalize().is_err());
    }

    #[test]
    fn test_rejects_bad_keys() {
        assert!(EnvEntryRequest::plain(EnvScope::Global, None, "A=B", "1")
            .normalize()
            .is_err());
        assert!(EnvEntryRequest::plain(EnvScope::Global, None, "  ", "1")
            .normalize()
            .is_err());
    }

    #[test]
    fn test_value_type_serializes_camel_case() {
        let json = serde_json::to_value(EnvValueType::SecretRef).unwrap();
        assert_eq!(json, "secretRef");
    }
}
