//! Secret model.
//!
//! Secret values are stored encrypted (`iv:tag:ciphertext`) and only
//! decrypted on demand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretSource {
    #[default]
    Manual,
    Synced,
}

text_enum!(SecretSource {
    Manual => "manual",
    Synced => "synced",
});

/// Stored secret record.
#[derive(Debug, Clone)]
pub struct SecretRecord {
    pub id: i64,
    pub group_id: i64,
    pub name: String,
    pub encrypted_value: String,
    pub source: SecretSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a new secret, value already encrypted.
#[derive(Debug, Clone)]
pub struct NewSecret {
    pub group_id: i64,
    pub name: String,
    pub encrypted_value: String,
    pub source: SecretSource,
}

/// Request to create a secret or replace its value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretCreateRequest {
    pub group_id: i64,
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub source: SecretSource,
}

/// Secret as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretResponse {
    pub id: i64,
    pub group_id: i64,
    pub name: String,
    pub source: SecretSource,

    /// Decrypted value (only included when requested)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SecretResponse {
    pub fn from_record(record: SecretRecord, value: Option<String>) -> Self {
        Self {
            id: record.id,
            group_id: record.group_id,
            name: record.name,
            source: record.source,
            value,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}
