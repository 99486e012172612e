//! Registry credential model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RegistryAuthType {
    None,
    UsernamePassword,
    Token,
}

text_enum!(RegistryAuthType {
    None => "none",
    UsernamePassword => "usernamePassword",
    Token => "token",
});

/// Stored credentials for one container registry.
///
/// Passwords and tokens never leave the process in API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryCredential {
    pub id: i64,
    pub name: String,
    pub registry_url: String,
    pub auth_type: RegistryAuthType,
    pub username: Option<String>,
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
    #[serde(skip_serializing, default)]
    pub token: Option<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create or update a registry credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryCredentialRequest {
    pub name: String,
    pub registry_url: String,
    pub auth_type: RegistryAuthType,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}
