//! Application model.
//!
//! An application is one named container. The name doubles as the Docker
//! container name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-level status of an application.
///
/// `Deploying` only exists in the store; Docker never reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Stopped,
    Deploying,
    Running,
    Failed,
}

text_enum!(ApplicationStatus {
    Stopped => "stopped",
    Deploying => "deploying",
    Running => "running",
    Failed => "failed",
});

/// Application record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: i64,
    pub name: String,
    pub image: String,
    pub version: String,
    pub host_port: u16,
    pub container_port: u16,
    pub repository_id: Option<i64>,
    pub status: ApplicationStatus,
    pub last_deployed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to register an application on its first deployment.
#[derive(Debug, Clone)]
pub struct NewApplication {
    pub name: String,
    pub image: String,
    pub version: String,
    pub host_port: u16,
    pub container_port: u16,
    pub repository_id: Option<i64>,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ApplicationUpdate {
    pub status: Option<ApplicationStatus>,
    pub last_deployed_at: Option<DateTime<Utc>>,
    pub version: Option<String>,
    pub image: Option<String>,
    pub host_port: Option<u16>,
    pub container_port: Option<u16>,
    pub repository_id: Option<Option<i64>>,
}

impl ApplicationUpdate {
    pub fn status(status: ApplicationStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Apply the update to a record in place.
    pub fn apply(&self, app: &mut Application) {
        if let Some(status) = self.status {
            app.status = status;
        }
        if let Some(at) = self.last_deployed_at {
            app.last_deployed_at = Some(at);
        }
        if let Some(ref version) = self.version {
            app.version = version.clone();
        }
        if let Some(ref image) = self.image {
            app.image = image.clone();
        }
        if let Some(port) = self.host_port {
            app.host_port = port;
        }
        if let Some(port) = self.container_port {
            app.container_port = port;
        }
        if let Some(repository_id) = self.repository_id {
            app.repository_id = repository_id;
        }
    }
}
