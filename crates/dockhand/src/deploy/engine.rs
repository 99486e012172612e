//! Container engine abstraction.
//!
//! The lifecycle manager only talks to this trait. [`DockerEngine`] is the
//! production implementation; tests use an in-memory fake.
//!
//! [`DockerEngine`]: super::docker::DockerEngine

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by the container engine.
///
/// `NotFound` is kept apart from every other failure so cleanup code can
/// treat a missing container as already removed.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("engine returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("{0}")]
    Stream(String),

    #[error("engine unreachable: {0}")]
    Connection(String),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}

/// Credentials sent with a pull.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
    pub server_address: Option<String>,
}

impl fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("server_address", &self.server_address)
            .finish()
    }
}

/// One host-to-container TCP port mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
}

/// Docker restart policy, named as the Engine API names it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    No,
    Always,
    #[default]
    UnlessStopped,
    OnFailure,
}

/// Everything needed to create a container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: BTreeMap<String, String>,
    pub ports: Vec<PortMapping>,
    pub restart_policy: RestartPolicy,
}

impl ContainerSpec {
    /// `KEY=value` pairs in key order.
    pub fn env_list(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }
}

/// A container looked up by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub running: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub images_deleted: usize,
    pub space_reclaimed: u64,
}

/// Thin abstraction over the Docker Engine API.
///
/// Implementations must be safe to share between concurrent deployments.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn ping(&self) -> Result<(), EngineError>;

    /// Pull an image and wait until the engine reports completion.
    async fn pull_image(
        &self,
        reference: &str,
        auth: Option<&RegistryAuth>,
    ) -> Result<(), EngineError>;

    /// Look up a container by name. `Ok(None)` when it does not exist.
    async fn find_container(&self, name: &str) -> Result<Option<ContainerInfo>, EngineError>;

    async fn stop_container(&self, name: &str, grace: Duration) -> Result<(), EngineError>;

    /// Force-remove a container.
    async fn remove_container(&self, name: &str) -> Result<(), EngineError>;

    /// Create a container and return its ID.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError>;

    async fn start_container(&self, id: &str) -> Result<(), EngineError>;

    /// Remove untagged images not used by any container.
    async fn prune_dangling_images(&self) -> Result<PruneReport, EngineError>;
}
