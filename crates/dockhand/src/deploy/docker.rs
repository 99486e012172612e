//! Docker Engine API implementation of [`ContainerEngine`] using bollard.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::{CreateImageOptions, PruneImagesOptions};
use bollard::models::{HostConfig, PortBinding, RestartPolicyNameEnum};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::StreamExt;

use super::engine::{
    ContainerEngine, ContainerInfo, ContainerSpec, EngineError, PruneReport, RegistryAuth,
    RestartPolicy,
};
use super::registry_auth::split_tag;
use crate::config::{DockerConfig, DockerConnection};
use crate::error::{AppError, AppResult};

/// Container engine backed by a Docker daemon.
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect using `DOCKER_HOST` style settings.
    ///
    /// No request is made here; call [`ContainerEngine::ping`] to verify the
    /// daemon is reachable.
    pub fn connect(config: &DockerConfig) -> AppResult<Self> {
        let timeout = config.timeout_secs;
        let docker = match config.connection()? {
            DockerConnection::Socket(path) => {
                tracing::debug!(socket = %path.display(), "Connecting to Docker over unix socket");
                Docker::connect_with_socket(&path.to_string_lossy(), timeout, API_DEFAULT_VERSION)
            }
            DockerConnection::Tcp(address) => {
                tracing::debug!(address = %address, "Connecting to Docker over TCP");
                Docker::connect_with_http(&address, timeout, API_DEFAULT_VERSION)
            }
            DockerConnection::Tls { address, cert_dir } => {
                tracing::debug!(address = %address, certs = %cert_dir.display(), "Connecting to Docker over TLS");
                Docker::connect_with_ssl(
                    &address,
                    &cert_dir.join("key.pem"),
                    &cert_dir.join("cert.pem"),
                    &cert_dir.join("ca.pem"),
                    timeout,
                    API_DEFAULT_VERSION,
                )
            }
        }
        .map_err(|e| AppError::Config(format!("Failed to configure Docker client: {}", e)))?;

        Ok(Self { docker })
    }
}

fn engine_error(err: BollardError) -> EngineError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404,
            message,
        } => EngineError::NotFound(message),
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => EngineError::Api {
            status: status_code,
            message,
        },
        BollardError::DockerStreamError { error } => EngineError::Stream(error),
        other => EngineError::Connection(other.to_string()),
    }
}

/// 304 means the container was already in the requested state.
fn ignore_not_modified(result: Result<(), BollardError>) -> Result<(), EngineError> {
    match result {
        Ok(()) => Ok(()),
        Err(BollardError::DockerResponseServerError {
            status_code: 304, ..
        }) => Ok(()),
        Err(e) => Err(engine_error(e)),
    }
}

fn restart_policy_name(policy: RestartPolicy) -> RestartPolicyNameEnum {
    match policy {
        RestartPolicy::No => RestartPolicyNameEnum::NO,
        RestartPolicy::Always => RestartPolicyNameEnum::ALWAYS,
        RestartPolicy::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
        RestartPolicy::OnFailure => RestartPolicyNameEnum::ON_FAILURE,
    }
}

/// Translate a [`ContainerSpec`] into the Engine API create body.
pub(crate) fn container_config(spec: &ContainerSpec) -> Config<String> {
    let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
    let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();

    for port in &spec.ports {
        let key = format!("{}/tcp", port.container);
        exposed_ports.insert(key.clone(), HashMap::new());
        port_bindings
            .entry(key)
            .or_insert_with(|| Some(Vec::new()))
            .get_or_insert_with(Vec::new)
            .push(PortBinding {
                host_ip: None,
                host_port: Some(port.host.to_string()),
            });
    }

    Config {
        image: Some(spec.image.clone()),
        env: Some(spec.env_list()),
        exposed_ports: Some(exposed_ports),
        host_config: Some(HostConfig {
            port_bindings: Some(port_bindings),
            restart_policy: Some(bollard::models::RestartPolicy {
                name: Some(restart_policy_name(spec.restart_policy)),
                maximum_retry_count: None,
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Create-image query for a reference. Digest references go through whole
/// with an empty tag.
pub(crate) fn pull_options(reference: &str) -> CreateImageOptions<String> {
    let (image, tag) = match split_tag(reference) {
        (image, _) if image.contains('@') => (image, ""),
        (image, tag) => (image, tag.unwrap_or("latest")),
    };
    CreateImageOptions {
        from_image: image.to_string(),
        tag: tag.to_string(),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ping(&self) -> Result<(), EngineError> {
        self.docker.ping().await.map(|_| ()).map_err(engine_error)
    }

    async fn pull_image(
        &self,
        reference: &str,
        auth: Option<&RegistryAuth>,
    ) -> Result<(), EngineError> {
        let options = pull_options(reference);
        let credentials = auth.map(|auth| DockerCredentials {
            username: Some(auth.username.clone()),
            password: Some(auth.password.clone()),
            serveraddress: auth.server_address.clone(),
            ..Default::default()
        });

        let mut stream = self.docker.create_image(Some(options), None, credentials);
        while let Some(progress) = stream.next().await {
            let info = progress.map_err(engine_error)?;
            if let Some(error) = info.error {
                return Err(EngineError::Stream(error));
            }
            if let Some(status) = info.status {
                tracing::trace!(image = %reference, status = %status, "Pull progress");
            }
        }
        Ok(())
    }

    async fn find_container(&self, name: &str) -> Result<Option<ContainerInfo>, EngineError> {
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => Ok(Some(ContainerInfo {
                id: details.id.unwrap_or_default(),
                running: details.state.and_then(|s| s.running).unwrap_or(false),
            })),
            Err(e) => match engine_error(e) {
                EngineError::NotFound(_) => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn stop_container(&self, name: &str, grace: Duration) -> Result<(), EngineError> {
        let options = StopContainerOptions {
            t: grace.as_secs() as i64,
        };
        ignore_not_modified(self.docker.stop_container(name, Some(options)).await)
    }

    async fn remove_container(&self, name: &str) -> Result<(), EngineError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_container(name, Some(options))
            .await
            .map_err(engine_error)
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };
        let response = self
            .docker
            .create_container(Some(options), container_config(spec))
            .await
            .map_err(engine_error)?;

        for warning in &response.warnings {
            tracing::warn!(container = %spec.name, warning = %warning, "Docker create warning");
        }
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        ignore_not_modified(
            self.docker
                .start_container(id, None::<StartContainerOptions<String>>)
                .await,
        )
    }

    async fn prune_dangling_images(&self) -> Result<PruneReport, EngineError> {
        let filters = HashMap::from([("dangling".to_string(), vec!["true".to_string()])]);
        let response = self
            .docker
            .prune_images(Some(PruneImagesOptions { filters }))
            .await
            .map_err(engine_error)?;

        Ok(PruneReport {
            images_deleted: response.images_deleted.map(|d| d.len()).unwrap_or(0),
            space_reclaimed: response.space_reclaimed.unwrap_or(0).max(0) as u64,
        })
    }
}
