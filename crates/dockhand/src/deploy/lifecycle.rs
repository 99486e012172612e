//! Pull, replace, create and start for a single named container.

use std::sync::Arc;
use std::time::Duration;

use super::engine::{ContainerEngine, ContainerSpec, PruneReport, RegistryAuth};
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::result_ext::ResultExt;

/// Tunables for [`ContainerLifecycleManager`].
#[derive(Debug, Clone, Copy)]
pub struct LifecycleOptions {
    pub pull_timeout: Duration,
    pub stop_grace: Duration,
    pub prune_dangling: bool,
}

impl From<&AppConfig> for LifecycleOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            pull_timeout: config.pull_timeout(),
            stop_grace: config.stop_grace(),
            prune_dangling: config.prune_dangling(),
        }
    }
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            pull_timeout: Duration::from_secs(600),
            stop_grace: Duration::from_secs(10),
            prune_dangling: false,
        }
    }
}

/// What happened to the previous container during a replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Absent,
    Replaced { previous_id: String },
}

#[derive(Clone)]
pub struct ContainerLifecycleManager {
    engine: Arc<dyn ContainerEngine>,
    options: LifecycleOptions,
}

impl ContainerLifecycleManager {
    pub fn new(engine: Arc<dyn ContainerEngine>, options: LifecycleOptions) -> Self {
        Self { engine, options }
    }

    /// Pull an image, bounded by the configured timeout.
    ///
    /// On timeout the progress stream is dropped and the pull is abandoned.
    pub async fn pull(&self, reference: &str, auth: Option<&RegistryAuth>) -> AppResult<()> {
        tracing::info!(image = %reference, authenticated = auth.is_some(), "Pulling image");

        match tokio::time::timeout(
            self.options.pull_timeout,
            self.engine.pull_image(reference, auth),
        )
        .await
        {
            Ok(Ok(())) => {
                tracing::info!(image = %reference, "Image pulled");
                Ok(())
            }
            Ok(Err(e)) => Err(AppError::Pull(format!("{}: {}", reference, e))),
            Err(_) => {
                tracing::warn!(
                    image = %reference,
                    timeout_secs = self.options.pull_timeout.as_secs(),
                    "Image pull timed out"
                );
                Err(AppError::Pull(format!(
                    "{}: timed out after {}s",
                    reference,
                    self.options.pull_timeout.as_secs()
                )))
            }
        }
    }

    /// Stop and remove the container holding `name`, if there is one.
    ///
    /// A container that disappears between lookup and removal counts as
    /// removed. Any other failure aborts the deployment.
    pub async fn replace_existing(&self, name: &str) -> AppResult<ReplaceOutcome> {
        let existing = self
            .engine
            .find_container(name)
            .await
            .map_err(|e| AppError::Lifecycle(format!("inspect {}: {}", name, e)))?;

        let Some(existing) = existing else {
            tracing::debug!(container = %name, "No existing container");
            return Ok(ReplaceOutcome::Absent);
        };

        if existing.running {
            tracing::info!(container = %name, id = %existing.id, "Stopping existing container");
            match self.engine.stop_container(name, self.options.stop_grace).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    tracing::debug!(container = %name, "Container vanished before stop");
                    return Ok(ReplaceOutcome::Replaced {
                        previous_id: existing.id,
                    });
                }
                Err(e) => return Err(AppError::Lifecycle(format!("stop {}: {}", name, e))),
            }
        }

        match self.engine.remove_container(name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::debug!(container = %name, "Container vanished before removal");
            }
            Err(e) => return Err(AppError::Lifecycle(format!("remove {}: {}", name, e))),
        }

        tracing::info!(container = %name, id = %existing.id, "Removed existing container");
        Ok(ReplaceOutcome::Replaced {
            previous_id: existing.id,
        })
    }

    /// Create the container and start it. Returns the new container id.
    pub async fn create_and_start(&self, spec: &ContainerSpec) -> AppResult<String> {
        let id = self
            .engine
            .create_container(spec)
            .await
            .map_err(|e| AppError::Lifecycle(format!("create {}: {}", spec.name, e)))?;

        self.engine
            .start_container(&id)
            .await
            .map_err(|e| AppError::Lifecycle(format!("start {}: {}", spec.name, e)))?;

        tracing::info!(container = %spec.name, id = %id, image = %spec.image, "Container started");
        Ok(id)
    }

    /// Prune dangling images when enabled. Failures are logged, never returned.
    pub async fn prune_dangling_images(&self) -> Option<PruneReport> {
        if !self.options.prune_dangling {
            return None;
        }

        let report = self
            .engine
            .prune_dangling_images()
            .await
            .log("pruning dangling images")
            .ok()?;

        tracing::info!(
            images_deleted = report.images_deleted,
            space_reclaimed = report.space_reclaimed,
            "Pruned dangling images"
        );
        Some(report)
    }
}
