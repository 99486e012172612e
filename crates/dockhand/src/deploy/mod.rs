//! Container deployment core.
//!
//! - [`registry_auth`]: image reference and credential resolution
//! - [`engine`] / [`docker`]: the container engine seam and its Docker implementation
//! - [`lifecycle`]: pull, replace, create, start, prune
//! - [`orchestrator`]: the end-to-end deployment flow
//! - [`callback`]: signed outcome notifications

pub mod callback;
pub mod docker;
pub mod engine;
pub mod lifecycle;
pub mod orchestrator;
pub mod registry_auth;

pub use callback::{CallbackNotifier, CallbackPayload};
pub use docker::DockerEngine;
pub use engine::{ContainerEngine, ContainerSpec, EngineError, RegistryAuth};
pub use lifecycle::{ContainerLifecycleManager, LifecycleOptions};
pub use orchestrator::{DeploymentOrchestrator, DeploymentRequest, DeploymentResult};
pub use registry_auth::{RegistryAuthResolver, ResolvedImage};
