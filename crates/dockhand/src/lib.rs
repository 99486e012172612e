//! Dockhand Library
//!
//! Webhook-driven rolling deployer for single Docker containers:
//!
//! - **Deployment**: pull a new image, replace the named container, start it
//!   with the resolved environment and report the outcome
//! - **Registry Credentials**: resolve image references and pull credentials
//!   per registry (Docker Hub, OAuth2-token registries, basic auth)
//! - **Secrets**: AES-256-GCM encrypted values referenced from environment
//!   entries
//! - **Environment**: global and per-application variables, project wins
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading from environment variables
//! - [`crypto`]: Secret encryption and callback signing
//! - [`deploy`]: Registry resolution, engine access, lifecycle, orchestration
//! - [`store`]: Storage traits with in-memory and PostgreSQL implementations
//! - [`services`]: Management rules for secrets, registries and environment
//! - [`handlers`] / [`router`]: HTTP surface
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use dockhand::{config::{AppConfig, DockerConfig}, crypto::{EncryptionKey, SecretCipher}};
//! use dockhand::{deploy::DockerEngine, router::build_app, store::{MemoryStore, Stores}};
//!
//! let config = AppConfig::from_env()?;
//! let key = EncryptionKey::load(config.encryption_key.as_deref(), config.environment)?;
//! let engine = Arc::new(DockerEngine::connect(&DockerConfig::from_env()?)?);
//! let stores = Stores::single(Arc::new(MemoryStore::new()));
//! let router = build_app(config, engine, stores, SecretCipher::new(&key)?, None)?;
//! ```

pub mod config;
pub mod crypto;
pub mod db;
pub mod deploy;
pub mod error;
pub mod handlers;
pub mod result_ext;
pub mod router;
pub mod services;
pub mod state;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{AppError, AppResult};
pub use result_ext::ResultExt;
