//! Configuration module for the Dockhand deployer.
//!
//! Configuration is loaded from environment variables using the `envy`
//! crate for type-safe parsing.

mod app;
mod database;
mod docker;

pub use app::{AppConfig, PruneStrategy, RunMode, StoreBackend};
pub use database::DatabaseConfig;
pub use docker::{DockerConfig, DockerConnection};
