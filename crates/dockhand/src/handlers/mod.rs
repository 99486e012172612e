//! HTTP handlers, organized by resource.

pub mod deploy;
pub mod env;
pub mod health;
pub mod registries;
pub mod secrets;

pub use health::{api_health, health_check};
