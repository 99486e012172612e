//! Service layer for the management API.
//!
//! Services hold validation and business rules and talk to the stores.

pub mod environment;
pub mod registry;
pub mod secret;

pub use environment::{EnvironmentBuild, EnvironmentResolver, EnvironmentService};
pub use registry::RegistryService;
pub use secret::SecretService;
