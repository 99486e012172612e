//! Domain models shared by the stores, services and handlers.

/// Implements `as_str`, `Display` and `FromStr` for an enum persisted as text.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::error::AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(crate::error::AppError::Internal(format!(
                        "Unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

pub mod application;
pub mod deployment_log;
pub mod environment;
pub mod registry;
pub mod secret;

pub use application::{Application, ApplicationStatus, ApplicationUpdate, NewApplication};
pub use deployment_log::{DeploymentLogRecord, DeploymentStatus, NewDeploymentLog, TriggerType};
pub use environment::{EnvEntryRequest, EnvScope, EnvValueType, EnvironmentEntry};
pub use registry::{RegistryAuthType, RegistryCredential, RegistryCredentialRequest};
pub use secret::{NewSecret, SecretCreateRequest, SecretRecord, SecretResponse, SecretSource};
