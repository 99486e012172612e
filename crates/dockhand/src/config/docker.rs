//! Docker engine connection settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppError, AppResult};

const DEFAULT_SOCKET: &str = "/var/run/docker.sock";

/// Docker connection configuration, using the same variables as the docker CLI.
///
/// Environment variables are prefixed with `DOCKER_`:
/// - `DOCKER_HOST`: `unix:///path`, `tcp://host:port` or `https://host:port`
/// - `DOCKER_TLS_VERIFY`: any of `1`, `true`, `yes` enables TLS for `tcp://`
/// - `DOCKER_CERT_PATH`: directory holding `ca.pem`, `cert.pem`, `key.pem`
/// - `DOCKER_TIMEOUT_SECS`: API request timeout
#[derive(Debug, Clone, Deserialize)]
pub struct DockerConfig {
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub tls_verify: Option<String>,

    #[serde(default)]
    pub cert_path: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    120
}

/// How the engine is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerConnection {
    Socket(PathBuf),
    Tcp(String),
    Tls { address: String, cert_dir: PathBuf },
}

impl DockerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("DOCKER_").from_env::<DockerConfig>()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn tls_enabled(&self) -> bool {
        matches!(
            self.tls_verify.as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("1" | "true" | "yes")
        )
    }

    /// Work out the connection mode from the configured host.
    pub fn connection(&self) -> AppResult<DockerConnection> {
        let host = match self.host.as_deref().map(str::trim) {
            None | Some("") => return Ok(DockerConnection::Socket(PathBuf::from(DEFAULT_SOCKET))),
            Some(host) => host,
        };

        if let Some(path) = host.strip_prefix("unix://") {
            return Ok(DockerConnection::Socket(PathBuf::from(path)));
        }

        let (address, tls) = if let Some(rest) = host.strip_prefix("tcp://") {
            (rest, self.tls_enabled())
        } else if let Some(rest) = host.strip_prefix("https://") {
            (rest, true)
        } else {
            return Err(AppError::Config(format!(
                "Unsupported DOCKER_HOST '{}': expected unix://, tcp:// or https://",
                host
            )));
        };

        if !tls {
            return Ok(DockerConnection::Tcp(address.to_string()));
        }

        let cert_dir = self.cert_path.as_deref().ok_or_else(|| {
            AppError::Config("DOCKER_CERT_PATH is required for TLS connections".to_string())
        })?;

        Ok(DockerConnection::Tls {
            address: address.to_string(),
            cert_dir: PathBuf::from(cert_dir),
        })
    }
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            host: None,
            tls_verify: None,
            cert_path: None,
            timeout_secs: default_timeout(),
        }
    }
}
