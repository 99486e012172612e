//! Application configuration for the Dockhand deployer.

use std::time::Duration;

use serde::Deserialize;

/// Process run mode. Production refuses to start without an encryption key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Development,
    Production,
}

/// Which image pruning runs after a successful deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PruneStrategy {
    #[default]
    Dangling,
    None,
}

/// Backing store for applications, registries, secrets and logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

/// Application configuration loaded from environment variables.
///
/// Environment variables are prefixed with `DOCKHAND_`:
/// - `DOCKHAND_HOST`: Server bind address (default: "0.0.0.0")
/// - `DOCKHAND_PORT`: Server port (default: 8085)
/// - `DOCKHAND_ENVIRONMENT`: `development` or `production`
/// - `DOCKHAND_ENCRYPTION_KEY`: 32-byte key, hex or base64
/// - `DOCKHAND_DEFAULT_REGISTRY`: registry host prefixed to bare image names
/// - `DOCKHAND_PRUNE_IMAGES` / `DOCKHAND_PRUNE_STRATEGY`
/// - `DOCKHAND_CALLBACK_URL` / `DOCKHAND_CALLBACK_SECRET`
/// - `DOCKHAND_PULL_TIMEOUT_SECS`: upper bound on a single image pull
/// - `DOCKHAND_STORE`: `memory` or `postgres`
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Run mode
    #[serde(default)]
    pub environment: RunMode,

    /// Encryption key for secret values
    #[serde(default)]
    pub encryption_key: Option<String>,

    /// Registry host used when a deployment names no repository
    #[serde(default)]
    pub default_registry: Option<String>,

    /// Prune images after a successful deployment
    #[serde(default)]
    pub prune_images: bool,

    /// Which images to prune
    #[serde(default)]
    pub prune_strategy: PruneStrategy,

    /// URL notified after every deployment attempt
    #[serde(default)]
    pub callback_url: Option<String>,

    /// Shared secret for signing callback payloads
    #[serde(default)]
    pub callback_secret: Option<String>,

    /// Callback request timeout in seconds
    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_secs: u64,

    /// Image pull timeout in seconds
    #[serde(default = "default_pull_timeout")]
    pub pull_timeout_secs: u64,

    /// Grace period before a stopped container is killed
    #[serde(default = "default_stop_grace")]
    pub stop_grace_secs: u64,

    /// Store backend
    #[serde(default)]
    pub store: StoreBackend,

    /// Emit JSON logs
    #[serde(default)]
    pub log_json: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8085
}

fn default_callback_timeout() -> u64 {
    10
}

fn default_pull_timeout() -> u64 {
    600
}

fn default_stop_grace() -> u64 {
    10
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables are prefixed with `DOCKHAND_`.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("DOCKHAND_").from_env::<AppConfig>()
    }

    /// Load configuration from `(name, value)` pairs, using the same
    /// `DOCKHAND_` prefix as [`AppConfig::from_env`].
    pub fn from_vars<I>(vars: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed("DOCKHAND_").from_iter::<_, AppConfig>(vars)
    }

    /// Get the server bind address as a string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_production(&self) -> bool {
        self.environment == RunMode::Production
    }

    /// Whether dangling images are pruned after a successful deployment.
    pub fn prune_dangling(&self) -> bool {
        self.prune_images && self.prune_strategy == PruneStrategy::Dangling
    }

    pub fn pull_timeout(&self) -> Duration {
        Duration::from_secs(self.pull_timeout_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: RunMode::Development,
            encryption_key: None,
            default_registry: None,
            prune_images: false,
            prune_strategy: PruneStrategy::Dangling,
            callback_url: None,
            callback_secret: None,
            callback_timeout_secs: default_callback_timeout(),
            pull_timeout_secs: default_pull_timeout(),
            stop_grace_secs: default_stop_grace(),
            store: StoreBackend::Memory,
            log_json: false,
        }
    }
}
