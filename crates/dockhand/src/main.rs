//! Dockhand Server
//!
//! Accepts deployment requests over HTTP and rolls single Docker containers
//! onto the new image.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dockhand::{
    config::{AppConfig, DatabaseConfig, DockerConfig, StoreBackend},
    crypto::{EncryptionKey, SecretCipher},
    db::{create_pool, run_migrations, DbPool},
    deploy::{ContainerEngine, DockerEngine},
    router::build_app,
    store::{MemoryStore, PgStore, Stores},
};

/// Initialize tracing/logging.
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,dockhand=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Open the configured store backend.
async fn open_store(config: &AppConfig) -> anyhow::Result<(Stores, Option<DbPool>)> {
    match config.store {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, state is lost on restart");
            Ok((Stores::single(Arc::new(MemoryStore::new())), None))
        }
        StoreBackend::Postgres => {
            let db_config =
                DatabaseConfig::from_env().context("Invalid POSTGRES_* configuration")?;
            let pool = create_pool(&db_config).await?;
            run_migrations(&pool).await?;
            Ok((Stores::single(Arc::new(PgStore::new(pool.clone()))), Some(pool)))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    // Falling back to defaults would silently drop production mode.
    let app_config = AppConfig::from_env().context("Invalid DOCKHAND_* configuration")?;

    init_tracing(app_config.log_json);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Dockhand"
    );
    tracing::info!(
        host = %app_config.host,
        port = app_config.port,
        environment = ?app_config.environment,
        store = ?app_config.store,
        default_registry = ?app_config.default_registry,
        prune = app_config.prune_dangling(),
        "Configuration loaded"
    );

    let key = EncryptionKey::load(app_config.encryption_key.as_deref(), app_config.environment)?;
    let cipher = SecretCipher::new(&key)?;

    let docker_config = DockerConfig::from_env().context("Invalid DOCKER_* configuration")?;
    let engine = Arc::new(DockerEngine::connect(&docker_config)?);
    match engine.ping().await {
        Ok(()) => tracing::info!("Connected to Docker engine"),
        Err(e) => tracing::warn!(error = %e, "Docker engine not reachable yet, deployments will fail until it is"),
    }

    let (stores, db) = open_store(&app_config).await?;

    let addr: SocketAddr = app_config.bind_address().parse()?;
    let app = build_app(app_config, engine, stores, cipher, db)?;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
