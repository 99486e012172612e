//! Shared state for the HTTP layer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Instant;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::deploy::{ContainerEngine, DeploymentOrchestrator};
use crate::store::Stores;

type LockMap = Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Per-name deployment locks.
///
/// Deployments of the same container name run one after another; different
/// names proceed in parallel. An entry lives only while someone holds or
/// waits for it.
#[derive(Clone, Default)]
pub struct DeployLocks {
    locks: LockMap,
}

/// Exclusive use of one container name. Released on drop.
pub struct DeployGuard {
    name: String,
    locks: LockMap,
    guard: Option<OwnedMutexGuard<()>>,
}

impl DeployLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `name`.
    pub async fn acquire(&self, name: &str) -> DeployGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        DeployGuard {
            name: name.to_string(),
            locks: self.locks.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn tracked_names(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for DeployGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map still holds the lock: nobody is waiting on this name.
        if locks
            .get(&self.name)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.name);
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,

    /// Container engine, used for health checks
    pub engine: Arc<dyn ContainerEngine>,

    pub stores: Stores,

    pub orchestrator: Arc<DeploymentOrchestrator>,

    pub deploy_locks: DeployLocks,

    /// Database pool when the Postgres store is in use
    pub db: Option<DbPool>,

    /// Server start time for uptime calculation
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        engine: Arc<dyn ContainerEngine>,
        stores: Stores,
        orchestrator: DeploymentOrchestrator,
        db: Option<DbPool>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            engine,
            stores,
            orchestrator: Arc::new(orchestrator),
            deploy_locks: DeployLocks::new(),
            db,
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
