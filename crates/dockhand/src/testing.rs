//! Test doubles shared by unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::crypto::{EncryptionKey, SecretCipher};
use crate::deploy::engine::{
    ContainerEngine, ContainerInfo, ContainerSpec, EngineError, PruneReport, RegistryAuth,
};
use crate::store::{MemoryStore, Stores};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Pull(String),
    Find(String),
    Stop(String),
    Remove(String),
    Create(String),
    Start(String),
    Prune,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<EngineCall>,
    containers: HashMap<String, ContainerInfo>,
    next_id: u32,
    pull_error: Option<String>,
    hang_pulls: bool,
    remove_error: Option<fn() -> EngineError>,
    start_error: Option<String>,
    last_spec: Option<ContainerSpec>,
    last_auth: Option<RegistryAuth>,
}

/// In-memory container engine recording every call.
#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<FakeState>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_container(&self, name: &str, running: bool) {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("old{}", state.next_id);
        state
            .containers
            .insert(name.to_string(), ContainerInfo { id, running });
    }

    pub fn has_container(&self, name: &str) -> bool {
        self.state.lock().unwrap().containers.contains_key(name)
    }

    pub fn container(&self, name: &str) -> Option<ContainerInfo> {
        self.state.lock().unwrap().containers.get(name).cloned()
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn last_spec(&self) -> Option<ContainerSpec> {
        self.state.lock().unwrap().last_spec.clone()
    }

    pub fn last_auth(&self) -> Option<RegistryAuth> {
        self.state.lock().unwrap().last_auth.clone()
    }

    pub fn fail_pull(&self, message: &str) {
        self.state.lock().unwrap().pull_error = Some(message.to_string());
    }

    pub fn hang_pulls(&self) {
        self.state.lock().unwrap().hang_pulls = true;
    }

    pub fn fail_remove_with(&self, error: fn() -> EngineError) {
        self.state.lock().unwrap().remove_error = Some(error);
    }

    pub fn fail_start(&self, message: &str) {
        self.state.lock().unwrap().start_error = Some(message.to_string());
    }

    fn record(&self, call: EngineCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn ping(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn pull_image(
        &self,
        reference: &str,
        auth: Option<&RegistryAuth>,
    ) -> Result<(), EngineError> {
        let (hang, error) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(EngineCall::Pull(reference.to_string()));
            state.last_auth = auth.cloned();
            (state.hang_pulls, state.pull_error.clone())
        };
        if hang {
            std::future::pending::<()>().await;
        }
        match error {
            Some(message) => Err(EngineError::Stream(message)),
            None => Ok(()),
        }
    }

    async fn find_container(&self, name: &str) -> Result<Option<ContainerInfo>, EngineError> {
        self.record(EngineCall::Find(name.to_string()));
        Ok(self.container(name))
    }

    async fn stop_container(&self, name: &str, _grace: Duration) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(EngineCall::Stop(name.to_string()));
        match state.containers.get_mut(name) {
            Some(container) => {
                container.running = false;
                Ok(())
            }
            None => Err(EngineError::NotFound(name.to_string())),
        }
    }

    async fn remove_container(&self, name: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(EngineCall::Remove(name.to_string()));
        if let Some(error) = state.remove_error {
            return Err(error());
        }
        match state.containers.remove(name) {
            Some(_) => Ok(()),
            None => Err(EngineError::NotFound(name.to_string())),
        }
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(EngineCall::Create(spec.name.clone()));
        if state.containers.contains_key(&spec.name) {
            return Err(EngineError::Api {
                status: 409,
                message: format!("Conflict. The container name \"/{}\" is already in use", spec.name),
            });
        }
        state.next_id += 1;
        let id = format!("c{}", state.next_id);
        state.containers.insert(
            spec.name.clone(),
            ContainerInfo {
                id: id.clone(),
                running: false,
            },
        );
        state.last_spec = Some(spec.clone());
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(EngineCall::Start(id.to_string()));
        if let Some(ref message) = state.start_error {
            return Err(EngineError::Api {
                status: 500,
                message: message.clone(),
            });
        }
        match state.containers.values_mut().find(|c| c.id == id) {
            Some(container) => {
                container.running = true;
                Ok(())
            }
            None => Err(EngineError::NotFound(id.to_string())),
        }
    }

    async fn prune_dangling_images(&self) -> Result<PruneReport, EngineError> {
        self.record(EngineCall::Prune);
        Ok(PruneReport::default())
    }
}

pub fn test_cipher() -> SecretCipher {
    SecretCipher::new(&EncryptionKey::generate()).unwrap()
}

pub fn memory_stores() -> (Arc<MemoryStore>, Stores) {
    let store = Arc::new(MemoryStore::new());
    let stores = Stores::single(store.clone());
    (store, stores)
}
