use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;

use super::{Persister, Restorer};
use crate::energy::PersistedState;

/// Process-local store, for tests and throwaway runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    states: Mutex<BTreeMap<String, PersistedState>>,
    loads: Mutex<Vec<String>>,
    saves: Mutex<u32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(entity_id: &str, state: PersistedState) -> Self {
        let store = Self::default();
        store.states.lock().insert(entity_id.to_string(), state);
        store
    }

    pub fn states(&self) -> BTreeMap<String, PersistedState> {
        self.states.lock().clone()
    }

    /// Entity ids passed to `load`, in call order
    pub fn loads(&self) -> Vec<String> {
        self.loads.lock().clone()
    }

    pub fn save_count(&self) -> u32 {
        *self.saves.lock()
    }
}

#[async_trait]
impl Restorer for MemoryStore {
    async fn entity_ids(&self) -> Result<Vec<String>> {
        Ok(self.states.lock().keys().cloned().collect())
    }

    async fn load(&self, entity_id: &str) -> Result<Option<PersistedState>> {
        self.loads.lock().push(entity_id.to_string());
        Ok(self.states.lock().get(entity_id).cloned())
    }
}

#[async_trait]
impl Persister for MemoryStore {
    async fn save(&self, states: &BTreeMap<String, PersistedState>) -> Result<()> {
        *self.states.lock() = states.clone();
        *self.saves.lock() += 1;
        Ok(())
    }
}
