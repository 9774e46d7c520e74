//! Accounting state storage.
//!
//! The polling loop only ever needs two things from storage: the last known
//! state of a panel at startup, and a place to write the current state to.

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::energy::PersistedState;

#[async_trait]
pub trait Restorer: Send + Sync {
    /// Panels with a stored state
    async fn entity_ids(&self) -> Result<Vec<String>>;
    async fn load(&self, entity_id: &str) -> Result<Option<PersistedState>>;
}

#[async_trait]
pub trait Persister: Send + Sync {
    async fn save(&self, states: &BTreeMap<String, PersistedState>) -> Result<()>;
}

/// Both halves, as implemented by every store in this module
pub trait StateStore: Restorer + Persister {}

impl<T: Restorer + Persister> StateStore for T {}
