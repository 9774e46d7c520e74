//! # JSON state file
//!
//! The whole accounting state is one small JSON document keyed by panel id.
//! It is read once when the store is opened. Writes go to a sibling temp file
//! that is then renamed over the previous one, so a crash mid-write leaves the
//! previous state intact.
//!
//! Writes are infrequent on purpose (see `energy.persist_interval_secs`): the
//! gateway-side monitor typically runs on a Raspberry Pi with an SD card.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{Persister, Restorer};
use crate::energy::PersistedState;

pub struct JsonFileStore {
    path: PathBuf,
    loaded: RwLock<BTreeMap<String, PersistedState>>,
}

impl JsonFileStore {
    /// Open the store, reading the file if it exists. A missing file is an empty store.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let loaded = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("corrupt state file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no state file yet, starting from zero");
                BTreeMap::new()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()))
            }
        };

        Ok(Self {
            path,
            loaded: RwLock::new(loaded),
        })
    }
}

#[async_trait]
impl Restorer for JsonFileStore {
    async fn entity_ids(&self) -> Result<Vec<String>> {
        Ok(self.loaded.read().keys().cloned().collect())
    }

    async fn load(&self, entity_id: &str) -> Result<Option<PersistedState>> {
        Ok(self.loaded.read().get(entity_id).cloned())
    }
}

#[async_trait]
impl Persister for JsonFileStore {
    async fn save(&self, states: &BTreeMap<String, PersistedState>) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }

        let json = serde_json::to_vec_pretty(states)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;

        *self.loaded.write() = states.clone();
        debug!(path = %self.path.display(), panels = states.len(), "energy state saved");
        Ok(())
    }
}
