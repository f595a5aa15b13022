use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::catalog::{CatalogStore, ScriptStats};
use crate::errors::Result;
use crate::types::ScriptId;

/// Stores run statistics in memory only.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    stats: Mutex<HashMap<ScriptId, ScriptStats>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog pre-populated with zeroed stats for `ids`.
    pub fn with_scripts(ids: impl IntoIterator<Item = ScriptId>) -> Self {
        let catalog = Self::new();
        for id in ids {
            catalog.register(id);
        }
        catalog
    }

    /// Start tracking `script_id`. Existing stats are kept.
    pub fn register(&self, script_id: ScriptId) {
        self.lock().entry(script_id).or_default();
    }

    /// Stop tracking `script_id`, as if it was deleted from the catalog.
    pub fn forget(&self, script_id: ScriptId) -> Option<ScriptStats> {
        self.lock().remove(&script_id)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ScriptId, ScriptStats>> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CatalogStore for MemoryCatalog {
    fn record_run(&self, script_id: ScriptId, timestamp: &str) -> Result<()> {
        match self.lock().get_mut(&script_id) {
            Some(stats) => {
                stats.bump(timestamp);
                info!(
                    script_id,
                    run_count = stats.run_count,
                    "recorded run (memory)"
                );
            }
            None => debug!(script_id, "record_run for unknown script; ignoring"),
        }
        Ok(())
    }

    fn stats(&self, script_id: ScriptId) -> Result<Option<ScriptStats>> {
        Ok(self.lock().get(&script_id).cloned())
    }
}
