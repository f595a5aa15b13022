// src/catalog/mod.rs

//! Catalog Store: persisted per-script run statistics.
//!
//! The runner only ever calls [`CatalogStore::record_run`], once per finished
//! run, before it announces the run as finished. Implementations must treat
//! an unknown script id as a silent no-op: scripts can be removed from the
//! catalog while one of their runs is still in flight.
//!
//! - [`MemoryCatalog`] keeps stats in memory (tests, `stats_storage_mode = "memory"`).
//! - [`FileCatalog`] persists stats to `<root>/.scriptdeck/stats`.

pub mod file;
pub mod memory;

use std::path::Path;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};

use crate::config::ConfigFile;
use crate::errors::Result;
use crate::fs::RealFileSystem;
use crate::types::{ScriptId, StatsStorageMode};

pub use file::{FileCatalog, STATS_FILE_PATH};
pub use memory::MemoryCatalog;

/// Run statistics of one script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptStats {
    /// Number of completed runs. Only ever increases.
    pub run_count: u64,
    /// UTC RFC 3339 timestamp of the most recent completed run.
    pub last_run: Option<String>,
}

impl ScriptStats {
    pub fn bump(&mut self, timestamp: &str) {
        self.run_count += 1;
        self.last_run = Some(timestamp.to_string());
    }
}

/// Abstract storage for run statistics.
pub trait CatalogStore: Send + Sync {
    /// Increment the run counter of `script_id` and set its last-run time.
    ///
    /// Unknown ids are a no-op, not an error.
    fn record_run(&self, script_id: ScriptId, timestamp: &str) -> Result<()>;

    /// Current stats of `script_id`, or `None` if it isn't cataloged.
    fn stats(&self, script_id: ScriptId) -> Result<Option<ScriptStats>>;
}

/// Current time in the format stored by [`CatalogStore::record_run`].
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Build the store selected by `stats_storage_mode`, tracking every script
/// of `cfg`.
pub fn catalog_for_config(cfg: &ConfigFile, root: &Path) -> Arc<dyn CatalogStore> {
    let ids = cfg.scripts.iter().map(|s| s.id);
    match cfg.runner.stats_storage_mode {
        StatsStorageMode::File => Arc::new(FileCatalog::new(Arc::new(RealFileSystem), root, ids)),
        StatsStorageMode::Memory => Arc::new(MemoryCatalog::with_scripts(ids)),
    }
}
