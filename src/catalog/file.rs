use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogStore, ScriptStats};
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::types::ScriptId;

/// Relative path (from the catalog root) to the stats file.
///
/// One line per script: `<id> <run_count> <last_run>`, where `last_run` is
/// `-` for scripts that never ran.
pub const STATS_FILE_PATH: &str = ".scriptdeck/stats";

const NEVER_RUN: &str = "-";

/// Persists run statistics to `<root>/.scriptdeck/stats`.
#[derive(Debug)]
pub struct FileCatalog {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    known: Mutex<BTreeSet<ScriptId>>,
}

impl FileCatalog {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        root: impl AsRef<Path>,
        known: impl IntoIterator<Item = ScriptId>,
    ) -> Self {
        Self {
            fs,
            path: root.as_ref().join(STATS_FILE_PATH),
            known: Mutex::new(known.into_iter().collect()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop tracking `script_id`. Its line is dropped on the next write.
    pub fn forget(&self, script_id: ScriptId) {
        self.known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&script_id);
    }

    fn load_all(&self) -> Result<BTreeMap<ScriptId, ScriptStats>> {
        if !self.fs.exists(&self.path) {
            return Ok(BTreeMap::new());
        }
        let contents = self.fs.read_to_string(&self.path)?;
        Ok(parse_stats(&contents))
    }

    fn save_all(&self, map: &BTreeMap<ScriptId, ScriptStats>) -> Result<()> {
        let mut out = String::new();
        for (id, stats) in map.iter() {
            let last = stats.last_run.as_deref().unwrap_or(NEVER_RUN);
            let _ = writeln!(out, "{} {} {}", id, stats.run_count, last);
        }
        self.fs
            .write(&self.path, out.as_bytes())
            .with_context(|| format!("saving run stats to {:?}", self.path))?;
        Ok(())
    }
}

impl CatalogStore for FileCatalog {
    fn record_run(&self, script_id: ScriptId, timestamp: &str) -> Result<()> {
        // Hold the lock across read-modify-write so concurrent recorders
        // can't lose an increment.
        let known = self.known.lock().unwrap_or_else(PoisonError::into_inner);
        if !known.contains(&script_id) {
            debug!(script_id, "record_run for unknown script; ignoring");
            return Ok(());
        }

        let mut map = self.load_all()?;
        map.retain(|id, _| known.contains(id));
        let stats = map.entry(script_id).or_default();
        stats.bump(timestamp);
        let run_count = stats.run_count;
        self.save_all(&map)?;

        info!(script_id, run_count, "recorded run (file)");
        Ok(())
    }

    fn stats(&self, script_id: ScriptId) -> Result<Option<ScriptStats>> {
        let known = self.known.lock().unwrap_or_else(PoisonError::into_inner);
        if !known.contains(&script_id) {
            return Ok(None);
        }
        let map = self.load_all()?;
        Ok(Some(map.get(&script_id).cloned().unwrap_or_default()))
    }
}

fn parse_stats(contents: &str) -> BTreeMap<ScriptId, ScriptStats> {
    let mut map = BTreeMap::new();

    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let parsed = match (parts.next(), parts.next(), parts.next()) {
            (Some(id), Some(count), Some(last)) => id
                .parse::<ScriptId>()
                .ok()
                .zip(count.parse::<u64>().ok())
                .map(|(id, run_count)| {
                    let last_run = (last != NEVER_RUN).then(|| last.to_string());
                    (id, ScriptStats { run_count, last_run })
                }),
            _ => None,
        };
        match parsed {
            Some((id, stats)) => {
                map.insert(id, stats);
            }
            None => warn!(line = %trimmed, "skipping malformed stats line"),
        }
    }

    map
}
