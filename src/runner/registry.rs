// src/runner/registry.rs

//! Bookkeeping of live runs.
//!
//! The registry is plain synchronous state with no Tokio types, so it can be
//! exercised directly in tests. It is generic over the per-run handle; the
//! run loop stores a [`ProcessHandle`](crate::runner::process::ProcessHandle).
//!
//! Invariants:
//! - run ids are allocated monotonically and never reused;
//! - every id in `by_script` has a record in `runs` and vice versa;
//! - a script with no live runs has no `by_script` entry.

use std::collections::{BTreeSet, HashMap};

use tracing::warn;

use crate::types::{RunId, ScriptId};

/// One live run.
#[derive(Debug)]
pub struct RunRecord<H> {
    pub run_id: RunId,
    pub script_id: ScriptId,
    pub handle: H,
}

#[derive(Debug)]
pub struct Registry<H> {
    next_run_id: RunId,
    runs: HashMap<RunId, RunRecord<H>>,
    by_script: HashMap<ScriptId, BTreeSet<RunId>>,
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Registry<H> {
    pub fn new() -> Self {
        Self {
            next_run_id: 1,
            runs: HashMap::new(),
            by_script: HashMap::new(),
        }
    }

    /// Issue a fresh run id. Ids are handed out even if the launch later
    /// fails, so an id is never seen twice.
    pub fn allocate_run_id(&mut self) -> RunId {
        let id = self.next_run_id;
        self.next_run_id += 1;
        id
    }

    /// Track a live run under an id previously returned by
    /// [`allocate_run_id`](Self::allocate_run_id).
    pub fn insert(&mut self, run_id: RunId, script_id: ScriptId, handle: H) {
        let record = RunRecord {
            run_id,
            script_id,
            handle,
        };
        if let Some(previous) = self.runs.insert(run_id, record) {
            warn!(
                run_id,
                previous_script_id = previous.script_id,
                "run id inserted twice; replacing previous record"
            );
            self.unlink(run_id, previous.script_id);
        }
        self.by_script.entry(script_id).or_default().insert(run_id);
    }

    /// Stop tracking a run, handing back its record.
    pub fn remove(&mut self, run_id: RunId) -> Option<RunRecord<H>> {
        let record = self.runs.remove(&run_id)?;
        self.unlink(run_id, record.script_id);
        Some(record)
    }

    fn unlink(&mut self, run_id: RunId, script_id: ScriptId) {
        if let Some(ids) = self.by_script.get_mut(&script_id) {
            ids.remove(&run_id);
            if ids.is_empty() {
                self.by_script.remove(&script_id);
            }
        }
    }

    pub fn get(&self, run_id: RunId) -> Option<&RunRecord<H>> {
        self.runs.get(&run_id)
    }

    pub fn script_of(&self, run_id: RunId) -> Option<ScriptId> {
        self.runs.get(&run_id).map(|r| r.script_id)
    }

    /// Live runs of `script_id`, in launch order.
    pub fn runs_of_script(&self, script_id: ScriptId) -> Vec<RunId> {
        self.by_script
            .get(&script_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// All live run ids, in launch order.
    pub fn run_ids(&self) -> Vec<RunId> {
        let mut ids: Vec<RunId> = self.runs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_running(&self, script_id: ScriptId) -> bool {
        self.by_script.contains_key(&script_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RunRecord<H>> {
        self.runs.values()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
