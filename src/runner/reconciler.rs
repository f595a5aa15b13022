// src/runner/reconciler.rs

//! Turns an OS exit notification into persisted stats plus a `Finished`
//! event, in that order: a subscriber reacting to `Finished` can rely on the
//! catalog already reflecting the run.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::catalog::{now_timestamp, CatalogStore};
use crate::runner::output::OutputMultiplexer;
use crate::runner::process::ProcessExit;
use crate::runner::registry::{Registry, RunRecord};
use crate::runner::RunEvent;
use crate::types::{ScriptId, UNKNOWN_SCRIPT_ID};

pub struct Reconciler {
    catalog: Arc<dyn CatalogStore>,
}

impl Reconciler {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    /// Settle one exited run:
    /// 1. resolve its script (falling back to [`UNKNOWN_SCRIPT_ID`]),
    /// 2. record the run in the catalog,
    /// 3. emit `Finished`,
    /// 4. drop it from the registry, returning its record.
    ///
    /// The catalog write runs on the blocking pool; `Finished` is emitted only
    /// after it completed.
    pub async fn reconcile<H>(
        &self,
        registry: &mut Registry<H>,
        exit: ProcessExit,
        events: &OutputMultiplexer,
    ) -> Option<RunRecord<H>> {
        let ProcessExit {
            run_id,
            exit_code,
            reason,
        } = exit;

        let script_id = match registry.script_of(run_id) {
            Some(id) => id,
            None => {
                warn!(run_id, "exit reported for a run that isn't registered");
                UNKNOWN_SCRIPT_ID
            }
        };

        if script_id == UNKNOWN_SCRIPT_ID {
            debug!(run_id, "skipping run stats for unknown script");
        } else {
            self.record(script_id).await;
        }

        events.emit(RunEvent::Finished {
            script_id,
            run_id,
            exit_code,
            reason,
        });

        registry.remove(run_id)
    }

    async fn record(&self, script_id: ScriptId) {
        let timestamp = now_timestamp();
        let catalog = Arc::clone(&self.catalog);
        let result =
            tokio::task::spawn_blocking(move || catalog.record_run(script_id, &timestamp)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(script_id, error = %e, "failed to record run; continuing"),
            Err(e) => warn!(script_id, error = %e, "run recording task failed; continuing"),
        }
    }
}
