// src/runner/handle.rs

//! Public front end of the orchestrator.
//!
//! A [`Runner`] is a cheap, cloneable handle onto one run loop. Every
//! `Runner::spawn` creates an independent loop with its own registry and
//! subscribers; nothing is process-global.
//!
//! Stop operations are best-effort: stopping a run that doesn't exist (or
//! already finished) does nothing and is not an error.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::catalog::CatalogStore;
use crate::errors::{Result, ScriptdeckError};
use crate::runner::output::OutputMultiplexer;
use crate::runner::run_loop::{spawn_run_loop, RunnerCommand, StopMode, StopTarget};
use crate::runner::terminator::{platform_terminator, ProcessTerminator};
use crate::runner::{ActiveRun, RunEvent, RunRequest, RunnerSettings};
use crate::types::{RunId, ScriptId};

#[derive(Debug, Clone)]
pub struct Runner {
    cmd_tx: mpsc::Sender<RunnerCommand>,
    events: OutputMultiplexer,
}

impl Runner {
    /// Start a runner using the current platform's process-tree strategy.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(settings: RunnerSettings, catalog: Arc<dyn CatalogStore>) -> Self {
        Self::with_terminator(settings, catalog, platform_terminator())
    }

    pub fn with_terminator(
        settings: RunnerSettings,
        catalog: Arc<dyn CatalogStore>,
        terminator: Arc<dyn ProcessTerminator>,
    ) -> Self {
        let events = OutputMultiplexer::new();
        let cmd_tx = spawn_run_loop(settings, catalog, terminator, events.clone());
        Self { cmd_tx, events }
    }

    /// Receive every [`RunEvent`] emitted after this call.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RunEvent> {
        self.events.subscribe()
    }

    /// Launch a script. Several runs of the same script may be live at once.
    ///
    /// A launch that cannot be spawned emits `RunEvent::SpawnFailed`, leaves
    /// nothing in the registry, and returns `ScriptdeckError::SpawnFailed`.
    pub async fn run(&self, request: RunRequest) -> Result<RunId> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(RunnerCommand::Run { request, reply })
            .await
            .map_err(|_| ScriptdeckError::RunnerUnavailable)?;
        rx.await.map_err(|_| ScriptdeckError::RunnerUnavailable)?
    }

    pub async fn terminate_by_script(&self, script_id: ScriptId) -> usize {
        self.stop(StopTarget::Script(script_id), StopMode::Terminate)
            .await
    }

    pub async fn terminate_by_run(&self, run_id: RunId) -> usize {
        self.stop(StopTarget::Run(run_id), StopMode::Terminate).await
    }

    pub async fn kill_by_script(&self, script_id: ScriptId) -> usize {
        self.stop(StopTarget::Script(script_id), StopMode::Kill).await
    }

    pub async fn kill_by_run(&self, run_id: RunId) -> usize {
        self.stop(StopTarget::Run(run_id), StopMode::Kill).await
    }

    /// Forcefully stop every tracked run, e.g. on application shutdown.
    pub async fn kill_all(&self) -> usize {
        self.stop(StopTarget::All, StopMode::Kill).await
    }

    /// Live runs, ordered by run id.
    pub async fn active_runs(&self) -> Vec<ActiveRun> {
        let (reply, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(RunnerCommand::ActiveRuns { reply })
            .await
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn is_running(&self, script_id: ScriptId) -> bool {
        self.active_runs()
            .await
            .iter()
            .any(|r| r.script_id == script_id)
    }

    /// Returns how many runs were signalled.
    async fn stop(&self, target: StopTarget, mode: StopMode) -> usize {
        let (reply, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(RunnerCommand::Stop {
                target,
                mode,
                reply,
            })
            .await
            .is_err()
        {
            debug!(?target, ?mode, "run loop gone; stop request dropped");
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
