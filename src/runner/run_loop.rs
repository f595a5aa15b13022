// src/runner/run_loop.rs

//! The task that owns the run registry.
//!
//! Requests from [`Runner`](crate::runner::Runner) handles and exit
//! notifications from run supervisors arrive on two channels and are handled
//! one at a time, so the registry needs no locking. Spawning and signalling
//! are synchronous; reconciling awaits only the catalog write, which runs on
//! the blocking pool so the runtime's workers keep serving the other runs.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::catalog::CatalogStore;
use crate::errors::Result;
use crate::runner::output::OutputMultiplexer;
use crate::runner::process::{LaunchSpec, ProcessExit, ProcessHandle, SpawnedProcess};
use crate::runner::reconciler::Reconciler;
use crate::runner::registry::Registry;
use crate::runner::terminator::ProcessTerminator;
use crate::runner::{ActiveRun, RunEvent, RunRequest, RunnerSettings};
use crate::types::{RunId, ScriptId};

/// Capacity of the request channel.
const COMMAND_BUFFER: usize = 64;

/// Which runs a stop request applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopTarget {
    Run(RunId),
    Script(ScriptId),
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    Terminate,
    Kill,
}

/// Requests accepted by the run loop.
#[derive(Debug)]
pub enum RunnerCommand {
    Run {
        request: RunRequest,
        reply: oneshot::Sender<Result<RunId>>,
    },
    /// Replies with the number of runs that were signalled.
    Stop {
        target: StopTarget,
        mode: StopMode,
        reply: oneshot::Sender<usize>,
    },
    ActiveRuns {
        reply: oneshot::Sender<Vec<ActiveRun>>,
    },
}

/// Spawn the run loop and return the sender used to talk to it.
///
/// The loop runs until every sender is dropped; it then kills whatever is
/// still running and waits (bounded by `settings.shutdown_timeout`) for
/// those runs to be reconciled.
pub fn spawn_run_loop(
    settings: RunnerSettings,
    catalog: Arc<dyn CatalogStore>,
    terminator: Arc<dyn ProcessTerminator>,
    events: OutputMultiplexer,
) -> mpsc::Sender<RunnerCommand> {
    let (cmd_tx, cmd_rx) = mpsc::channel::<RunnerCommand>(COMMAND_BUFFER);
    let (exit_tx, exit_rx) = mpsc::unbounded_channel::<ProcessExit>();

    let run_loop = RunLoop {
        registry: Registry::new(),
        settings,
        reconciler: Reconciler::new(catalog),
        terminator,
        events,
        exit_tx,
    };

    tokio::spawn(run_loop.run(cmd_rx, exit_rx));

    cmd_tx
}

struct RunLoop {
    registry: Registry<ProcessHandle>,
    settings: RunnerSettings,
    reconciler: Reconciler,
    terminator: Arc<dyn ProcessTerminator>,
    events: OutputMultiplexer,
    exit_tx: mpsc::UnboundedSender<ProcessExit>,
}

impl RunLoop {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<RunnerCommand>,
        mut exit_rx: mpsc::UnboundedReceiver<ProcessExit>,
    ) {
        info!("run loop started");

        loop {
            tokio::select! {
                // `exit_tx` lives in `self`, so this channel never closes here.
                Some(exit) = exit_rx.recv() => self.handle_exit(exit).await,
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        info!("all runner handles dropped; shutting down");
                        break;
                    }
                },
            }
        }

        self.shutdown(&mut exit_rx).await;
        info!("run loop finished");
    }

    fn handle_command(&mut self, cmd: RunnerCommand) {
        match cmd {
            RunnerCommand::Run { request, reply } => {
                let result = self.start_run(request);
                if reply.send(result).is_err() {
                    debug!("run requester went away before the reply");
                }
            }
            RunnerCommand::Stop {
                target,
                mode,
                reply,
            } => {
                let signalled = self.stop(target, mode);
                let _ = reply.send(signalled);
            }
            RunnerCommand::ActiveRuns { reply } => {
                let mut runs: Vec<ActiveRun> =
                    self.registry.iter().map(|r| r.handle.snapshot()).collect();
                runs.sort_by_key(|r| r.run_id);
                let _ = reply.send(runs);
            }
        }
    }

    fn start_run(&mut self, request: RunRequest) -> Result<RunId> {
        let run_id = self.registry.allocate_run_id();
        let script_id = request.script_id;
        let spec = LaunchSpec::resolve(&request, &self.settings);

        info!(
            run_id,
            script_id,
            command_line = %spec.command_line,
            "starting run"
        );

        let spawned = match SpawnedProcess::spawn(run_id, script_id, &spec, self.terminator.as_ref()) {
            Ok(spawned) => spawned,
            Err(err) => {
                warn!(run_id, script_id, error = %err, "failed to start run");
                self.events.emit(RunEvent::SpawnFailed {
                    script_id,
                    message: err.to_string(),
                });
                return Err(err);
            }
        };

        // Announce before the pumps exist so `Started` precedes any output.
        self.events.emit(RunEvent::Started {
            script_id,
            run_id,
            command_line: spec.command_line.clone(),
        });

        let handle = spawned.supervise(
            self.events.clone(),
            self.exit_tx.clone(),
            self.settings.output_drain_timeout,
        );
        self.registry.insert(run_id, script_id, handle);

        debug!(run_id, script_id, active = self.registry.len(), "run registered");
        Ok(run_id)
    }

    fn stop(&mut self, target: StopTarget, mode: StopMode) -> usize {
        let run_ids = match target {
            StopTarget::Run(run_id) => {
                if self.registry.get(run_id).is_some() {
                    vec![run_id]
                } else {
                    Vec::new()
                }
            }
            StopTarget::Script(script_id) => self.registry.runs_of_script(script_id),
            StopTarget::All => self.registry.run_ids(),
        };

        if run_ids.is_empty() {
            debug!(?target, ?mode, "no matching runs; nothing to stop");
            return 0;
        }

        info!(?target, ?mode, runs = ?run_ids, "stopping runs");

        for run_id in run_ids.iter() {
            if let Some(record) = self.registry.get(*run_id) {
                match mode {
                    StopMode::Terminate => record.handle.terminate(self.terminator.as_ref()),
                    StopMode::Kill => record.handle.kill(self.terminator.as_ref()),
                }
            }
        }

        run_ids.len()
    }

    async fn handle_exit(&mut self, exit: ProcessExit) {
        let run_id = exit.run_id;
        if self
            .reconciler
            .reconcile(&mut self.registry, exit, &self.events)
            .await
            .is_some()
        {
            debug!(run_id, active = self.registry.len(), "run released");
        }
    }

    async fn shutdown(&mut self, exit_rx: &mut mpsc::UnboundedReceiver<ProcessExit>) {
        if self.registry.is_empty() {
            return;
        }

        info!(remaining = self.registry.len(), "killing runs left at shutdown");
        self.stop(StopTarget::All, StopMode::Kill);

        let deadline = tokio::time::Instant::now() + self.settings.shutdown_timeout;
        while !self.registry.is_empty() {
            match tokio::time::timeout_at(deadline, exit_rx.recv()).await {
                Ok(Some(exit)) => self.handle_exit(exit).await,
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        remaining = self.registry.len(),
                        "timed out waiting for killed runs to exit"
                    );
                    break;
                }
            }
        }
    }
}
