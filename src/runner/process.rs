// src/runner/process.rs

//! One OS child process per run.
//!
//! A launch goes through three stages:
//! 1. [`LaunchSpec::resolve`] turns a [`RunRequest`] into program, argv,
//!    working directory and environment.
//! 2. [`SpawnedProcess::spawn`] starts the child with piped output.
//! 3. [`SpawnedProcess::supervise`] starts the output pumps and a supervisor
//!    task that waits for exit, drains the pumps, and reports a
//!    [`ProcessExit`] to the run loop. What remains is the
//!    [`ProcessHandle`] kept in the registry.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{Result, ScriptdeckError};
use crate::runner::output::{pump_stream, OutputMultiplexer};
use crate::runner::terminator::ProcessTerminator;
use crate::runner::{ActiveRun, ExitReason, OutputStream, RunRequest, RunnerSettings};
use crate::types::{RunId, ScriptId, NO_EXIT_CODE};

/// Fully resolved launch of one script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: PathBuf,
    /// Layered over the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Human-readable rendering for events and logs. Never executed.
    pub command_line: String,
}

impl LaunchSpec {
    /// Resolve interpreter, argv and working directory for `request`.
    ///
    /// - interpreter: the request's, else the settings default; with no
    ///   interpreter at all the script itself is the program.
    /// - working directory: the request's, else the script's directory.
    ///
    /// A relative script path is made absolute against the caller's current
    /// directory first; the child resolves it after changing directory.
    pub fn resolve(request: &RunRequest, settings: &RunnerSettings) -> Self {
        let script_path = absolute_script_path(&request.script_path);
        let interpreter = request
            .interpreter
            .as_deref()
            .or(settings.default_interpreter.as_deref());

        let user_args = request.args.iter().map(OsString::from);
        let (program, args): (PathBuf, Vec<OsString>) = match interpreter {
            Some(interp) => (
                PathBuf::from(interp),
                std::iter::once(script_path.clone().into_os_string())
                    .chain(user_args)
                    .collect(),
            ),
            None => (script_path.clone(), user_args.collect()),
        };

        let working_dir = request
            .working_dir
            .clone()
            .unwrap_or_else(|| script_dir(&script_path));

        let command_line = render_command_line(&program, &args, &working_dir);

        Self {
            program,
            args,
            working_dir,
            env: settings.env.clone(),
            command_line,
        }
    }

    /// Build the command. Arguments stay a vector; nothing goes through a
    /// shell.
    pub fn to_command(&self, terminator: &dyn ProcessTerminator) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.working_dir)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        terminator.prepare(&mut cmd);
        cmd
    }
}

fn absolute_script_path(script_path: &Path) -> PathBuf {
    if script_path.is_absolute() {
        return script_path.to_path_buf();
    }
    match std::path::absolute(script_path) {
        Ok(path) => path,
        Err(e) => {
            warn!(path = %script_path.display(), error = %e, "cannot make script path absolute; using it as given");
            script_path.to_path_buf()
        }
    }
}

fn script_dir(script_path: &Path) -> PathBuf {
    match script_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn render_command_line(program: &Path, args: &[OsString], working_dir: &Path) -> String {
    let mut parts = vec![program.to_string_lossy().into_owned()];
    parts.extend(args.iter().map(|a| a.to_string_lossy().into_owned()));
    format!("{} (cwd={})", parts.join(" "), working_dir.display())
}

/// Exit notification sent by a run's supervisor to the run loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    pub run_id: RunId,
    pub exit_code: i32,
    pub reason: ExitReason,
}

/// A started child whose output is not being read yet.
#[derive(Debug)]
pub struct SpawnedProcess {
    run_id: RunId,
    script_id: ScriptId,
    pid: Option<u32>,
    child: Child,
    command_line: String,
}

impl SpawnedProcess {
    pub fn spawn(
        run_id: RunId,
        script_id: ScriptId,
        spec: &LaunchSpec,
        terminator: &dyn ProcessTerminator,
    ) -> Result<Self> {
        let child = spec
            .to_command(terminator)
            .spawn()
            .map_err(|source| ScriptdeckError::SpawnFailed {
                program: spec.program.to_string_lossy().into_owned(),
                source,
            })?;
        let pid = child.id();

        info!(run_id, script_id, pid, "spawned process");

        Ok(Self {
            run_id,
            script_id,
            pid,
            child,
            command_line: spec.command_line.clone(),
        })
    }

    /// Start streaming output into `events` and watching for exit.
    pub fn supervise(
        self,
        events: OutputMultiplexer,
        exit_tx: mpsc::UnboundedSender<ProcessExit>,
        drain_timeout: Duration,
    ) -> ProcessHandle {
        let SpawnedProcess {
            run_id,
            script_id,
            pid,
            mut child,
            command_line,
        } = self;

        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(pump_stream(
                stdout,
                script_id,
                OutputStream::Stdout,
                events.clone(),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(pump_stream(
                stderr,
                script_id,
                OutputStream::Stderr,
                events,
            )));
        }

        let exited = Arc::new(AtomicBool::new(false));
        let supervisor = tokio::spawn(wait_for_exit(
            run_id,
            script_id,
            child,
            pumps,
            drain_timeout,
            Arc::clone(&exited),
            exit_tx,
        ));

        ProcessHandle {
            run_id,
            script_id,
            pid,
            command_line,
            exited,
            supervisor,
        }
    }
}

async fn wait_for_exit(
    run_id: RunId,
    script_id: ScriptId,
    mut child: Child,
    pumps: Vec<JoinHandle<()>>,
    drain_timeout: Duration,
    exited: Arc<AtomicBool>,
    exit_tx: mpsc::UnboundedSender<ProcessExit>,
) {
    let (exit_code, reason) = match child.wait().await {
        Ok(status) => exit_parts(status),
        Err(e) => {
            warn!(run_id, script_id, error = %e, "waiting for process failed");
            (NO_EXIT_CODE, ExitReason::WaitFailed(e.to_string()))
        }
    };
    exited.store(true, Ordering::Release);

    info!(run_id, script_id, exit_code, ?reason, "process exited");

    // Trailing output must be delivered before the exit is reported, but a
    // descendant that inherited the pipes may hold them open indefinitely.
    for mut pump in pumps {
        if tokio::time::timeout(drain_timeout, &mut pump).await.is_err() {
            debug!(run_id, script_id, "output still open after exit; abandoning pump");
            pump.abort();
            // Wait for the abort to land so no output trails the exit report.
            let _ = pump.await;
        }
    }

    if exit_tx
        .send(ProcessExit {
            run_id,
            exit_code,
            reason,
        })
        .is_err()
    {
        debug!(run_id, script_id, "run loop gone before exit could be reported");
    }
}

fn exit_parts(status: ExitStatus) -> (i32, ExitReason) {
    if let Some(code) = status.code() {
        return (code, ExitReason::Exited);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return (NO_EXIT_CODE, ExitReason::Signaled(signal));
        }
    }

    (NO_EXIT_CODE, ExitReason::Exited)
}

/// The registry's handle on one live child process.
///
/// The child itself is owned by the supervisor task; the handle keeps the
/// pid for signalling and the supervisor's join handle.
#[derive(Debug)]
pub struct ProcessHandle {
    run_id: RunId,
    script_id: ScriptId,
    pid: Option<u32>,
    command_line: String,
    exited: Arc<AtomicBool>,
    supervisor: JoinHandle<()>,
}

impl ProcessHandle {
    /// True once the OS reported the exit, even if the run loop has not
    /// reconciled it yet.
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire) || self.supervisor.is_finished()
    }

    pub fn snapshot(&self) -> ActiveRun {
        ActiveRun {
            run_id: self.run_id,
            script_id: self.script_id,
            pid: self.pid,
            command_line: self.command_line.clone(),
        }
    }

    /// Best-effort graceful termination of the run's process tree.
    pub fn terminate(&self, terminator: &dyn ProcessTerminator) {
        self.signal(terminator, false);
    }

    /// Best-effort forceful termination of the run's process tree.
    pub fn kill(&self, terminator: &dyn ProcessTerminator) {
        self.signal(terminator, true);
    }

    fn signal(&self, terminator: &dyn ProcessTerminator, force: bool) {
        let action = if force { "kill" } else { "terminate" };

        // Once reaped, the pid may already belong to an unrelated process.
        if self.has_exited() {
            debug!(run_id = self.run_id, script_id = self.script_id, action, "process already exited; not signalling");
            return;
        }
        let Some(pid) = self.pid else {
            debug!(run_id = self.run_id, script_id = self.script_id, action, "no pid for process; not signalling");
            return;
        };

        let result = if force {
            terminator.kill_tree(pid)
        } else {
            terminator.terminate(pid)
        };
        match result {
            Ok(()) => info!(run_id = self.run_id, script_id = self.script_id, pid, action, "signalled process tree"),
            Err(e) => warn!(
                run_id = self.run_id,
                script_id = self.script_id,
                pid,
                action,
                error = %e,
                "signalling process tree failed; ignoring"
            ),
        }
    }
}
