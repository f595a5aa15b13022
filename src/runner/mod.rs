// src/runner/mod.rs

//! Process orchestration: launching scripts, streaming their output, and
//! reconciling their exit with the catalog.
//!
//! - [`registry`] owns the bookkeeping of live runs (run id ↔ script id).
//! - [`process`] resolves a [`RunRequest`] into a concrete launch and owns
//!   one OS child process per run.
//! - [`output`] fans [`RunEvent`]s out to subscribers and decodes the child's
//!   byte streams into text.
//! - [`terminator`] provides the platform's graceful-terminate and
//!   process-tree kill primitives.
//! - [`reconciler`] records run statistics and announces completion.
//! - [`run_loop`] is the single task that owns the registry; every mutation
//!   goes through it.
//! - [`handle`] exposes [`Runner`], the cloneable front end used by callers.

pub mod handle;
pub mod output;
pub mod process;
pub mod reconciler;
pub mod registry;
pub mod run_loop;
pub mod terminator;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::RunnerSection;
use crate::types::{RunId, ScriptId};

pub use handle::Runner;
pub use output::{OutputMultiplexer, Utf8ChunkDecoder};
pub use process::LaunchSpec;
pub use reconciler::Reconciler;
pub use registry::Registry;
pub use terminator::{platform_terminator, ProcessTerminator};

/// Which standard stream a chunk of output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn is_error(self) -> bool {
        matches!(self, OutputStream::Stderr)
    }
}

/// How a run's process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// The process exited on its own with an exit code.
    Exited,
    /// The process was terminated by the given signal (POSIX only).
    Signaled(i32),
    /// Waiting on the process failed; the exit code is unknown.
    WaitFailed(String),
}

/// Events published by the runner, each tagged with the originating script.
///
/// Per run: `Started` precedes every `Output`, which precede `Finished`.
/// A launch that fails to spawn produces a single `SpawnFailed` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Started {
        script_id: ScriptId,
        run_id: RunId,
        command_line: String,
    },
    Output {
        script_id: ScriptId,
        stream: OutputStream,
        text: String,
    },
    SpawnFailed {
        script_id: ScriptId,
        message: String,
    },
    /// Emitted only after the run's statistics were handed to the catalog.
    Finished {
        script_id: ScriptId,
        run_id: RunId,
        exit_code: i32,
        reason: ExitReason,
    },
}

impl RunEvent {
    pub fn script_id(&self) -> ScriptId {
        match self {
            RunEvent::Started { script_id, .. }
            | RunEvent::Output { script_id, .. }
            | RunEvent::SpawnFailed { script_id, .. }
            | RunEvent::Finished { script_id, .. } => *script_id,
        }
    }
}

/// A request to launch one script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub script_id: ScriptId,
    pub script_path: PathBuf,
    /// Passed to the process as separate argv entries, never shell-joined.
    pub args: Vec<String>,
    pub interpreter: Option<String>,
    pub working_dir: Option<PathBuf>,
}

impl RunRequest {
    pub fn new(script_id: ScriptId, script_path: impl Into<PathBuf>) -> Self {
        Self {
            script_id,
            script_path: script_path.into(),
            args: Vec::new(),
            interpreter: None,
            working_dir: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Snapshot of one live run, as reported by [`Runner::active_runs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRun {
    pub run_id: RunId,
    pub script_id: ScriptId,
    pub pid: Option<u32>,
    pub command_line: String,
}

/// Launch-wide runner behaviour.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Used when a request names no interpreter. `None` executes the script
    /// file directly.
    pub default_interpreter: Option<String>,
    /// Environment layered over the inherited one for every child.
    pub env: BTreeMap<String, String>,
    /// How long to keep draining output after the process exited.
    pub output_drain_timeout: Duration,
    /// How long a shutting-down loop waits for killed runs to exit.
    pub shutdown_timeout: Duration,
}

/// Environment that makes common interpreters flush output as it is written
/// instead of at exit.
pub fn unbuffered_env() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("PYTHONUNBUFFERED".to_string(), "1".to_string()),
        ("PYTHONIOENCODING".to_string(), "utf-8".to_string()),
    ])
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            default_interpreter: None,
            env: unbuffered_env(),
            output_drain_timeout: Duration::from_millis(500),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl RunnerSettings {
    pub fn from_config(section: &RunnerSection) -> Self {
        let mut env = unbuffered_env();
        env.extend(section.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self {
            default_interpreter: section.default_interpreter.clone(),
            env,
            output_drain_timeout: Duration::from_millis(section.output_drain_timeout_ms),
            shutdown_timeout: Duration::from_millis(section.shutdown_timeout_ms),
        }
    }
}
