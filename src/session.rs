// src/session.rs

//! Command-line consumer of the runner.
//!
//! Turns selected catalog entries into [`RunRequest`]s, launches them all
//! concurrently, and renders the event stream as prefixed lines until every
//! launched run has finished.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tracing::{debug, info};

use crate::config::{ConfigFile, ScriptConfig};
use crate::errors::{Result, ScriptdeckError};
use crate::runner::{ExitReason, OutputStream, RunEvent, RunRequest, Runner};
use crate::types::{RunId, ScriptId};

/// One script ready to be launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub name: String,
    pub request: RunRequest,
}

/// Command-line overrides applied to every launch.
#[derive(Debug, Clone, Default)]
pub struct LaunchOverrides {
    pub interpreter: Option<String>,
    pub working_dir: Option<String>,
    pub extra_args: Vec<String>,
}

/// Pick scripts by id/name and by folder, keeping first-mention order and
/// dropping duplicates.
pub fn select_scripts<'a>(
    cfg: &'a ConfigFile,
    selectors: &[String],
    folders: &[String],
) -> Result<Vec<&'a ScriptConfig>> {
    let mut selected = Vec::new();
    let mut seen = HashSet::new();

    for selector in selectors {
        let script = cfg
            .find_script(selector)
            .ok_or_else(|| ScriptdeckError::ScriptNotFound(selector.clone()))?;
        if seen.insert(script.id) {
            selected.push(script);
        }
    }

    for folder in folders {
        let mut matched = false;
        for script in cfg.scripts_in_folder(folder) {
            matched = true;
            if seen.insert(script.id) {
                selected.push(script);
            }
        }
        if !matched {
            return Err(ScriptdeckError::ScriptNotFound(format!(
                "no scripts in folder '{folder}'"
            )));
        }
    }

    if selected.is_empty() {
        return Err(ScriptdeckError::ScriptNotFound(
            "nothing selected; name scripts by id or name, or pass --folder".to_string(),
        ));
    }

    Ok(selected)
}

/// Build the launch for one catalog entry.
///
/// Catalog paths resolve against `root`; the `--cwd` override is taken as
/// given.
pub fn build_launch(
    cfg: &ConfigFile,
    root: &Path,
    script: &ScriptConfig,
    overrides: &LaunchOverrides,
) -> Launch {
    let mut request = RunRequest::new(script.id, resolve_path(root, &script.path))
        .args(script.args.iter().cloned())
        .args(overrides.extra_args.iter().cloned());

    if let Some(interp) = overrides
        .interpreter
        .clone()
        .or_else(|| cfg.interpreter_for(script))
    {
        request = request.interpreter(interp);
    }

    if let Some(ref dir) = overrides.working_dir {
        request = request.working_dir(PathBuf::from(dir));
    } else if let Some(ref dir) = script.working_dir {
        request = request.working_dir(resolve_path(root, dir));
    }

    Launch {
        name: script.display_name().to_string(),
        request,
    }
}

fn resolve_path(root: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Outcome of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub finished: Vec<FinishedRun>,
    pub failed_to_start: Vec<ScriptId>,
    /// Shutdown was requested before every run finished.
    pub interrupted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedRun {
    pub script_id: ScriptId,
    pub run_id: RunId,
    pub exit_code: i32,
}

impl SessionSummary {
    pub fn all_succeeded(&self) -> bool {
        !self.interrupted
            && self.failed_to_start.is_empty()
            && self.finished.iter().all(|r| r.exit_code == 0)
    }
}

/// Renders run events as lines prefixed with the script name.
///
/// Output chunks don't align with lines, so partial lines are buffered per
/// script and stream and flushed when the line completes or the script's
/// run finishes.
pub struct Console<O: Write, E: Write> {
    out: O,
    err: E,
    names: HashMap<ScriptId, String>,
    partial: HashMap<(ScriptId, OutputStream), String>,
}

impl<O: Write, E: Write> Console<O, E> {
    pub fn new(out: O, err: E) -> Self {
        Self {
            out,
            err,
            names: HashMap::new(),
            partial: HashMap::new(),
        }
    }

    pub fn set_name(&mut self, script_id: ScriptId, name: impl Into<String>) {
        self.names.insert(script_id, name.into());
    }

    pub fn into_writers(self) -> (O, E) {
        (self.out, self.err)
    }

    fn name(&self, script_id: ScriptId) -> String {
        self.names
            .get(&script_id)
            .cloned()
            .unwrap_or_else(|| format!("#{script_id}"))
    }

    pub fn render(&mut self, event: &RunEvent) -> std::io::Result<()> {
        match event {
            RunEvent::Started {
                script_id,
                command_line,
                ..
            } => {
                let name = self.name(*script_id);
                writeln!(self.out, "[{name}] [RUN] {command_line}")?;
            }
            RunEvent::Output {
                script_id,
                stream,
                text,
            } => {
                let buf = self.partial.entry((*script_id, *stream)).or_default();
                buf.push_str(text);
                let mut lines = Vec::new();
                while let Some(pos) = buf.find('\n') {
                    let line: String = buf.drain(..=pos).collect();
                    lines.push(line.trim_end_matches(['\n', '\r']).to_string());
                }
                for line in lines {
                    self.write_line(*script_id, *stream, &line)?;
                }
            }
            RunEvent::SpawnFailed { script_id, message } => {
                let name = self.name(*script_id);
                writeln!(self.err, "[{name}] failed to start: {message}")?;
            }
            RunEvent::Finished {
                script_id,
                exit_code,
                reason,
                ..
            } => {
                self.flush_partial(*script_id)?;
                let name = self.name(*script_id);
                match reason {
                    ExitReason::Signaled(signal) => {
                        writeln!(self.out, "[{name}] [EXIT] code={exit_code} signal={signal}")?
                    }
                    ExitReason::WaitFailed(msg) => {
                        writeln!(self.out, "[{name}] [EXIT] code={exit_code} ({msg})")?
                    }
                    ExitReason::Exited => writeln!(self.out, "[{name}] [EXIT] code={exit_code}")?,
                }
            }
        }
        self.out.flush()?;
        self.err.flush()
    }

    fn write_line(&mut self, script_id: ScriptId, stream: OutputStream, line: &str) -> std::io::Result<()> {
        let name = self.name(script_id);
        if stream.is_error() {
            writeln!(self.err, "[{name}] {line}")
        } else {
            writeln!(self.out, "[{name}] {line}")
        }
    }

    fn flush_partial(&mut self, script_id: ScriptId) -> std::io::Result<()> {
        for stream in [OutputStream::Stdout, OutputStream::Stderr] {
            if let Some(rest) = self.partial.remove(&(script_id, stream)) {
                if !rest.is_empty() {
                    self.write_line(script_id, stream, &rest)?;
                }
            }
        }
        Ok(())
    }
}

/// Launch every entry of `launches` and render events until all of them
/// finished.
///
/// When `shutdown` completes first, launches not yet made are skipped, every
/// run is killed and the session still waits for their `Finished` events.
pub async fn run_session<O, E, F>(
    runner: &Runner,
    launches: Vec<Launch>,
    console: &mut Console<O, E>,
    shutdown: F,
) -> Result<SessionSummary>
where
    O: Write,
    E: Write,
    F: Future<Output = ()>,
{
    let mut events = runner.subscribe();
    let mut summary = SessionSummary::default();
    let mut pending: HashSet<RunId> = HashSet::new();

    tokio::pin!(shutdown);

    for launch in launches {
        // Each launch is quick, so checking between launches is enough to
        // stop a long launch sequence early.
        if shutdown_requested(&mut shutdown).await {
            info!(
                launched = pending.len(),
                "shutdown requested while launching; skipping remaining scripts"
            );
            summary.interrupted = true;
            runner.kill_all().await;
            break;
        }

        console.set_name(launch.request.script_id, launch.name.clone());
        let script_id = launch.request.script_id;
        match runner.run(launch.request).await {
            Ok(run_id) => {
                pending.insert(run_id);
            }
            Err(e) => {
                debug!(script_id, error = %e, "launch failed");
                summary.failed_to_start.push(script_id);
            }
        }
    }

    info!(
        launched = pending.len(),
        failed = summary.failed_to_start.len(),
        "session started"
    );

    while !pending.is_empty() {
        tokio::select! {
            _ = &mut shutdown, if !summary.interrupted => {
                info!(remaining = pending.len(), "shutdown requested; killing runs");
                summary.interrupted = true;
                runner.kill_all().await;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                console.render(&event)?;
                if let RunEvent::Finished { script_id, run_id, exit_code, .. } = event {
                    if pending.remove(&run_id) {
                        summary.finished.push(FinishedRun { script_id, run_id, exit_code });
                    }
                }
            }
        }
    }

    // Spawn failures were emitted before `run` returned; show them too.
    while let Ok(event) = events.try_recv() {
        console.render(&event)?;
    }

    info!(
        finished = summary.finished.len(),
        failed = summary.failed_to_start.len(),
        interrupted = summary.interrupted,
        "session complete"
    );

    Ok(summary)
}

/// Poll `shutdown` once without waiting.
async fn shutdown_requested<F>(shutdown: &mut Pin<&mut F>) -> bool
where
    F: Future<Output = ()>,
{
    tokio::select! {
        biased;
        _ = shutdown.as_mut() => true,
        _ = std::future::ready(()) => false,
    }
}
