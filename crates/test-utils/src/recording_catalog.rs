use std::sync::{Arc, Mutex};
use std::time::Duration;

use scriptdeck::catalog::{CatalogStore, ScriptStats};
use scriptdeck::errors::{Result, ScriptdeckError};
use scriptdeck::types::ScriptId;

/// Shared, ordered log of what happened during a test.
pub type Timeline = Arc<Mutex<Vec<String>>>;

/// A catalog that:
/// - appends `record:<id>` to a shared timeline on every `record_run`
/// - optionally blocks before recording, or fails every write.
///
/// Test consumers append their own entries (e.g. `finished:<id>`) to the
/// same timeline to check ordering.
#[derive(Debug, Default)]
pub struct RecordingCatalog {
    timeline: Timeline,
    recorded: Mutex<Vec<(ScriptId, String)>>,
    fail: bool,
    delay: Option<Duration>,
}

impl RecordingCatalog {
    pub fn new(timeline: Timeline) -> Self {
        Self {
            timeline,
            recorded: Mutex::new(Vec::new()),
            fail: false,
            delay: None,
        }
    }

    /// Every `record_run` returns an error (after being logged).
    pub fn failing(timeline: Timeline) -> Self {
        Self {
            fail: true,
            ..Self::new(timeline)
        }
    }

    /// Every `record_run` blocks the calling thread for `delay` first, like
    /// a slow disk would.
    pub fn slow(timeline: Timeline, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(timeline)
        }
    }

    pub fn recorded(&self) -> Vec<(ScriptId, String)> {
        self.recorded.lock().unwrap().clone()
    }
}

impl CatalogStore for RecordingCatalog {
    fn record_run(&self, script_id: ScriptId, timestamp: &str) -> Result<()> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.timeline
            .lock()
            .unwrap()
            .push(format!("record:{script_id}"));
        self.recorded
            .lock()
            .unwrap()
            .push((script_id, timestamp.to_string()));
        if self.fail {
            return Err(ScriptdeckError::Other(anyhow::anyhow!("stats storage unavailable")));
        }
        Ok(())
    }

    fn stats(&self, script_id: ScriptId) -> Result<Option<ScriptStats>> {
        let recorded = self.recorded.lock().unwrap();
        let mut stats = ScriptStats::default();
        for (_, ts) in recorded.iter().filter(|(id, _)| *id == script_id) {
            stats.bump(ts);
        }
        Ok((stats.run_count > 0).then_some(stats))
    }
}
