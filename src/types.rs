use serde::Deserialize;

/// Stable catalog identity of a script.
pub type ScriptId = i64;

/// Identity of one launched execution. Only meaningful for the lifetime of
/// the orchestrator that issued it; never persisted.
pub type RunId = u64;

/// Script id reported when a process exit cannot be matched back to a run.
pub const UNKNOWN_SCRIPT_ID: ScriptId = -1;

/// Exit code reported when the OS gave none (e.g. the process was killed by
/// a signal) or the exit status could not be collected.
pub const NO_EXIT_CODE: i32 = -1;

/// Where run statistics (`run_count`, `last_run`) are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsStorageMode {
    /// Store stats in a file (`.scriptdeck/stats`) next to the config.
    File,
    /// Store stats in memory only (lost on exit).
    Memory,
}

impl Default for StatsStorageMode {
    fn default() -> Self {
        StatsStorageMode::File
    }
}
