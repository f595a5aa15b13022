#![allow(dead_code, unused_imports)]

pub use scriptdeck_test_utils::builders::{ConfigFileBuilder, ScriptConfigBuilder};
pub use scriptdeck_test_utils::recording_catalog::{RecordingCatalog, Timeline};
pub use scriptdeck_test_utils::script_dir::ScriptDir;
pub use scriptdeck_test_utils::{collect_until_finished, init_tracing, output_text, with_timeout};

use std::sync::Arc;
use std::time::Duration;

use scriptdeck::catalog::MemoryCatalog;
use scriptdeck::runner::{Runner, RunnerSettings};

/// Settings for tests: `sh` as the interpreter and a short drain window.
pub fn sh_settings() -> RunnerSettings {
    RunnerSettings {
        default_interpreter: Some("sh".to_string()),
        output_drain_timeout: Duration::from_millis(300),
        shutdown_timeout: Duration::from_secs(2),
        ..RunnerSettings::default()
    }
}

/// A runner over a memory catalog that knows `ids`.
pub fn sh_runner(ids: &[i64]) -> (Runner, Arc<MemoryCatalog>) {
    let catalog = Arc::new(MemoryCatalog::with_scripts(ids.iter().copied()));
    let runner = Runner::spawn(sh_settings(), catalog.clone());
    (runner, catalog)
}
