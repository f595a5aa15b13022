pub mod builders;
pub mod recording_catalog;
pub mod script_dir;

use std::sync::Once;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};

use scriptdeck::runner::RunEvent;
use scriptdeck::types::RunId;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 10-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(10), f)
        .await
        .expect("Test timed out after 10 seconds")
}

/// Collect events until `Finished` arrived for every run in `runs`.
///
/// Panics if the channel closes first.
pub async fn collect_until_finished(
    rx: &mut mpsc::UnboundedReceiver<RunEvent>,
    runs: &[RunId],
) -> Vec<RunEvent> {
    let mut remaining: Vec<RunId> = runs.to_vec();
    let mut events = Vec::new();
    while !remaining.is_empty() {
        let event = rx.recv().await.expect("event channel closed early");
        if let RunEvent::Finished { run_id, .. } = event {
            remaining.retain(|r| *r != run_id);
        }
        events.push(event);
    }
    events
}

/// Concatenated output text of `script_id` on stdout (`stderr = false`) or
/// stderr.
pub fn output_text(events: &[RunEvent], script_id: i64, stderr: bool) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            RunEvent::Output {
                script_id: id,
                stream,
                text,
            } if *id == script_id && stream.is_error() == stderr => Some(text.as_str()),
            _ => None,
        })
        .collect()
}
