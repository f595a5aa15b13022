// tests/runner_lifecycle.rs
//
// End-to-end runs of real child processes, using `sh` as the interpreter.
#![cfg(unix)]

mod common;
use crate::common::{
    collect_until_finished, init_tracing, output_text, sh_runner, sh_settings, with_timeout,
    RecordingCatalog, ScriptDir, Timeline,
};

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use scriptdeck::catalog::{CatalogStore, MemoryCatalog};
use scriptdeck::errors::ScriptdeckError;
use scriptdeck::runner::{ExitReason, RunEvent, RunRequest, Runner, RunnerSettings};
use scriptdeck::types::NO_EXIT_CODE;

fn finished_of(events: &[RunEvent], run: u64) -> (i64, i32, ExitReason) {
    events
        .iter()
        .find_map(|e| match e {
            RunEvent::Finished {
                script_id,
                run_id,
                exit_code,
                reason,
            } if *run_id == run => Some((*script_id, *exit_code, reason.clone())),
            _ => None,
        })
        .expect("run must have finished")
}

/// `path` expressed relative to the test process's current directory.
fn relative_to_cwd(path: &Path) -> PathBuf {
    let cwd = std::env::current_dir().unwrap();
    let mut rel = PathBuf::new();
    for component in cwd.components() {
        if matches!(component, Component::Normal(_)) {
            rel.push("..");
        }
    }
    rel.join(path.strip_prefix("/").unwrap())
}

/// Wait until `runner` reports `script_id` as running.
async fn wait_until_running(runner: &Runner, script_id: i64) {
    while !runner.is_running(script_id).await {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn hello_world_streams_output_and_counts_the_run() {
    init_tracing();

    let dir = ScriptDir::new();
    let script = dir.sh("hello.sh", "echo hello");
    let (runner, catalog) = sh_runner(&[1]);
    let mut rx = runner.subscribe();

    let run = runner.run(RunRequest::new(1, &script)).await.unwrap();
    let events = with_timeout(collect_until_finished(&mut rx, &[run])).await;

    match &events[0] {
        RunEvent::Started {
            script_id,
            run_id,
            command_line,
        } => {
            assert_eq!((*script_id, *run_id), (1, run));
            assert!(command_line.starts_with("sh "), "got {command_line}");
            assert!(command_line.contains("hello.sh"));
        }
        other => panic!("first event must be Started, got {other:?}"),
    }
    assert!(matches!(events.last(), Some(RunEvent::Finished { .. })));
    assert_eq!(output_text(&events, 1, false), "hello\n");
    assert_eq!(finished_of(&events, run), (1, 0, ExitReason::Exited));

    // Stats were recorded before Finished was announced.
    let stats = catalog.stats(1).unwrap().unwrap();
    assert_eq!(stats.run_count, 1);
    assert!(stats.last_run.is_some());
    assert!(runner.active_runs().await.is_empty());
}

#[tokio::test]
async fn exit_code_and_stderr_are_reported() {
    init_tracing();

    let dir = ScriptDir::new();
    let script = dir.sh("fail.sh", "echo oops >&2\nexit 3");
    let (runner, _catalog) = sh_runner(&[2]);
    let mut rx = runner.subscribe();

    let run = runner.run(RunRequest::new(2, &script)).await.unwrap();
    let events = with_timeout(collect_until_finished(&mut rx, &[run])).await;

    assert_eq!(output_text(&events, 2, true), "oops\n");
    assert_eq!(output_text(&events, 2, false), "");
    assert_eq!(finished_of(&events, run).1, 3);
}

#[tokio::test]
async fn arguments_reach_the_script_unsplit() {
    init_tracing();

    let dir = ScriptDir::new();
    let script = dir.sh("args.sh", "printf '%s|' \"$@\"");
    let (runner, _catalog) = sh_runner(&[3]);
    let mut rx = runner.subscribe();

    let request = RunRequest::new(3, &script).args(["two words", "$HOME", "a;b"]);
    let run = runner.run(request).await.unwrap();
    let events = with_timeout(collect_until_finished(&mut rx, &[run])).await;

    assert_eq!(output_text(&events, 3, false), "two words|$HOME|a;b|");
}

#[tokio::test]
async fn working_dir_and_env_are_applied() {
    init_tracing();

    let dir = ScriptDir::new();
    let script = dir.sh("where.sh", "pwd -P\necho \"mode=$APP_MODE py=$PYTHONUNBUFFERED\"");
    let work = dir.path().join("work");
    std::fs::create_dir_all(&work).unwrap();

    let mut settings = sh_settings();
    settings.env.insert("APP_MODE".into(), "test".into());
    let runner = Runner::spawn(settings, Arc::new(MemoryCatalog::with_scripts([4])));
    let mut rx = runner.subscribe();

    let run = runner
        .run(RunRequest::new(4, &script).working_dir(&work))
        .await
        .unwrap();
    let events = with_timeout(collect_until_finished(&mut rx, &[run])).await;

    let expected_dir = work.canonicalize().unwrap();
    let out = output_text(&events, 4, false);
    let mut lines = out.lines();
    assert_eq!(lines.next(), Some(expected_dir.to_str().unwrap()));
    assert_eq!(lines.next(), Some("mode=test py=1"));
}

#[tokio::test]
async fn invalid_utf8_is_replaced_not_fatal() {
    init_tracing();

    let dir = ScriptDir::new();
    let script = dir.sh("bytes.sh", "printf 'a\\377b\\n'");
    let (runner, _catalog) = sh_runner(&[5]);
    let mut rx = runner.subscribe();

    let run = runner.run(RunRequest::new(5, &script)).await.unwrap();
    let events = with_timeout(collect_until_finished(&mut rx, &[run])).await;

    assert_eq!(output_text(&events, 5, false), "a\u{FFFD}b\n");
    assert_eq!(finished_of(&events, run).1, 0);
}

#[tokio::test]
async fn same_script_runs_concurrently() {
    init_tracing();

    let dir = ScriptDir::new();
    let script = dir.sh("slow.sh", "sleep 0.3\necho \"done $1\"");
    let (runner, catalog) = sh_runner(&[6]);
    let mut rx = runner.subscribe();

    let first = runner.run(RunRequest::new(6, &script).args(["one"])).await.unwrap();
    let second = runner.run(RunRequest::new(6, &script).args(["two"])).await.unwrap();
    assert_ne!(first, second);

    let active = runner.active_runs().await;
    assert_eq!(active.len(), 2);
    assert!(active.iter().all(|r| r.script_id == 6 && r.pid.is_some()));
    assert!(runner.is_running(6).await);

    let events = with_timeout(collect_until_finished(&mut rx, &[first, second])).await;

    let out = output_text(&events, 6, false);
    assert!(out.contains("done one\n") && out.contains("done two\n"), "got {out:?}");
    assert_eq!(catalog.stats(6).unwrap().unwrap().run_count, 2);
    assert!(!runner.is_running(6).await);
}

#[tokio::test]
async fn every_run_reports_started_before_output_before_finished() {
    init_tracing();

    let dir = ScriptDir::new();
    let script = dir.sh("chatty.sh", "for i in 1 2 3; do echo \"line $i\"; echo \"err $i\" >&2; done");
    let (runner, _catalog) = sh_runner(&[1, 2]);
    let mut rx = runner.subscribe();

    let a = runner.run(RunRequest::new(1, &script)).await.unwrap();
    let b = runner.run(RunRequest::new(2, &script)).await.unwrap();
    let events = with_timeout(collect_until_finished(&mut rx, &[a, b])).await;

    for script_id in [1, 2] {
        let mine: Vec<&RunEvent> = events.iter().filter(|e| e.script_id() == script_id).collect();
        assert!(matches!(mine.first(), Some(RunEvent::Started { .. })));
        assert!(matches!(mine.last(), Some(RunEvent::Finished { .. })));
        assert!(mine[1..mine.len() - 1]
            .iter()
            .all(|e| matches!(e, RunEvent::Output { .. })));
        assert_eq!(output_text(&events, script_id, false), "line 1\nline 2\nline 3\n");
        assert_eq!(output_text(&events, script_id, true), "err 1\nerr 2\nerr 3\n");
    }
}

#[tokio::test]
async fn stats_are_persisted_before_finished_is_seen() {
    init_tracing();

    let dir = ScriptDir::new();
    let script = dir.sh("quick.sh", "true");
    let timeline: Timeline = Default::default();
    let catalog = Arc::new(RecordingCatalog::new(timeline.clone()));
    let runner = Runner::spawn(sh_settings(), catalog.clone());
    let mut rx = runner.subscribe();

    runner.run(RunRequest::new(8, &script)).await.unwrap();
    with_timeout(async {
        while let Some(event) = rx.recv().await {
            if let RunEvent::Finished { script_id, .. } = event {
                timeline.lock().unwrap().push(format!("finished:{script_id}"));
                break;
            }
        }
    })
    .await;

    assert_eq!(
        *timeline.lock().unwrap(),
        vec!["record:8".to_string(), "finished:8".to_string()]
    );
    assert_eq!(catalog.recorded().len(), 1);
}

#[tokio::test]
async fn spawn_failure_is_reported_and_leaves_nothing_behind() {
    init_tracing();

    let dir = ScriptDir::new();
    let script = dir.sh("never.sh", "echo unreachable");
    let (runner, catalog) = sh_runner(&[9]);
    let mut rx = runner.subscribe();

    let request = RunRequest::new(9, &script).interpreter("/definitely/not/an/interpreter");
    let err = runner.run(request).await.unwrap_err();
    assert!(matches!(err, ScriptdeckError::SpawnFailed { .. }), "got {err:?}");

    match rx.recv().await {
        Some(RunEvent::SpawnFailed { script_id, message }) => {
            assert_eq!(script_id, 9);
            assert!(message.contains("/definitely/not/an/interpreter"), "got {message}");
        }
        other => panic!("expected SpawnFailed, got {other:?}"),
    }
    assert!(rx.try_recv().is_err(), "no Started/Finished after a spawn failure");
    assert!(runner.active_runs().await.is_empty());
    assert_eq!(catalog.stats(9).unwrap().unwrap().run_count, 0);
}

#[tokio::test]
async fn kill_by_script_ends_the_whole_tree() {
    init_tracing();

    let dir = ScriptDir::new();
    // The child `sleep` shares the script's process group.
    let script = dir.sh("hang.sh", "echo ready\nsleep 30\necho never");
    let (runner, catalog) = sh_runner(&[10]);
    let mut rx = runner.subscribe();

    let run = runner.run(RunRequest::new(10, &script)).await.unwrap();
    wait_until_running(&runner, 10).await;

    let started = Instant::now();
    assert_eq!(runner.kill_by_script(10).await, 1);
    let events = with_timeout(collect_until_finished(&mut rx, &[run])).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    let (_, code, reason) = finished_of(&events, run);
    assert_eq!(code, NO_EXIT_CODE);
    assert_eq!(reason, ExitReason::Signaled(9));
    assert!(!output_text(&events, 10, false).contains("never"));
    // Killed runs still count as runs.
    assert_eq!(catalog.stats(10).unwrap().unwrap().run_count, 1);
}

#[tokio::test]
async fn terminate_by_run_leaves_sibling_runs_alone() {
    init_tracing();

    let dir = ScriptDir::new();
    let script = dir.sh("wait.sh", "sleep 30");
    let (runner, _catalog) = sh_runner(&[11]);
    let mut rx = runner.subscribe();

    let first = runner.run(RunRequest::new(11, &script)).await.unwrap();
    let second = runner.run(RunRequest::new(11, &script)).await.unwrap();

    assert_eq!(runner.terminate_by_run(first).await, 1);
    let events = with_timeout(collect_until_finished(&mut rx, &[first])).await;
    assert_eq!(finished_of(&events, first).2, ExitReason::Signaled(15));

    let active = runner.active_runs().await;
    assert_eq!(active.iter().map(|r| r.run_id).collect::<Vec<_>>(), vec![second]);

    assert_eq!(runner.kill_all().await, 1);
    with_timeout(collect_until_finished(&mut rx, &[second])).await;
    assert!(runner.active_runs().await.is_empty());
}

#[tokio::test]
async fn stopping_unknown_runs_is_a_noop() {
    init_tracing();

    let (runner, _catalog) = sh_runner(&[]);

    assert_eq!(runner.kill_by_run(12345).await, 0);
    assert_eq!(runner.terminate_by_script(77).await, 0);
    assert_eq!(runner.kill_all().await, 0);
}

#[tokio::test]
async fn unknown_script_ids_still_run_but_are_not_counted() {
    init_tracing();

    let dir = ScriptDir::new();
    let script = dir.sh("orphan.sh", "echo hi");
    let (runner, catalog) = sh_runner(&[1]);
    let mut rx = runner.subscribe();

    let run = runner.run(RunRequest::new(404, &script)).await.unwrap();
    let events = with_timeout(collect_until_finished(&mut rx, &[run])).await;

    assert_eq!(finished_of(&events, run).0, 404);
    assert!(catalog.stats(404).unwrap().is_none());
}

#[tokio::test]
async fn lingering_descendant_does_not_block_finished() {
    init_tracing();

    let dir = ScriptDir::new();
    // The background sleep keeps the output pipes open after `sh` exits.
    let script = dir.sh("bg.sh", "sleep 3 &\necho parent done");
    let (runner, _catalog) = sh_runner(&[13]);
    let mut rx = runner.subscribe();

    let started = Instant::now();
    let run = runner.run(RunRequest::new(13, &script)).await.unwrap();
    let events = with_timeout(collect_until_finished(&mut rx, &[run])).await;

    assert!(
        started.elapsed() < Duration::from_secs(2),
        "Finished waited for the descendant: {:?}",
        started.elapsed()
    );
    assert_eq!(output_text(&events, 13, false), "parent done\n");
    assert_eq!(finished_of(&events, run).1, 0);
}

#[tokio::test]
async fn dropping_the_runner_kills_remaining_runs() {
    init_tracing();

    let dir = ScriptDir::new();
    let script = dir.sh("forever.sh", "sleep 30");
    let catalog = Arc::new(MemoryCatalog::with_scripts([14]));
    let settings = RunnerSettings {
        shutdown_timeout: Duration::from_secs(3),
        ..sh_settings()
    };
    let runner = Runner::spawn(settings, catalog.clone());
    let mut rx = runner.subscribe();

    let run = runner.run(RunRequest::new(14, &script)).await.unwrap();
    drop(runner);

    let events = with_timeout(collect_until_finished(&mut rx, &[run])).await;
    assert_eq!(finished_of(&events, run).2, ExitReason::Signaled(9));
    assert_eq!(catalog.stats(14).unwrap().unwrap().run_count, 1);

    // The loop is gone once it reconciled everything.
    assert!(with_timeout(rx.recv()).await.is_none());
}

#[tokio::test]
async fn relative_script_path_runs_from_its_own_directory() {
    init_tracing();

    let dir = ScriptDir::new();
    let script = dir.sh("scripts/rel.sh", "pwd -P\necho relative ok");
    let relative = relative_to_cwd(&script);
    assert!(relative.is_relative());
    let (runner, _catalog) = sh_runner(&[15]);
    let mut rx = runner.subscribe();

    let run = runner.run(RunRequest::new(15, &relative)).await.unwrap();
    let events = with_timeout(collect_until_finished(&mut rx, &[run])).await;

    let scripts_dir = dir.path().join("scripts").canonicalize().unwrap();
    assert_eq!(
        output_text(&events, 15, false),
        format!("{}\nrelative ok\n", scripts_dir.display())
    );
    assert_eq!(output_text(&events, 15, true), "");
    assert_eq!(finished_of(&events, run).1, 0);
}

#[tokio::test]
async fn kill_by_script_spares_other_scripts() {
    init_tracing();

    let dir = ScriptDir::new();
    let hang = dir.sh("hang.sh", "sleep 30");
    let steady = dir.sh("steady.sh", "sleep 0.5\necho survived");
    let (runner, catalog) = sh_runner(&[16, 17]);
    let mut rx = runner.subscribe();

    let x1 = runner.run(RunRequest::new(16, &hang)).await.unwrap();
    let x2 = runner.run(RunRequest::new(16, &hang)).await.unwrap();
    let y = runner.run(RunRequest::new(17, &steady)).await.unwrap();

    assert_eq!(runner.kill_by_script(16).await, 2);
    let events = with_timeout(collect_until_finished(&mut rx, &[x1, x2, y])).await;

    assert_eq!(finished_of(&events, x1).2, ExitReason::Signaled(9));
    assert_eq!(finished_of(&events, x2).2, ExitReason::Signaled(9));
    assert_eq!(finished_of(&events, y), (17, 0, ExitReason::Exited));
    assert_eq!(output_text(&events, 17, false), "survived\n");
    assert_eq!(catalog.stats(16).unwrap().unwrap().run_count, 2);
    assert_eq!(catalog.stats(17).unwrap().unwrap().run_count, 1);
}

#[tokio::test]
async fn stopping_a_finished_run_is_a_noop() {
    init_tracing();

    let dir = ScriptDir::new();
    let script = dir.sh("done.sh", "echo bye");
    let (runner, _catalog) = sh_runner(&[18]);
    let mut rx = runner.subscribe();

    let run = runner.run(RunRequest::new(18, &script)).await.unwrap();
    with_timeout(collect_until_finished(&mut rx, &[run])).await;

    assert_eq!(runner.kill_by_run(run).await, 0);
    assert_eq!(runner.terminate_by_run(run).await, 0);
    assert_eq!(runner.kill_by_script(18).await, 0);

    // Give a stray event a chance to show up before checking for silence.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err(), "stopping a finished run must emit nothing");
}
