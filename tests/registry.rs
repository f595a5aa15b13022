// tests/registry.rs
mod common;
use crate::common::init_tracing;

use scriptdeck::runner::Registry;

#[test]
fn run_ids_start_at_one_and_increase() {
    init_tracing();

    let mut reg: Registry<()> = Registry::new();
    let a = reg.allocate_run_id();
    let b = reg.allocate_run_id();
    let c = reg.allocate_run_id();

    assert_eq!(a, 1);
    assert!(a < b && b < c);
}

#[test]
fn several_runs_of_one_script_are_tracked_independently() {
    init_tracing();

    let mut reg: Registry<&'static str> = Registry::new();
    let r1 = reg.allocate_run_id();
    let r2 = reg.allocate_run_id();
    let r3 = reg.allocate_run_id();
    reg.insert(r1, 7, "first");
    reg.insert(r2, 7, "second");
    reg.insert(r3, 9, "other");

    assert_eq!(reg.len(), 3);
    assert_eq!(reg.runs_of_script(7), vec![r1, r2]);
    assert_eq!(reg.script_of(r3), Some(9));
    assert!(reg.is_running(7));

    let removed = reg.remove(r1).expect("r1 is registered");
    assert_eq!(removed.script_id, 7);
    assert_eq!(removed.handle, "first");

    // The other run of script 7 is unaffected.
    assert!(reg.is_running(7));
    assert_eq!(reg.runs_of_script(7), vec![r2]);

    reg.remove(r2);
    assert!(!reg.is_running(7));
    assert_eq!(reg.run_ids(), vec![r3]);
}

#[test]
fn removing_an_unknown_run_is_a_noop() {
    init_tracing();

    let mut reg: Registry<()> = Registry::new();
    let r = reg.allocate_run_id();
    reg.insert(r, 1, ());

    assert!(reg.remove(r + 100).is_none());
    assert_eq!(reg.len(), 1);
    assert!(reg.remove(r).is_some());
    assert!(reg.remove(r).is_none());
    assert!(reg.is_empty());
}

#[test]
fn unknown_lookups_return_nothing() {
    let reg: Registry<()> = Registry::new();

    assert_eq!(reg.script_of(42), None);
    assert!(reg.get(42).is_none());
    assert!(reg.runs_of_script(1).is_empty());
    assert!(!reg.is_running(1));
}
