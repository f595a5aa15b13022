// tests/cli_args.rs
use clap::Parser;

use scriptdeck::cli::{CliArgs, LogLevel};

#[test]
fn defaults_when_only_scripts_are_named() {
    let args = CliArgs::try_parse_from(["scriptdeck", "1", "backup"]).unwrap();

    assert_eq!(args.config, "Scriptdeck.toml");
    assert_eq!(args.scripts, vec!["1", "backup"]);
    assert!(args.folder.is_empty());
    assert!(!args.list && !args.dry_run);
    assert!(args.log_level.is_none());
    assert!(args.extra_args.is_empty());
}

#[test]
fn trailing_args_after_double_dash_are_kept_verbatim() {
    let args = CliArgs::try_parse_from([
        "scriptdeck",
        "--config",
        "decks/tools.toml",
        "--folder",
        "utils",
        "--folder",
        "net",
        "--interpreter",
        "pypy3",
        "--cwd",
        "/tmp",
        "--log-level",
        "debug",
        "ping",
        "--",
        "--count",
        "3 packets",
    ])
    .unwrap();

    assert_eq!(args.config, "decks/tools.toml");
    assert_eq!(args.folder, vec!["utils", "net"]);
    assert_eq!(args.interpreter.as_deref(), Some("pypy3"));
    assert_eq!(args.cwd.as_deref(), Some("/tmp"));
    assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    assert_eq!(args.scripts, vec!["ping"]);
    assert_eq!(args.extra_args, vec!["--count", "3 packets"]);
}

#[test]
fn unknown_log_level_is_rejected() {
    assert!(CliArgs::try_parse_from(["scriptdeck", "--log-level", "loud"]).is_err());
}
