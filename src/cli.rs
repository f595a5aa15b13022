// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `scriptdeck`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "scriptdeck",
    version,
    about = "Run cataloged scripts concurrently and stream their output.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the script catalog (TOML).
    #[arg(long, value_name = "PATH", default_value = "Scriptdeck.toml")]
    pub config: String,

    /// Scripts to run, by id or by name.
    #[arg(value_name = "SCRIPT")]
    pub scripts: Vec<String>,

    /// Also run every script in this folder (and its subfolders).
    #[arg(long, value_name = "FOLDER")]
    pub folder: Vec<String>,

    /// Interpreter to use for every selected script, overriding the catalog.
    #[arg(long, value_name = "PROGRAM")]
    pub interpreter: Option<String>,

    /// Working directory for every selected script, overriding the catalog.
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<String>,

    /// Print the catalog with run statistics and exit.
    #[arg(long)]
    pub list: bool,

    /// Resolve and print the command lines, but don't launch anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SCRIPTDECK_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Extra arguments appended to every launched script (after `--`).
    #[arg(last = true, value_name = "ARGS")]
    pub extra_args: Vec<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
