// src/lib.rs

pub mod catalog;
pub mod cli;
pub mod config;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod runner;
pub mod session;
pub mod types;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::catalog::{catalog_for_config, CatalogStore};
use crate::cli::CliArgs;
use crate::config::{config_root_dir, load_and_validate, ConfigFile};
use crate::runner::{LaunchSpec, Runner, RunnerSettings};
use crate::session::{build_launch, run_session, select_scripts, Console, Launch, LaunchOverrides};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - catalog loading
/// - run statistics storage
/// - the process runner
/// - Ctrl-C handling
///
/// Returns `Ok(true)` when every launched script started and exited with
/// code 0.
pub async fn run(args: CliArgs) -> Result<bool> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;
    let root = config_root_dir(&config_path);
    debug!(root = %root.display(), scripts = cfg.scripts.len(), "catalog loaded");

    let catalog = catalog_for_config(&cfg, &root);

    if args.list {
        print_catalog(&cfg, catalog.as_ref());
        return Ok(true);
    }

    let selected = select_scripts(&cfg, &args.scripts, &args.folder)?;
    let overrides = LaunchOverrides {
        interpreter: args.interpreter.clone(),
        working_dir: args.cwd.clone(),
        extra_args: args.extra_args.clone(),
    };
    let launches: Vec<Launch> = selected
        .into_iter()
        .map(|script| build_launch(&cfg, &root, script, &overrides))
        .collect();

    let settings = RunnerSettings::from_config(&cfg.runner);

    if args.dry_run {
        print_dry_run(&launches, &settings);
        return Ok(true);
    }

    let runner = Runner::spawn(settings, catalog);
    info!(count = launches.len(), "launching scripts");

    // Ctrl-C → kill everything still running.
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    let mut console = Console::new(std::io::stdout(), std::io::stderr());
    let summary = run_session(&runner, launches, &mut console, shutdown).await?;

    Ok(summary.all_succeeded())
}

/// Print the catalog grouped by folder, with run statistics.
fn print_catalog(cfg: &ConfigFile, catalog: &dyn CatalogStore) {
    let mut by_folder: BTreeMap<&str, Vec<&config::ScriptConfig>> = BTreeMap::new();
    for script in cfg.scripts.iter() {
        let folder = script.folder.as_deref().unwrap_or("");
        by_folder.entry(folder).or_default().push(script);
    }

    for (folder, scripts) in by_folder {
        if folder.is_empty() {
            println!("(no folder)");
        } else {
            println!("{folder}/");
        }
        for script in scripts {
            let stats = match catalog.stats(script.id) {
                Ok(Some(stats)) => format!(
                    "runs={} last={}",
                    stats.run_count,
                    stats.last_run.as_deref().unwrap_or("never")
                ),
                Ok(None) => "runs=0 last=never".to_string(),
                Err(e) => {
                    warn!(script_id = script.id, error = %e, "failed to read run stats");
                    "runs=? last=?".to_string()
                }
            };
            println!(
                "  #{:<4} {:<24} {}  {}",
                script.id,
                script.display_name(),
                stats,
                script.path
            );
            if let Some(ref desc) = script.description {
                println!("        {desc}");
            }
            if !script.tags.is_empty() {
                println!("        tags: {}", script.tags.join(", "));
            }
        }
    }
}

/// Print what would be launched, without launching.
fn print_dry_run(launches: &[Launch], settings: &RunnerSettings) {
    println!("scriptdeck dry-run");
    println!(
        "  default_interpreter = {}",
        settings.default_interpreter.as_deref().unwrap_or("(none)")
    );
    println!();

    for launch in launches {
        let spec = LaunchSpec::resolve(&launch.request, settings);
        println!("  - [{}] #{}", launch.name, launch.request.script_id);
        println!("      cmd: {}", spec.command_line);
        if !exists_or_unknown(&launch.request.script_path) {
            println!("      warning: script file not found");
        }
    }

    debug!("dry-run complete (no execution)");
}

fn exists_or_unknown(path: &Path) -> bool {
    path.try_exists().unwrap_or(true)
}
