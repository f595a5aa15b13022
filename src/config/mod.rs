// src/config/mod.rs

//! Script catalog configuration for scriptdeck.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate catalog invariants like unique ids (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{config_root_dir, load_and_validate, load_from_path};
pub use model::{ConfigFile, RawConfigFile, RunnerSection, ScriptConfig, VenvConfig};
