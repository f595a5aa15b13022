// src/config/model.rs

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::types::{ScriptId, StatsStorageMode};

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [runner]
/// default_interpreter = "python3"
///
/// [venv.tools]
/// python = "/home/me/.venvs/tools/bin/python"
///
/// [[script]]
/// id = 1
/// path = "scripts/hello.py"
/// venv = "tools"
/// ```
///
/// All sections are optional at the TOML level; validation requires at least
/// one script.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    /// Process runner behaviour from `[runner]`.
    #[serde(default)]
    pub runner: RunnerSection,

    /// Named interpreters from `[venv.<name>]`.
    #[serde(default)]
    pub venv: BTreeMap<String, VenvConfig>,

    /// All scripts from `[[script]]`.
    #[serde(default, rename = "script")]
    pub scripts: Vec<ScriptConfig>,
}

/// A validated configuration. Only obtainable through
/// `ConfigFile::try_from(RawConfigFile)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub runner: RunnerSection,
    pub venv: BTreeMap<String, VenvConfig>,
    pub scripts: Vec<ScriptConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        runner: RunnerSection,
        venv: BTreeMap<String, VenvConfig>,
        scripts: Vec<ScriptConfig>,
    ) -> Self {
        Self {
            runner,
            venv,
            scripts,
        }
    }

    pub fn script_by_id(&self, id: ScriptId) -> Option<&ScriptConfig> {
        self.scripts.iter().find(|s| s.id == id)
    }

    /// Look a script up by id (if `selector` parses as one) or by name.
    pub fn find_script(&self, selector: &str) -> Option<&ScriptConfig> {
        if let Ok(id) = selector.trim().parse::<ScriptId>() {
            if let Some(script) = self.script_by_id(id) {
                return Some(script);
            }
        }
        self.scripts.iter().find(|s| s.display_name() == selector)
    }

    /// Scripts whose folder is `folder` or lies below it.
    pub fn scripts_in_folder(&self, folder: &str) -> Vec<&ScriptConfig> {
        self.scripts.iter().filter(|s| s.in_folder(folder)).collect()
    }

    /// Resolve the interpreter configured for a script (`interpreter` or the
    /// python of its `venv`), if any.
    pub fn interpreter_for(&self, script: &ScriptConfig) -> Option<String> {
        if let Some(ref interp) = script.interpreter {
            return Some(interp.clone());
        }
        script
            .venv
            .as_ref()
            .and_then(|name| self.venv.get(name))
            .map(|v| v.python.clone())
    }
}

/// `[runner]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerSection {
    /// Interpreter used for scripts that don't configure one. When unset the
    /// script file is executed directly.
    #[serde(default)]
    pub default_interpreter: Option<String>,

    /// Extra environment variables for every launched script. These are
    /// layered over the unbuffered-output defaults.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// `"file"` (default) or `"memory"`.
    #[serde(default)]
    pub stats_storage_mode: StatsStorageMode,

    /// How long to keep reading output after a process exits.
    #[serde(default = "default_output_drain_timeout_ms")]
    pub output_drain_timeout_ms: u64,

    /// How long shutdown waits for killed runs to report their exit.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_output_drain_timeout_ms() -> u64 {
    500
}

fn default_shutdown_timeout_ms() -> u64 {
    5_000
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            default_interpreter: None,
            env: BTreeMap::new(),
            stats_storage_mode: StatsStorageMode::default(),
            output_drain_timeout_ms: default_output_drain_timeout_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

/// `[venv.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct VenvConfig {
    /// Interpreter inside the environment, e.g. `.venv/bin/python`.
    pub python: String,
}

/// One `[[script]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptConfig {
    pub id: ScriptId,

    /// Display name; defaults to the file name of `path`.
    #[serde(default)]
    pub name: Option<String>,

    /// Script location, relative paths resolve against the config directory.
    pub path: String,

    /// Stored command-line options, passed verbatim.
    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub interpreter: Option<String>,

    /// Name of a `[venv.<name>]` entry whose python runs this script.
    #[serde(default)]
    pub venv: Option<String>,

    #[serde(default)]
    pub working_dir: Option<String>,

    /// `/`-separated folder path, e.g. `"utils/net"`.
    #[serde(default)]
    pub folder: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub description: Option<String>,
}

impl ScriptConfig {
    pub fn display_name(&self) -> &str {
        if let Some(ref name) = self.name {
            return name;
        }
        Path::new(&self.path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.path)
    }

    pub fn in_folder(&self, folder: &str) -> bool {
        let wanted = folder.trim_matches('/');
        match self.folder.as_deref().map(|f| f.trim_matches('/')) {
            Some(own) => {
                own == wanted
                    || (own.starts_with(wanted) && own[wanted.len()..].starts_with('/'))
            }
            None => false,
        }
    }
}
