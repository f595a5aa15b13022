#![allow(dead_code)]

use std::collections::BTreeMap;

use scriptdeck::config::{ConfigFile, RawConfigFile, RunnerSection, ScriptConfig, VenvConfig};
use scriptdeck::errors::ScriptdeckError;
use scriptdeck::types::{ScriptId, StatsStorageMode};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                runner: RunnerSection::default(),
                venv: BTreeMap::new(),
                scripts: Vec::new(),
            },
        }
    }

    pub fn with_script(mut self, script: ScriptConfig) -> Self {
        self.config.scripts.push(script);
        self
    }

    pub fn with_venv(mut self, name: &str, python: &str) -> Self {
        self.config.venv.insert(
            name.to_string(),
            VenvConfig {
                python: python.to_string(),
            },
        );
        self
    }

    pub fn default_interpreter(mut self, interpreter: &str) -> Self {
        self.config.runner.default_interpreter = Some(interpreter.to_string());
        self
    }

    pub fn stats_storage_mode(mut self, mode: StatsStorageMode) -> Self {
        self.config.runner.stats_storage_mode = mode;
        self
    }

    pub fn output_drain_timeout_ms(mut self, ms: u64) -> Self {
        self.config.runner.output_drain_timeout_ms = ms;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile, ScriptdeckError> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ScriptConfig`.
pub struct ScriptConfigBuilder {
    script: ScriptConfig,
}

impl ScriptConfigBuilder {
    pub fn new(id: ScriptId, path: &str) -> Self {
        Self {
            script: ScriptConfig {
                id,
                name: None,
                path: path.to_string(),
                args: vec![],
                interpreter: None,
                venv: None,
                working_dir: None,
                folder: None,
                tags: vec![],
                description: None,
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.script.name = Some(name.to_string());
        self
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.script.args.push(arg.to_string());
        self
    }

    pub fn interpreter(mut self, interpreter: &str) -> Self {
        self.script.interpreter = Some(interpreter.to_string());
        self
    }

    pub fn venv(mut self, venv: &str) -> Self {
        self.script.venv = Some(venv.to_string());
        self
    }

    pub fn working_dir(mut self, dir: &str) -> Self {
        self.script.working_dir = Some(dir.to_string());
        self
    }

    pub fn folder(mut self, folder: &str) -> Self {
        self.script.folder = Some(folder.to_string());
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.script.tags.push(tag.to_string());
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.script.description = Some(description.to_string());
        self
    }

    pub fn build(self) -> ScriptConfig {
        self.script
    }
}
