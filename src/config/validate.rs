use std::collections::HashSet;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, ScriptdeckError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::ScriptdeckError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.runner, raw.venv, raw.scripts))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_scripts(cfg)?;
    validate_runner(cfg)?;
    validate_identities(cfg)?;
    validate_interpreters(cfg)?;
    validate_folders(cfg)?;
    Ok(())
}

fn config_error(msg: String) -> ScriptdeckError {
    ScriptdeckError::ConfigError(msg)
}

fn ensure_has_scripts(cfg: &RawConfigFile) -> Result<()> {
    if cfg.scripts.is_empty() {
        return Err(config_error(
            "config must contain at least one [[script]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_runner(cfg: &RawConfigFile) -> Result<()> {
    if cfg.runner.output_drain_timeout_ms == 0 {
        return Err(config_error(
            "[runner].output_drain_timeout_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.runner.shutdown_timeout_ms == 0 {
        return Err(config_error(
            "[runner].shutdown_timeout_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    if let Some(ref interp) = cfg.runner.default_interpreter {
        if interp.trim().is_empty() {
            return Err(config_error(
                "[runner].default_interpreter must not be empty".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_identities(cfg: &RawConfigFile) -> Result<()> {
    let mut ids = HashSet::new();
    let mut names = HashSet::new();
    let mut paths = HashSet::new();

    for script in cfg.scripts.iter() {
        if script.id < 0 {
            return Err(config_error(format!(
                "script id must be non-negative (got {})",
                script.id
            )));
        }
        if !ids.insert(script.id) {
            return Err(config_error(format!("duplicate script id {}", script.id)));
        }
        if script.path.trim().is_empty() {
            return Err(config_error(format!(
                "script {} has an empty `path`",
                script.id
            )));
        }
        if !paths.insert(script.path.as_str()) {
            return Err(config_error(format!(
                "script {} reuses path '{}'",
                script.id, script.path
            )));
        }
        let name = script.display_name();
        if !names.insert(name) {
            return Err(config_error(format!(
                "script {} reuses name '{}'",
                script.id, name
            )));
        }
    }
    Ok(())
}

fn validate_interpreters(cfg: &RawConfigFile) -> Result<()> {
    for script in cfg.scripts.iter() {
        match (&script.interpreter, &script.venv) {
            (Some(_), Some(_)) => {
                return Err(config_error(format!(
                    "script '{}' sets both `interpreter` and `venv`",
                    script.display_name()
                )));
            }
            (None, Some(venv)) if !cfg.venv.contains_key(venv) => {
                return Err(config_error(format!(
                    "script '{}' references unknown venv '{}'",
                    script.display_name(),
                    venv
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

fn validate_folders(cfg: &RawConfigFile) -> Result<()> {
    for script in cfg.scripts.iter() {
        if let Some(ref folder) = script.folder {
            if folder.trim_matches('/').split('/').any(|seg| seg.trim().is_empty()) {
                return Err(config_error(format!(
                    "script '{}' has an invalid folder '{}'",
                    script.display_name(),
                    folder
                )));
            }
        }
    }
    Ok(())
}
