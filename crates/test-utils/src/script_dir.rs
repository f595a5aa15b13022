use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A temporary directory holding test scripts and catalogs.
///
/// Removed when dropped.
pub struct ScriptDir {
    dir: TempDir,
}

impl ScriptDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `body` to `name` (relative to the directory) and return its
    /// absolute path. Parent directories are created as needed.
    pub fn write(&self, name: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create script parent dir");
        }
        fs::write(&path, body).expect("write script");
        path
    }

    /// Write a `sh` script; run it with interpreter `sh`.
    pub fn sh(&self, name: &str, body: &str) -> PathBuf {
        self.write(name, &format!("#!/bin/sh\n{body}\n"))
    }

    /// Write `Scriptdeck.toml` and return its path.
    pub fn config(&self, toml: &str) -> PathBuf {
        self.write("Scriptdeck.toml", toml)
    }
}

impl Default for ScriptDir {
    fn default() -> Self {
        Self::new()
    }
}
