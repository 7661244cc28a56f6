// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

//! The declarative config file the daemon harness reads at startup: a thin,
//! non-Turing-complete stand-in for the original's dynamic-module loader (explicitly
//! out of scope, see SPEC_FULL.md §1/§6). Names which filesystem paths to watch, which
//! timers to run, and which commands to supervise — nothing more.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ConfigError, Error, Result};
use crate::topic::WatchMask;

/// Top-level config file schema.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub watches: Vec<WatchConfig>,
    #[serde(default)]
    pub timers: Vec<TimerConfig>,
    #[serde(default)]
    pub commands: Vec<CommandConfig>,
}

/// One filesystem path to watch, and a shell command to run whenever it changes.
#[derive(Debug, Deserialize)]
pub struct WatchConfig {
    pub path: PathBuf,
    #[serde(default = "WatchMaskConfig::all")]
    pub mask: WatchMaskConfig,
    pub command: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WatchMaskConfig {
    #[serde(default)]
    pub create: bool,
    #[serde(default)]
    pub modify: bool,
    #[serde(default)]
    pub remove: bool,
}

impl WatchMaskConfig {
    fn all() -> Self { Self { create: true, modify: true, remove: true } }
}

impl From<WatchMaskConfig> for WatchMask {
    fn from(mask: WatchMaskConfig) -> Self {
        Self { create: mask.create, modify: mask.modify, remove: mask.remove }
    }
}

/// A `(early, late)` wake schedule, and a shell command to run on every tick.
#[derive(Debug, Deserialize)]
pub struct TimerConfig {
    pub early_ms: u64,
    pub late_ms: u64,
    pub command: String,
}

/// A supervised command whose stdout lines are logged, with an optional restart
/// policy for when it exits.
#[derive(Debug, Deserialize)]
pub struct CommandConfig {
    pub cmd: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub restart: bool,
    #[serde(default)]
    pub max_restarts: Option<u32>,
    #[serde(default)]
    pub start_limit_interval_secs: Option<u64>,
}

impl Config {
    /// `~/.config/brokerd/config.json`, the default path searched when `--config` is
    /// not given.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs_next_home().map(|home| home.join(".config/brokerd/config.json"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| Error::Config { path: path.to_path_buf(), source: ConfigError::Read(source) })?;
        serde_json::from_str(&text)
            .map_err(|source| Error::Config { path: path.to_path_buf(), source: ConfigError::Parse(source) })
    }
}

fn dirs_next_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_config() {
        let json = r#"{
            "watches": [{"path": "/tmp/x", "command": "echo hi"}],
            "timers": [{"early_ms": 100, "late_ms": 200, "command": "echo tick"}],
            "commands": [{"cmd": "tail", "args": ["-f", "/tmp/log"], "restart": true}]
        }"#;
        let config: Config = serde_json::from_str(json).expect("valid config");
        assert_eq!(config.watches.len(), 1);
        assert!(config.watches[0].mask.create);
        assert_eq!(config.timers[0].early_ms, 100);
        assert!(config.commands[0].restart);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = Config::load(Path::new("/nonexistent/brokerd.json")).unwrap_err();
        assert!(matches!(err, Error::Config { source: ConfigError::Read(_), .. }));
    }
}
