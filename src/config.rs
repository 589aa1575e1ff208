//! Configuration for lazydev.
//!
//! Process definitions come from a Procfile (or from a single command on the command
//! line). Run settings can additionally be read from an optional `lazydev.toml`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

use crate::process::ProcessConfig;

/// Procfile names looked up in the working directory, in order.
pub const PROCFILE_CANDIDATES: [&str; 3] = ["Procfile", "procfile", "Procfile.dev"];

/// Settings file looked up in the working directory.
pub const SETTINGS_FILE: &str = "lazydev.toml";

/// Fatal problems with the process definitions.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no Procfile found and no command given (looked for {})", PROCFILE_CANDIDATES.join(", "))]
    NoProcesses,
    #[error("{} defines no processes", .0.display())]
    EmptyProcfile(PathBuf),
    #[error("duplicate process name: {0}")]
    DuplicateName(String),
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Optional `lazydev.toml` contents. Every key may be omitted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Procfile to use instead of discovery.
    pub procfile: Option<PathBuf>,
    /// Pause between kill and respawn on restart.
    pub restart_delay_ms: Option<u64>,
    /// How long to wait for children after SIGTERM before SIGKILL.
    pub shutdown_grace_ms: Option<u64>,
    /// Where to write diagnostics.
    pub log_file: Option<PathBuf>,
    /// Whether to use Unicode status symbols (default: true).
    pub symbols: Option<bool>,
}

/// Loads and parses the settings file at `path`.
pub fn load_settings(path: &Path) -> Result<Settings> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let settings: Settings = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(settings)
}

/// `lazydev.toml` in `dir`, if present.
pub fn default_settings_path(dir: &Path) -> Option<PathBuf> {
    let path = dir.join(SETTINGS_FILE);
    path.is_file().then_some(path)
}

/// First Procfile candidate present in `dir`.
pub fn find_procfile(dir: &Path) -> Option<PathBuf> {
    PROCFILE_CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Parses Procfile text: one `name: command` per line.
///
/// Blank lines and `#` comments are ignored. The first colon separates name from
/// command and both sides are trimmed. Lines without a colon, or with an empty
/// name or command, are skipped.
pub fn parse_procfile(text: &str) -> Vec<ProcessConfig> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let (name, command) = line.split_once(':')?;
            let (name, command) = (name.trim(), command.trim());
            if name.is_empty() || command.is_empty() {
                return None;
            }
            Some(ProcessConfig::new(name, command))
        })
        .collect()
}

/// Reads and parses the Procfile at `path`; zero definitions is an error.
pub fn load_procfile(path: &Path) -> Result<Vec<ProcessConfig>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let configs = parse_procfile(&text);
    if configs.is_empty() {
        return Err(ConfigError::EmptyProcfile(path.to_path_buf()));
    }
    ensure_unique_names(&configs)?;
    Ok(configs)
}

pub fn ensure_unique_names(configs: &[ProcessConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for config in configs {
        if !seen.insert(config.name.as_str()) {
            return Err(ConfigError::DuplicateName(config.name.clone()));
        }
    }
    Ok(())
}
