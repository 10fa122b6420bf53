//! Optional config file loading. Search order: ./lnbind.toml, then
//! $XDG_CONFIG_HOME/lnbind/config.toml (or ~/.config/lnbind/config.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

const LOCAL_FILE: &str = "lnbind.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot determine current directory: {0}")]
    CurrentDir(#[source] std::io::Error),

    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default, deny_unknown_fields)]
pub struct Config {
    /// Directory finished books are written to. Paths are relative to CWD.
    pub output_dir: Option<PathBuf>,
    /// Parent of the temporary EPUB build directories.
    pub scratch_dir: Option<PathBuf>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Minimum spacing between request starts, in milliseconds.
    pub request_delay_ms: Option<u64>,
    /// Concurrent chapter downloads per novel.
    pub workers: Option<usize>,
    /// Attempts per chapter for transient failures.
    pub retry_count: Option<u32>,
    /// Delay in seconds before each retry (e.g. [1, 2]).
    pub retry_backoff_secs: Option<Vec<u64>>,
}

/// First config file found in the search order. Missing files give `Ok(None)`;
/// a present file that cannot be read or parsed is an error.
pub fn load_config() -> Result<Option<Config>, ConfigError> {
    let cwd = std::env::current_dir().map_err(ConfigError::CurrentDir)?;
    let mut paths = vec![cwd.join(LOCAL_FILE)];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("lnbind").join("config.toml"));
    }
    load_first(&paths)
}

fn load_first(paths: &[PathBuf]) -> Result<Option<Config>, ConfigError> {
    for path in paths {
        if path.exists() {
            let config = load_file(path)?;
            tracing::debug!(path = %path.display(), "Loaded config");
            return Ok(Some(config));
        }
    }
    Ok(None)
}

pub fn load_file(path: &Path) -> Result<Config, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    toml::from_str(&s).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}
