//! Runtime configuration.
//!
//! Resolution order for the file: explicit path, then `CAPSULE_CONFIG_PATH`,
//! then `<config dir>/capsule/runtime.yaml`. A missing file yields defaults.
//! `CAPSULE_ASSETS_DIR` and `CAPSULE_LOG` override the corresponding keys
//! after the file is read.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
};

use capsule_types::Capability;
use dirs_next::config_dir;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::expand_tilde;

/// Environment variable overriding the configuration file path.
pub const CONFIG_PATH_ENV: &str = "CAPSULE_CONFIG_PATH";
/// Environment variable overriding `assets_dir`.
pub const ASSETS_DIR_ENV: &str = "CAPSULE_ASSETS_DIR";
/// Environment variable overriding `log_filter`.
pub const LOG_FILTER_ENV: &str = "CAPSULE_LOG";

pub const CONFIG_FILE_NAME: &str = "runtime.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed config '{}': {message}", path.display())]
    Malformed { path: PathBuf, message: String },
}

/// How one drain batch executes its operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainMode {
    #[default]
    Sequential,
    Concurrent,
}

/// Resource limits applied to the embedded script engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptLimits {
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_expr_depth: usize,
    pub max_string_size: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_operations: 1_000_000,
            max_call_levels: 32,
            max_expr_depth: 64,
            max_string_size: 1 << 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub assets_dir: Option<PathBuf>,
    pub log_filter: String,
    /// Capabilities granted to the widget registry.
    pub capabilities: Vec<Capability>,
    pub drain_mode: DrainMode,
    pub log_buffer_capacity: usize,
    pub script: ScriptLimits,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            assets_dir: None,
            log_filter: "info".to_string(),
            capabilities: Vec::new(),
            drain_mode: DrainMode::default(),
            log_buffer_capacity: 500,
            script: ScriptLimits::default(),
        }
    }
}

impl RuntimeConfig {
    /// Loads from the default location, then applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Loads from `explicit` when given, otherwise from the default location.
    pub fn load_from(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit.map(Path::to_path_buf).unwrap_or_else(default_config_path);
        let mut config = Self::from_path(&path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Reads one file without consulting the environment.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no runtime config found; using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let parsed = if has_extension(path, "json") {
            serde_json::from_str(&content).map_err(|error| error.to_string())
        } else {
            serde_yaml::from_str(&content).map_err(|error| error.to_string())
        };
        parsed.map_err(|message| ConfigError::Malformed {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = env::var(ASSETS_DIR_ENV)
            && !dir.trim().is_empty()
        {
            self.assets_dir = Some(expand_tilde(&dir));
        }
        if let Ok(filter) = env::var(LOG_FILTER_ENV)
            && !filter.trim().is_empty()
        {
            self.log_filter = filter.trim().to_string();
        }
    }
}

/// Default location of the runtime configuration file.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("capsule")
        .join(CONFIG_FILE_NAME)
}

fn has_extension(path: &Path, expected: &str) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case(expected))
}
