//! Ambient plumbing shared by the Capsule runtime crates: runtime
//! configuration, tracing setup with the script log buffer, and asset
//! document loading.

pub mod assets;
pub mod config;
pub mod logging;

use std::path::PathBuf;

use dirs_next::home_dir;

pub use assets::{AssetBundle, AssetKind, LoadError, ScriptSource, load_asset_dir};
pub use config::{ConfigError, DrainMode, RuntimeConfig, ScriptLimits};
pub use logging::{LogLevel, LogRecord, LogRingBuffer, init_tracing};

/// Expands a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let trimmed = path.trim();
    let home = || home_dir().unwrap_or_else(|| PathBuf::from("~"));
    if trimmed == "~" {
        return home();
    }
    if let Some(rest) = trimmed.strip_prefix("~/").or_else(|| trimmed.strip_prefix("~\\")) {
        return home().join(rest);
    }
    PathBuf::from(trimmed)
}
