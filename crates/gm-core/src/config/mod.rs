//! Configuration management for gmash

mod gmash;
pub mod serde_utils;
mod tunnel;

pub use gmash::GmashConfig;
pub use tunnel::TunnelConfig;

use crate::error::ConfigError;
use std::io;
use std::path::{Path, PathBuf};

/// Get the default configuration directory (`~/.gmash`)
pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".gmash")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load configuration from a file
///
/// A missing file is [`ConfigError::NotFound`].
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Err(e) => return Err(ConfigError::io("read", path, e)),
    };

    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load configuration from a file, falling back to defaults when it is absent
pub fn load_config_or_default<T>(path: &Path) -> Result<T, ConfigError>
where
    T: serde::de::DeserializeOwned + Default,
{
    match load_config(path) {
        Err(ConfigError::NotFound(_)) => {
            tracing::debug!("No config at {:?}, using defaults", path);
            Ok(T::default())
        }
        other => other,
    }
}

/// Save configuration to a file
///
/// The file is written under a temporary name and renamed into place, so a
/// failed save leaves any previous config intact.
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let rendered = toml::to_string_pretty(config)?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| ConfigError::io("create", dir, e))?;

    let staging = path.with_extension("toml.tmp");
    std::fs::write(&staging, rendered).map_err(|e| ConfigError::io("write", &staging, e))?;
    std::fs::rename(&staging, path).map_err(|e| ConfigError::io("replace", path, e))
}
