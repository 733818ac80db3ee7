//! Configuration file I/O
//!
//! YAML persistence for [`super::Config`] and its sections.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Default config file path
///
/// Returns: `~/.config/acappella/config.yaml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("acappella")
        .join("config.yaml")
}

/// Read a pipeline configuration.
///
/// A missing file means "run with defaults". An unreadable or malformed file
/// is logged and replaced by defaults.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("load_config: No config at {:?}, running with defaults", path);
            return T::default();
        }
        Err(e) => {
            log::warn!("load_config: Cannot read {:?} ({}), running with defaults", path, e);
            return T::default();
        }
    };

    serde_yaml::from_str::<T>(&contents).unwrap_or_else(|e| {
        log::warn!("load_config: {:?} is not a valid config ({}), running with defaults", path, e);
        T::default()
    })
}

/// Write a configuration as YAML, creating the directory it lives in
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }
    std::fs::write(path, yaml).with_context(|| format!("Failed to write config to {:?}", path))?;

    log::info!("save_config: Wrote {:?}", path);
    Ok(())
}
