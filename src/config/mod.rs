pub mod schema;

pub use schema::ColonyConfig;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Default colony home directory (~/.colony).
pub fn default_home_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".colony"))
        .unwrap_or_else(|| PathBuf::from(".colony"))
}

/// Default config file path (~/.colony/colony.toml).
pub fn default_config_path() -> PathBuf {
    default_home_dir().join("colony.toml")
}

/// Load config from the given path, or return defaults.
pub fn load_config(path: &Path) -> Result<ColonyConfig> {
    if path.exists() {
        let contents = std::fs::read_to_string(path).context("Failed to read colony config file")?;
        let config: ColonyConfig =
            toml::from_str(&contents).context("Failed to parse colony config (TOML)")?;
        Ok(config)
    } else {
        Ok(ColonyConfig::default())
    }
}

/// Save config to the given path (TOML format).
pub fn save_config(config: &ColonyConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents).context("Failed to write config file")?;
    Ok(())
}
