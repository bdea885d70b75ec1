//! Per-server configuration file
//!
//! Non-sensitive settings for a tool server live in
//! `<config dir>/<server>/config.json`, where the config dir is
//! `MEGATOOL_CONFIG_DIR` or `<user config>/megatool`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const CONFIG_DIR_ENV: &str = "MEGATOOL_CONFIG_DIR";

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone)]
pub struct ServerConfigFile {
    path: PathBuf,
}

impl ServerConfigFile {
    /// Locate the config file for `server` in the default config dir
    pub fn for_server(server: &str) -> Result<Self> {
        let root = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .context("Could not determine the user config directory")?
                .join("megatool"),
        };
        Ok(Self::in_dir(root, server))
    }

    pub fn in_dir(root: impl AsRef<Path>, server: &str) -> Self {
        Self {
            path: root.as_ref().join(server).join(CONFIG_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the settings. A missing or blank file yields `T::default()`.
    pub fn load<T: DeserializeOwned + Default>(&self) -> Result<T> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };
        if content.trim().is_empty() {
            return Ok(T::default());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", self.path.display()))
    }

    pub fn save<T: Serialize>(&self, settings: &T) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let mut json = serde_json::to_string_pretty(settings)?;
        json.push('\n');
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        tracing::debug!("Saved settings to {}", self.path.display());
        Ok(())
    }
}
