//! Configuration loading
//!
//! Resolves every on-disk location the supervisor touches. A [`Paths`] value
//! is built once per command and handed to the components that need it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MegatoolError, Result};

/// Environment override for the log root
pub const LOG_DIR_ENV: &str = "MEGATOOL_LOG_DIR";

/// Environment override for the config directory
pub const CONFIG_DIR_ENV: &str = "MEGATOOL_CONFIG_DIR";

/// Prefix shared by every tool server executable
pub const BINARY_PREFIX: &str = "megatool-";

const REGISTRY_FILE: &str = "running-servers.json";

/// Filesystem locations used by the supervisor
#[derive(Debug, Clone)]
pub struct Paths {
    /// `<home>/.megatool/logs`
    pub log_root: PathBuf,
    /// `<config dir>/megatool`
    pub config_dir: PathBuf,
}

impl Paths {
    pub fn new(log_root: impl Into<PathBuf>, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_root: log_root.into(),
            config_dir: config_dir.into(),
        }
    }

    /// Resolve locations from the environment.
    ///
    /// Search order for each location:
    /// 1. `MEGATOOL_LOG_DIR` / `MEGATOOL_CONFIG_DIR`
    /// 2. `~/.megatool/logs` / `<platform config dir>/megatool`
    pub fn from_env() -> Result<Self> {
        let log_root = match std::env::var_os(LOG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .ok_or_else(|| {
                    MegatoolError::NotFound("Could not determine home directory".to_string())
                })?
                .join(".megatool")
                .join("logs"),
        };

        let config_dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .ok_or_else(|| {
                    MegatoolError::NotFound("Could not determine config directory".to_string())
                })?
                .join("megatool"),
        };

        Ok(Self::new(log_root, config_dir))
    }

    /// `<config dir>/running-servers.json`
    pub fn registry_file(&self) -> PathBuf {
        self.config_dir.join(REGISTRY_FILE)
    }

    /// `<log root>/<server>`
    pub fn server_log_dir(&self, server: &str) -> PathBuf {
        self.log_root.join(server)
    }
}

/// Rotation and retention settings for server log files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogPolicy {
    /// Rotate once the active file would exceed this many bytes
    pub max_size: u64,
    /// Rotated segments kept per pid
    pub max_backups: usize,
    /// Rotated segments older than this are deleted
    pub max_age: Duration,
    /// Gzip rotated segments
    pub compress: bool,
}

impl Default for LogPolicy {
    fn default() -> Self {
        Self {
            max_size: 10 * 1024 * 1024,
            max_backups: 5,
            max_age: Duration::from_secs(30 * 24 * 60 * 60),
            compress: true,
        }
    }
}

/// Create a directory tree with mode 0755
pub fn create_dir_0755(path: &Path) -> std::io::Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder.create(path)
}
