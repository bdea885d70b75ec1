//! Binary locator
//!
//! Tool servers ship as `megatool-<name>` executables next to the front-end
//! binary. Resolution order, first hit wins:
//! 1. sibling of the running `megatool` executable
//! 2. first match on `PATH`

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::BINARY_PREFIX;
use crate::error::{MegatoolError, Result};

/// Resolves tool server executables by naming convention
#[derive(Debug, Clone, Default)]
pub struct BinaryLocator {
    install_dir: Option<PathBuf>,
    search_path: Option<OsString>,
}

impl BinaryLocator {
    pub fn new(install_dir: Option<PathBuf>, search_path: Option<OsString>) -> Self {
        Self {
            install_dir,
            search_path,
        }
    }

    /// Locator rooted at the directory of the running executable and `PATH`
    pub fn from_env() -> Self {
        let install_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        Self::new(install_dir, std::env::var_os("PATH"))
    }

    /// Executable file name for a server, e.g. `megatool-calculator`
    pub fn binary_name(server: &str) -> String {
        format!("{}{}{}", BINARY_PREFIX, server, std::env::consts::EXE_SUFFIX)
    }

    /// Find the executable for `server`
    pub fn locate(&self, server: &str) -> Result<PathBuf> {
        let file_name = Self::binary_name(server);

        if let Some(dir) = &self.install_dir {
            let candidate = dir.join(&file_name);
            if is_executable(&candidate) {
                tracing::debug!("Found {} beside megatool: {:?}", file_name, candidate);
                return Ok(candidate);
            }
        }

        if let Some(path_var) = &self.search_path {
            for dir in std::env::split_paths(path_var) {
                let candidate = dir.join(&file_name);
                if is_executable(&candidate) {
                    tracing::debug!("Found {} on PATH: {:?}", file_name, candidate);
                    return Ok(candidate);
                }
            }
        }

        Err(MegatoolError::NotFound(format!(
            "Server binary '{}' not found",
            file_name
        )))
    }

    /// Names of the servers installed beside the front-end binary
    pub fn available_servers(&self) -> Vec<String> {
        let Some(dir) = &self.install_dir else {
            return Vec::new();
        };
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Cannot list {:?}: {}", dir, e);
                return Vec::new();
            }
        };

        let mut names = BTreeSet::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(server) = server_name_from_binary(file_name) {
                if is_executable(&path) {
                    names.insert(server.to_string());
                }
            }
        }
        names.into_iter().collect()
    }
}

/// Strip the `megatool-` prefix and executable suffix from a file name.
///
/// Build artifacts such as `megatool-calculator.d` are rejected.
fn server_name_from_binary(file_name: &str) -> Option<&str> {
    let rest = file_name.strip_prefix(BINARY_PREFIX)?;
    let suffix = std::env::consts::EXE_SUFFIX;
    let name = if suffix.is_empty() {
        rest
    } else {
        rest.strip_suffix(suffix)?
    };
    if name.is_empty() || name.contains('.') {
        return None;
    }
    Some(name)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match path.metadata() {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
