//! Registry of running server processes
//!
//! Persisted as `{ "servers": [ServerRecord, ...] }` under the config
//! directory and reopened by every command. Concurrent invocations race with
//! last-writer-wins semantics; [`Registry::cleanup_stale`] is idempotent so a
//! lost update heals on the next read-modify-write.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::create_dir_0755;
use crate::error::{IoResultExt, MegatoolError, Result};
use crate::process::ProcessProbe;

/// One running instance of a tool server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub name: String,
    pub pid: u32,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    servers: Vec<ServerRecord>,
}

/// Options recorded alongside a new instance
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    pub client: Option<String>,
    /// Defaults to now
    pub start_time: Option<DateTime<Utc>>,
}

/// Handle to the on-disk registry file
#[derive(Debug, Clone)]
pub struct Registry {
    path: PathBuf,
}

impl Registry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all records. A missing file is an empty registry.
    pub fn read(&self) -> Result<Vec<ServerRecord>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(MegatoolError::io(
                    format!("Failed to read registry {}", self.path.display()),
                    e,
                ))
            }
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let file: RegistryFile =
            serde_json::from_str(&content).map_err(|source| MegatoolError::Config {
                path: self.path.clone(),
                source,
            })?;
        Ok(file.servers)
    }

    /// Replace the registry contents
    pub fn write(&self, servers: &[ServerRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            create_dir_0755(parent)
                .io_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let file = RegistryFile {
            servers: servers.to_vec(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(|source| MegatoolError::Config {
            path: self.path.clone(),
            source,
        })?;

        // Write beside the target then rename so readers never see a partial file
        let tmp = self.path.with_extension(format!("json.{}.tmp", std::process::id()));
        std::fs::write(&tmp, json)
            .io_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .io_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }

    /// Record a new instance, pruning dead entries first
    pub fn add(
        &self,
        name: &str,
        pid: u32,
        opts: AddOptions,
        probe: &dyn ProcessProbe,
    ) -> Result<ServerRecord> {
        let mut servers = cleanup_stale(self.read()?, probe);
        servers.retain(|s| s.pid != pid);

        let record = ServerRecord {
            name: name.to_string(),
            pid,
            start_time: opts.start_time.unwrap_or_else(Utc::now),
            client: opts.client.filter(|c| !c.is_empty()),
        };
        servers.push(record.clone());
        self.write(&servers)?;

        tracing::debug!("Registered {} (pid {})", name, pid);
        Ok(record)
    }

    /// Drop the record for `pid`. Returns whether anything was removed.
    pub fn remove_by_pid(&self, pid: u32) -> Result<bool> {
        let mut servers = self.read()?;
        let before = servers.len();
        servers.retain(|s| s.pid != pid);
        if servers.len() == before {
            return Ok(false);
        }
        self.write(&servers)?;
        Ok(true)
    }

    /// Read, prune dead pids, and persist the pruned list if it changed
    pub fn read_active(&self, probe: &dyn ProcessProbe) -> Result<Vec<ServerRecord>> {
        let servers = self.read()?;
        let before = servers.len();
        let active = cleanup_stale(servers, probe);
        if active.len() != before {
            if let Err(e) = self.write(&active) {
                tracing::warn!("Failed to rewrite registry: {}", e);
            }
        }
        Ok(active)
    }
}

/// Keep only records whose pid is still alive
pub fn cleanup_stale(servers: Vec<ServerRecord>, probe: &dyn ProcessProbe) -> Vec<ServerRecord> {
    servers
        .into_iter()
        .filter(|s| {
            let alive = s.pid > 0 && probe.alive(s.pid);
            if !alive {
                tracing::debug!("Pruning stale registry entry {} (pid {})", s.name, s.pid);
            }
            alive
        })
        .collect()
}

/// 1-based position of `record` among same-named records ordered by start
/// time, together with the number of such records.
pub fn instance_number(record: &ServerRecord, servers: &[ServerRecord]) -> (usize, usize) {
    let mut same: Vec<&ServerRecord> = servers.iter().filter(|s| s.name == record.name).collect();
    same.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.pid.cmp(&b.pid)));
    let total = same.len();
    let position = same
        .iter()
        .position(|s| s.pid == record.pid)
        .map(|i| i + 1)
        .unwrap_or(total);
    (position, total)
}

/// Human readable time since `start_time`
pub fn format_uptime(start_time: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = (now - start_time).to_std().unwrap_or_default();
    format_duration(elapsed)
}

/// Render a duration as `Nd Nh Nm`, `Nh Nm`, `Nm Ns`, or `Ns`
pub fn format_duration(duration: Duration) -> String {
    // Round to the nearest whole second
    let secs = (duration.as_millis() + 500) / 1000;
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
