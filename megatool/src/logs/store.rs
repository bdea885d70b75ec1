//! Log store
//!
//! Maps `(server, pid)` to `<log root>/<server>/server_<pid>.log` and provides
//! enumeration, tail reads, and pruning. Single-file failures are logged
//! and skipped; enumeration never fails the caller.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::config::{create_dir_0755, LogPolicy};
use crate::error::{IoResultExt, Result};
use crate::process::ProcessProbe;

use super::writer::RotatingWriter;

/// An active log file and the process that owns it
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LogFile {
    pub server: String,
    pub pid: u32,
    pub path: PathBuf,
}

/// Root of the per-server log directories
#[derive(Debug, Clone)]
pub struct LogStore {
    root: PathBuf,
    policy: LogPolicy,
}

impl LogStore {
    pub fn new(root: impl Into<PathBuf>, policy: LogPolicy) -> Self {
        Self {
            root: root.into(),
            policy,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<server>/server_<pid>.log`
    pub fn log_path(&self, server: &str, pid: u32) -> PathBuf {
        self.root.join(server).join(format!("server_{}.log", pid))
    }

    /// Open an append-only rotating writer for `(server, pid)`
    pub fn open(&self, server: &str, pid: u32) -> Result<RotatingWriter> {
        let dir = self.root.join(server);
        create_dir_0755(&dir).io_context(|| format!("Failed to create {}", dir.display()))?;
        let path = self.log_path(server, pid);
        RotatingWriter::open(&path, self.policy)
            .io_context(|| format!("Failed to open log file {}", path.display()))
    }

    /// Active log files, optionally limited to one server and/or live pids.
    ///
    /// Results are ordered by server name then pid.
    pub fn enumerate(
        &self,
        server: Option<&str>,
        active_only: bool,
        probe: &dyn ProcessProbe,
    ) -> Vec<LogFile> {
        let server_dirs: Vec<(String, PathBuf)> = match server {
            Some(name) => vec![(name.to_string(), self.root.join(name))],
            None => self.server_dirs(),
        };

        let mut files = Vec::new();
        for (name, dir) in server_dirs {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!("Skipping log directory {:?}: {}", dir, e);
                    }
                    continue;
                }
            };
            for entry in entries.flatten() {
                let file_name = entry.file_name();
                let Some(pid) = file_name.to_str().and_then(parse_active_pid) else {
                    continue;
                };
                if active_only && !probe.alive(pid) {
                    continue;
                }
                files.push(LogFile {
                    server: name.clone(),
                    pid,
                    path: entry.path(),
                });
            }
        }
        files.sort();
        files
    }

    fn server_dirs(&self) -> Vec<(String, PathBuf)> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Cannot read log root {:?}: {}", self.root, e);
                }
                return Vec::new();
            }
        };
        let mut dirs: Vec<(String, PathBuf)> = entries
            .flatten()
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| Some((e.file_name().to_str()?.to_string(), e.path())))
            .collect();
        dirs.sort();
        dirs
    }

    /// Decide what a cleanup pass older than `days` would delete
    pub fn plan_prune(&self, days: u64, probe: &dyn ProcessProbe) -> PrunePlan {
        let threshold = Duration::from_secs(days * 86_400);
        let now = SystemTime::now();
        let mut plan = PrunePlan::default();

        for (server, dir) in self.server_dirs() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("Skipping log directory {:?}: {}", dir, e);
                    continue;
                }
            };

            let mut files = Vec::new();
            for entry in entries.flatten() {
                let Ok(meta) = entry.metadata() else {
                    continue;
                };
                if !meta.is_file() {
                    continue;
                }
                let pid = entry.file_name().to_str().and_then(parse_owner_pid);
                files.push(ClassifiedFile {
                    path: entry.path(),
                    bytes: meta.len(),
                    modified: meta.modified().ok(),
                    active: pid.map(|p| probe.alive(p)).unwrap_or(false),
                    owned: pid.is_some(),
                });
            }

            if files.iter().any(|f| f.active) {
                for file in files.iter().filter(|f| !f.active && f.owned) {
                    plan.removals.push(Removal {
                        server: server.clone(),
                        path: file.path.clone(),
                        bytes: file.bytes,
                        kind: RemovalKind::File,
                    });
                }
                continue;
            }

            let newest = files
                .iter()
                .filter_map(|f| f.modified)
                .max()
                .or_else(|| std::fs::metadata(&dir).and_then(|m| m.modified()).ok());
            let expired = newest
                .and_then(|t| now.duration_since(t).ok())
                .map(|age| age > threshold)
                .unwrap_or(false);

            if expired {
                plan.removals.push(Removal {
                    server,
                    path: dir,
                    bytes: files.iter().map(|f| f.bytes).sum(),
                    kind: RemovalKind::Directory {
                        files: files.len(),
                    },
                });
            }
        }

        plan
    }

    /// Plan and, unless `dry_run`, apply a cleanup pass
    pub fn prune(&self, days: u64, dry_run: bool, probe: &dyn ProcessProbe) -> PruneReport {
        let plan = self.plan_prune(days, probe);
        if dry_run {
            plan.summary()
        } else {
            plan.apply()
        }
    }
}

/// Read the last `n` lines of a file (`n == 0` reads everything)
pub fn tail_last(path: &Path, n: usize) -> Result<Vec<String>> {
    let file =
        std::fs::File::open(path).io_context(|| format!("Failed to open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut ring: VecDeque<String> = VecDeque::with_capacity(n.min(4096));
    for line in reader.split(b'\n') {
        let line = line.io_context(|| format!("Failed to read {}", path.display()))?;
        let mut text = String::from_utf8_lossy(&line).into_owned();
        if text.ends_with('\r') {
            text.pop();
        }
        if n > 0 && ring.len() == n {
            ring.pop_front();
        }
        ring.push_back(text);
    }
    Ok(ring.into_iter().collect())
}

/// `server_<pid>.log` -> pid
fn parse_active_pid(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix("server_")?
        .strip_suffix(".log")?
        .parse()
        .ok()
}

/// Owning pid of any file in a server directory, rotated segments included
fn parse_owner_pid(file_name: &str) -> Option<u32> {
    let rest = file_name.strip_prefix("server_")?;
    let (pid, _) = rest.split_once(".log")?;
    pid.parse().ok()
}

struct ClassifiedFile {
    path: PathBuf,
    bytes: u64,
    modified: Option<SystemTime>,
    active: bool,
    owned: bool,
}

/// What a removal targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalKind {
    File,
    Directory { files: usize },
}

/// One planned deletion
#[derive(Debug, Clone)]
pub struct Removal {
    pub server: String,
    pub path: PathBuf,
    pub bytes: u64,
    pub kind: RemovalKind,
}

/// Deletions decided by [`LogStore::plan_prune`]
#[derive(Debug, Default)]
pub struct PrunePlan {
    pub removals: Vec<Removal>,
}

/// Totals of a cleanup pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneReport {
    pub dirs_removed: usize,
    pub files_removed: usize,
    pub bytes_freed: u64,
    pub failures: usize,
}

impl PrunePlan {
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty()
    }

    /// Totals the plan would produce if applied
    pub fn summary(&self) -> PruneReport {
        let mut report = PruneReport::default();
        for removal in &self.removals {
            report.record(removal);
        }
        report
    }

    /// Perform the deletions, skipping (and logging) any that fail
    pub fn apply(&self) -> PruneReport {
        let mut report = PruneReport::default();
        for removal in &self.removals {
            let result = match removal.kind {
                RemovalKind::File => std::fs::remove_file(&removal.path),
                RemovalKind::Directory { .. } => std::fs::remove_dir_all(&removal.path),
            };
            match result {
                Ok(()) => report.record(removal),
                Err(e) => {
                    tracing::warn!("Failed to remove {:?}: {}", removal.path, e);
                    report.failures += 1;
                }
            }
        }
        report
    }
}

impl PruneReport {
    fn record(&mut self, removal: &Removal) {
        match removal.kind {
            RemovalKind::File => self.files_removed += 1,
            RemovalKind::Directory { files } => {
                self.dirs_removed += 1;
                self.files_removed += files;
            }
        }
        self.bytes_freed += removal.bytes;
    }
}
