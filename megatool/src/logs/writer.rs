//! Size-rotating, line-atomic log writer
//!
//! The active file is always `server_<pid>.log`. On rotation it is renamed
//! to `server_<pid>.log.<N>` (N increasing) and, when compression is on,
//! gzipped to `server_<pid>.log.<N>.gz` on a background thread.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::SystemTime;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::config::{create_dir_0755, LogPolicy};

/// A rotated segment of an active log file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub path: PathBuf,
    pub index: u64,
    pub compressed: bool,
}

/// Appends complete lines to a log file, rotating by size
pub struct RotatingWriter {
    path: PathBuf,
    policy: LogPolicy,
    file: Option<File>,
    size: u64,
    compressors: Vec<JoinHandle<()>>,
}

impl RotatingWriter {
    /// Open `path` for appending, creating parent directories with mode 0755
    pub fn open(path: impl Into<PathBuf>, policy: LogPolicy) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            create_dir_0755(parent)?;
        }
        let file = open_append(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path,
            policy,
            file: Some(file),
            size,
            compressors: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes in the active file
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Write one complete line. A trailing newline is added if missing.
    ///
    /// The line goes out in a single `write_all` so concurrent readers never
    /// see half of it interleaved with another line.
    pub fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line);
        if !buf.ends_with(b"\n") {
            buf.push(b'\n');
        }
        let len = buf.len() as u64;

        if self.size > 0 && self.size + len > self.policy.max_size {
            self.rotate()?;
        }

        if self.file.is_none() {
            let file = open_append(&self.path)?;
            self.size = file.metadata()?.len();
            self.file = Some(file);
        }

        if let Some(file) = self.file.as_mut() {
            file.write_all(&buf)?;
            file.flush()?;
            self.size += len;
        }
        Ok(())
    }

    /// Rename the active file to the next segment and start a fresh one
    pub fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }

        let next_index = list_segments(&self.path)
            .iter()
            .map(|s| s.index)
            .max()
            .unwrap_or(0)
            + 1;
        let segment = segment_path(&self.path, next_index);

        if self.path.exists() {
            std::fs::rename(&self.path, &segment)?;
            tracing::debug!("Rotated {:?} -> {:?}", self.path, segment);

            if self.policy.compress {
                self.compressors.retain(|h| !h.is_finished());
                self.compressors
                    .push(std::thread::spawn(move || compress_segment(&segment)));
            }
        }

        let file = open_append(&self.path)?;
        self.size = 0;
        self.file = Some(file);

        self.enforce_retention();
        Ok(())
    }

    /// Delete segments beyond `max_backups` or older than `max_age`
    fn enforce_retention(&self) {
        let mut segments = list_segments(&self.path);
        segments.sort_by(|a, b| b.index.cmp(&a.index));

        let mut kept_indexes = Vec::new();
        let now = SystemTime::now();
        for segment in segments {
            let too_old = std::fs::metadata(&segment.path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .map(|age| age > self.policy.max_age)
                .unwrap_or(false);

            // A segment mid-compression shows up twice with the same index
            let keep = !too_old
                && (kept_indexes.contains(&segment.index)
                    || kept_indexes.len() < self.policy.max_backups);

            if keep {
                if !kept_indexes.contains(&segment.index) {
                    kept_indexes.push(segment.index);
                }
            } else if let Err(e) = std::fs::remove_file(&segment.path) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!("Failed to remove old log segment {:?}: {}", segment.path, e);
                }
            }
        }
    }

    /// Flush and wait for pending compression work
    pub fn close(mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        for handle in self.compressors.drain(..) {
            let _ = handle.join();
        }
        Ok(())
    }
}

impl Drop for RotatingWriter {
    fn drop(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn segment_path(active: &Path, index: u64) -> PathBuf {
    let mut name = active.as_os_str().to_owned();
    name.push(format!(".{}", index));
    PathBuf::from(name)
}

/// Rotated segments belonging to the active file at `active`
pub fn list_segments(active: &Path) -> Vec<Segment> {
    let (Some(dir), Some(stem)) = (
        active.parent(),
        active.file_name().and_then(|n| n.to_str()),
    ) else {
        return Vec::new();
    };
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let prefix = format!("{}.", stem);
    entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            let rest = name.to_str()?.strip_prefix(&prefix)?;
            let (index, compressed) = match rest.strip_suffix(".gz") {
                Some(index) => (index, true),
                None => (rest, false),
            };
            Some(Segment {
                path: entry.path(),
                index: index.parse().ok()?,
                compressed,
            })
        })
        .collect()
}

/// Gzip `segment` to `<segment>.gz` and remove the original
pub fn compress_segment(segment: &Path) {
    let mut gz_name = segment.as_os_str().to_owned();
    gz_name.push(".gz");
    let gz_path = PathBuf::from(gz_name);

    let result = (|| -> io::Result<()> {
        let mut source = File::open(segment)?;
        let target = File::create(&gz_path)?;
        let mut encoder = GzEncoder::new(target, Compression::default());
        io::copy(&mut source, &mut encoder)?;
        encoder.finish()?.sync_all()?;
        std::fs::remove_file(segment)
    })();

    if let Err(e) = result {
        tracing::warn!("Failed to compress log segment {:?}: {}", segment, e);
        let _ = std::fs::remove_file(&gz_path);
    }
}
