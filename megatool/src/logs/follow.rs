//! Follow-mode tailing
//!
//! One task per file polls for appended lines and forwards them through a
//! shared channel, so lines from different files arrive in arrival order
//! with no global ordering. A follower reopens its file after rotation or
//! truncation and stops once the file has been gone for a while or the
//! receiver is dropped.

use std::io::SeekFrom;
use std::path::Path;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;

use super::store::LogFile;

/// Polls without the file before a follower gives up
const MISSING_POLLS_BEFORE_EXIT: u32 = 50;

/// A line read from a followed file
#[derive(Debug, Clone)]
pub struct FollowedLine {
    pub file: LogFile,
    pub line: String,
}

/// Where a follower starts reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartAt {
    Beginning,
    End,
}

/// Tail every file in `files`, merging new lines into one channel
pub fn follow(
    files: Vec<LogFile>,
    start: StartAt,
    poll: Duration,
) -> mpsc::Receiver<FollowedLine> {
    let (tx, rx) = mpsc::channel(256);
    for file in files {
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Err(e) = follow_file(file.clone(), start, poll, tx).await {
                tracing::warn!("Stopped following {:?}: {}", file.path, e);
            }
        });
    }
    rx
}

async fn follow_file(
    file: LogFile,
    start: StartAt,
    poll: Duration,
    tx: mpsc::Sender<FollowedLine>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(File::open(&file.path).await?);
    let mut position = match start {
        StartAt::Beginning => 0,
        StartAt::End => reader.seek(SeekFrom::End(0)).await?,
    };
    let mut identity = file_identity(&file.path).await;
    let mut pending = String::new();
    let mut missing_polls = 0;

    loop {
        let mut chunk = String::new();
        let read = reader.read_line(&mut chunk).await?;

        if read > 0 {
            position += read as u64;
            pending.push_str(&chunk);
            // Hold partial lines until the writer finishes them
            if pending.ends_with('\n') && !forward(&file, &mut pending, &tx).await {
                return Ok(());
            }
            continue;
        }

        if tx.is_closed() {
            return Ok(());
        }
        tokio::time::sleep(poll).await;

        let meta = match tokio::fs::metadata(&file.path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                missing_polls += 1;
                if missing_polls >= MISSING_POLLS_BEFORE_EXIT {
                    tracing::debug!("{:?} disappeared, stopping follower", file.path);
                    return Ok(());
                }
                continue;
            }
            Err(e) => return Err(e),
        };
        missing_polls = 0;

        let current_identity = file_identity(&file.path).await;
        let rotated = current_identity.is_some() && current_identity != identity;
        let truncated = meta.len() < position;

        if rotated {
            // The old handle still points at the renamed segment
            if !drain(&mut reader, &file, &mut pending, &tx).await? {
                return Ok(());
            }
        }
        if rotated || truncated {
            tracing::debug!(
                "Reopening {:?} ({})",
                file.path,
                if rotated { "rotated" } else { "truncated" }
            );
            reader = BufReader::new(File::open(&file.path).await?);
            position = 0;
            identity = current_identity;
            pending.clear();
        }
    }
}

/// Read `reader` to its end, forwarding every line including a final
/// unterminated one. Returns false once the receiver is gone.
async fn drain(
    reader: &mut BufReader<File>,
    file: &LogFile,
    pending: &mut String,
    tx: &mpsc::Sender<FollowedLine>,
) -> std::io::Result<bool> {
    loop {
        let mut chunk = String::new();
        if reader.read_line(&mut chunk).await? == 0 {
            break;
        }
        pending.push_str(&chunk);
        if pending.ends_with('\n') && !forward(file, pending, tx).await {
            return Ok(false);
        }
    }
    if pending.is_empty() {
        return Ok(true);
    }
    Ok(forward(file, pending, tx).await)
}

/// Send the buffered line and clear it. Returns false once the receiver is gone.
async fn forward(file: &LogFile, pending: &mut String, tx: &mpsc::Sender<FollowedLine>) -> bool {
    let line = pending.trim_end_matches(['\n', '\r']).to_string();
    pending.clear();
    let followed = FollowedLine {
        file: file.clone(),
        line,
    };
    tx.send(followed).await.is_ok()
}

#[cfg(unix)]
async fn file_identity(path: &Path) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    tokio::fs::metadata(path).await.ok().map(|m| m.ino())
}

#[cfg(not(unix))]
async fn file_identity(_path: &Path) -> Option<u64> {
    None
}
