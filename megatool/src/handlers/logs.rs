//! logs command handler

use std::time::Duration;

use anyhow::Result;

use super::CommandContext;
use crate::logs::{follow, parse_lines, sort_entries, tail_last, LogEntry, LogStore, Palette, StartAt};
use crate::output::colors_enabled;
use crate::process::ProcessProbe;

const FOLLOW_POLL: Duration = Duration::from_millis(250);

/// Handle the `logs` command
pub async fn run_logs(
    ctx: &CommandContext,
    server: Option<&str>,
    follow_mode: bool,
    lines: usize,
    all: bool,
) -> Result<()> {
    let store = ctx.store();
    let files = store.enumerate(server, !all, ctx.probe());

    if files.is_empty() {
        match server {
            Some(name) => println!("No logs found for server '{}'.", name),
            None => println!("No logs found."),
        }
        if !all {
            println!("Use --all to include servers that are no longer running.");
        }
        return Ok(());
    }

    let mut palette = Palette::new(colors_enabled());

    if !follow_mode {
        for entry in recent_entries(&store, server, lines, all, ctx.probe()) {
            println!("{}", palette.format(&entry));
        }
        return Ok(());
    }

    tracing::info!("Following {} log file(s)", files.len());
    let mut rx = follow(files, StartAt::End, FOLLOW_POLL);
    loop {
        tokio::select! {
            followed = rx.recv() => {
                let Some(followed) = followed else {
                    break;
                };
                let entry = LogEntry::parse(&followed.line, &followed.file);
                println!("{}", palette.format(&entry));
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

/// The last `lines` entries across matching files, oldest first.
///
/// `lines == 0` returns everything.
pub fn recent_entries(
    store: &LogStore,
    server: Option<&str>,
    lines: usize,
    all: bool,
    probe: &dyn ProcessProbe,
) -> Vec<LogEntry> {
    let mut entries = Vec::new();
    for file in store.enumerate(server, !all, probe) {
        match tail_last(&file.path, lines) {
            Ok(tail) => entries.extend(parse_lines(&tail, &file)),
            Err(e) => tracing::warn!("Skipping {:?}: {}", file.path, e),
        }
    }

    sort_entries(&mut entries);
    if lines > 0 && entries.len() > lines {
        entries.drain(..entries.len() - lines);
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogPolicy;
    use crate::registry::tests::FakeProbe;

    fn write_log(store: &LogStore, server: &str, pid: u32, lines: &[String]) {
        let path = store.log_path(server, pid);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();
    }

    fn line(second: u32, message: &str) -> String {
        format!(
            r#"{{"timestamp":"2026-03-01T10:00:{:02}.000000000Z","level":"info","message":"{}"}}"#,
            second, message
        )
    }

    #[test]
    fn test_last_lines_by_timestamp() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LogStore::new(tmp.path(), LogPolicy::default());
        let lines: Vec<String> = (1..=5).map(|i| line(i, &format!("m{}", i))).collect();
        write_log(&store, "a", 7, &lines);

        let entries = recent_entries(&store, Some("a"), 2, false, &FakeProbe::with_live(&[7]));
        let messages: Vec<&str> = entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["m4", "m5"]);

        let mut palette = Palette::new(false);
        assert_eq!(
            palette.format(&entries[0]),
            "2026-03-01T10:00:04.000Z INFO  [a:7] m4"
        );
    }

    #[test]
    fn test_merges_servers_in_timestamp_order() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LogStore::new(tmp.path(), LogPolicy::default());
        write_log(&store, "a", 1, &[line(1, "a1"), line(4, "a4")]);
        write_log(&store, "b", 2, &[line(2, "b2"), line(3, "b3")]);

        let entries = recent_entries(&store, None, 0, false, &FakeProbe::with_live(&[1, 2]));
        let messages: Vec<&str> = entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["a1", "b2", "b3", "a4"]);
    }

    #[test]
    fn test_inactive_logs_need_all() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LogStore::new(tmp.path(), LogPolicy::default());
        write_log(&store, "a", 1, &[line(1, "old")]);

        let probe = FakeProbe::default();
        assert!(recent_entries(&store, None, 10, false, &probe).is_empty());
        assert_eq!(recent_entries(&store, None, 10, true, &probe).len(), 1);
    }

    #[test]
    fn test_raw_lines_are_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LogStore::new(tmp.path(), LogPolicy::default());
        write_log(&store, "a", 1, &[line(1, "json"), "panicked at main.rs".to_string()]);

        let entries = recent_entries(&store, Some("a"), 0, true, &FakeProbe::default());
        assert_eq!(entries.len(), 2);
        assert!(entries[1].raw);
        assert_eq!(entries[1].message, "panicked at main.rs");
        assert_eq!(entries[1].server, "a");
    }
}
