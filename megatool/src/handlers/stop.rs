//! stop command handler

use anyhow::{Context, Result};
use chrono::Utc;

use super::CommandContext;
use crate::error::MegatoolError;
use crate::process::ProbeError;
use crate::registry::{format_uptime, instance_number, ServerRecord};

/// Handle the `stop` command
pub fn run_stop(
    ctx: &CommandContext,
    server: Option<&str>,
    pid: Option<u32>,
    all: bool,
    client: Option<&str>,
) -> Result<()> {
    let registry = ctx.registry();
    let servers = registry
        .read_active(ctx.probe())
        .context("Failed to read running servers")?;

    let targets = select_targets(&servers, server, pid, all, client)?;

    let mut stopped = Vec::new();
    let mut failures = 0;
    for target in &targets {
        match ctx.probe().terminate(target.pid) {
            Ok(()) => {
                println!(
                    "Server '{}' (PID: {}) stopped successfully",
                    target.name, target.pid
                );
                stopped.push(target.pid);
            }
            Err(ProbeError::NotFound(_)) => {
                println!(
                    "Server '{}' (PID: {}) was no longer running",
                    target.name, target.pid
                );
                stopped.push(target.pid);
            }
            Err(e) => {
                eprintln!("Failed to stop server '{}': {}", target.name, e);
                failures += 1;
            }
        }
    }

    let remaining: Vec<ServerRecord> = servers
        .into_iter()
        .filter(|s| !stopped.contains(&s.pid))
        .collect();
    registry
        .write(&remaining)
        .context("Failed to update running servers")?;

    if failures > 0 {
        return Err(MegatoolError::user(format!(
            "Failed to stop {} of {} server(s)",
            failures,
            targets.len()
        ))
        .into());
    }
    Ok(())
}

/// Pick the records a `stop` invocation applies to.
///
/// More than one match is only allowed with `--all` or `--pid`.
pub fn select_targets(
    servers: &[ServerRecord],
    server: Option<&str>,
    pid: Option<u32>,
    all: bool,
    client: Option<&str>,
) -> std::result::Result<Vec<ServerRecord>, MegatoolError> {
    if server.is_none() && pid.is_none() {
        return Err(MegatoolError::user_with_hint(
            "Specify a server name or --pid",
            "Run 'megatool ps' to list running servers",
        ));
    }

    let matches: Vec<ServerRecord> = servers
        .iter()
        .filter(|s| server.map_or(true, |name| s.name == name))
        .filter(|s| pid.map_or(true, |pid| s.pid == pid))
        .filter(|s| client.map_or(true, |c| s.client.as_deref() == Some(c)))
        .cloned()
        .collect();

    if matches.is_empty() {
        let what = match (server, pid) {
            (Some(name), Some(pid)) => format!("server '{}' with PID {}", name, pid),
            (Some(name), None) => format!("server '{}'", name),
            (None, Some(pid)) => format!("server with PID {}", pid),
            (None, None) => "server".to_string(),
        };
        return Err(MegatoolError::user_with_hint(
            format!("No running {} found", what),
            "Run 'megatool ps' to list running servers",
        ));
    }

    if matches.len() > 1 && !all && pid.is_none() {
        let now = Utc::now();
        let mut sorted = matches.clone();
        sorted.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.pid.cmp(&b.pid)));

        let mut message = format!(
            "Multiple instances of '{}' are running:",
            server.unwrap_or_default()
        );
        for record in &sorted {
            let (instance, total) = instance_number(record, servers);
            message.push_str(&format!(
                "\n  {} (instance {} of {})  PID: {}  uptime: {}",
                record.name,
                instance,
                total,
                record.pid,
                format_uptime(record.start_time, now)
            ));
        }
        return Err(MegatoolError::user_with_hint(
            message,
            "Use --pid <PID> to stop one instance or --all to stop them all",
        ));
    }

    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::context;
    use chrono::Duration;

    fn record(name: &str, pid: u32, secs_ago: i64) -> ServerRecord {
        ServerRecord {
            name: name.to_string(),
            pid,
            start_time: Utc::now() - Duration::seconds(secs_ago),
            client: None,
        }
    }

    fn pids(records: &[ServerRecord]) -> Vec<u32> {
        records.iter().map(|r| r.pid).collect()
    }

    #[test]
    fn test_select_single_instance() {
        let servers = vec![record("calculator", 10, 5), record("github", 11, 5)];
        let targets = select_targets(&servers, Some("calculator"), None, false, None).unwrap();
        assert_eq!(pids(&targets), [10]);
    }

    #[test]
    fn test_select_requires_target() {
        let err = select_targets(&[], None, None, false, None).unwrap_err();
        assert!(err.hint().unwrap().contains("megatool ps"));
    }

    #[test]
    fn test_select_unknown_server() {
        let servers = vec![record("calculator", 10, 5)];
        let err = select_targets(&servers, Some("github"), None, false, None).unwrap_err();
        assert_eq!(err.to_string(), "No running server 'github' found");
    }

    #[test]
    fn test_select_multiple_instances_is_ambiguous() {
        let servers = vec![record("github", 20, 10), record("github", 21, 5)];
        let err = select_targets(&servers, Some("github"), None, false, None).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("instance 1 of 2"));
        assert!(message.contains("instance 2 of 2"));
        assert!(message.contains("PID: 20"));

        let targets = select_targets(&servers, Some("github"), Some(21), false, None).unwrap();
        assert_eq!(pids(&targets), [21]);

        let targets = select_targets(&servers, Some("github"), None, true, None).unwrap();
        assert_eq!(pids(&targets), [20, 21]);
    }

    #[test]
    fn test_select_by_client() {
        let mut a = record("github", 20, 10);
        a.client = Some("cursor".to_string());
        let b = record("github", 21, 5);
        let targets =
            select_targets(&[a, b], Some("github"), None, false, Some("cursor")).unwrap();
        assert_eq!(pids(&targets), [20]);
    }

    #[test]
    fn test_stop_single_instance_updates_registry() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), &[10, 11]);
        ctx.registry()
            .write(&[record("calculator", 10, 5), record("github", 11, 5)])
            .unwrap();

        run_stop(&ctx, Some("calculator"), None, false, None).unwrap();

        assert_eq!(pids(&ctx.registry().read().unwrap()), [11]);
        assert!(!ctx.probe().alive(10));
        assert!(ctx.probe().alive(11));
    }

    #[test]
    fn test_stop_ambiguous_terminates_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), &[20, 21]);
        ctx.registry()
            .write(&[record("github", 20, 10), record("github", 21, 5)])
            .unwrap();

        assert!(run_stop(&ctx, Some("github"), None, false, None).is_err());
        assert!(ctx.probe().alive(20));
        assert!(ctx.probe().alive(21));

        run_stop(&ctx, Some("github"), Some(21), false, None).unwrap();
        assert!(ctx.probe().alive(20));
        assert!(!ctx.probe().alive(21));

        run_stop(&ctx, Some("github"), None, true, None).unwrap();
        assert!(!ctx.probe().alive(20));
        assert!(ctx.registry().read().unwrap().is_empty());
    }
}
