//! cleanup command handler

use anyhow::{Context, Result};

use super::CommandContext;
use crate::logs::{PrunePlan, PruneReport, RemovalKind};
use crate::output::{confirm, format_bytes, is_interactive};
use crate::registry::cleanup_stale;

/// Handle the `cleanup` command
pub fn run_cleanup(
    ctx: &CommandContext,
    days: u64,
    dry_run: bool,
    force: bool,
    verbose: bool,
) -> Result<()> {
    let stale = prune_registry(ctx, dry_run)?;
    if stale > 0 {
        let verb = if dry_run { "Would remove" } else { "Removed" };
        println!("{} {} stale registry entr{}", verb, stale, if stale == 1 { "y" } else { "ies" });
    }

    let plan = ctx.store().plan_prune(days, ctx.probe());
    if plan.is_empty() {
        println!("No log files to clean up.");
        return Ok(());
    }

    if verbose || dry_run {
        print_plan(&plan);
    }

    let summary = plan.summary();
    if dry_run {
        println!("Dry run: {}", describe(&summary));
        return Ok(());
    }

    if !force && is_interactive() {
        let proceed = confirm(&format!("Delete {}?", describe(&summary)))
            .context("Failed to read confirmation")?;
        if !proceed {
            println!("Cleanup cancelled.");
            return Ok(());
        }
    }

    let report = plan.apply();
    println!("Removed {}", describe(&report));
    if report.failures > 0 {
        eprintln!(
            "{} item(s) could not be removed; run with -v for details",
            report.failures
        );
    }
    Ok(())
}

/// Drop registry entries whose process is gone. Returns how many were stale.
fn prune_registry(ctx: &CommandContext, dry_run: bool) -> Result<usize> {
    let registry = ctx.registry();
    let servers = registry
        .read()
        .context("Failed to read running servers")?;
    let before = servers.len();
    let active = cleanup_stale(servers, ctx.probe());
    let stale = before - active.len();

    if stale > 0 && !dry_run {
        registry
            .write(&active)
            .context("Failed to update running servers")?;
    }
    Ok(stale)
}

fn print_plan(plan: &PrunePlan) {
    for removal in &plan.removals {
        match removal.kind {
            RemovalKind::Directory { files } => println!(
                "  {} (directory, {} file(s), {})",
                removal.path.display(),
                files,
                format_bytes(removal.bytes)
            ),
            RemovalKind::File => println!(
                "  {} ({})",
                removal.path.display(),
                format_bytes(removal.bytes)
            ),
        }
    }
}

fn describe(report: &PruneReport) -> String {
    format!(
        "{} director{}, {} file(s), {}",
        report.dirs_removed,
        if report.dirs_removed == 1 { "y" } else { "ies" },
        report.files_removed,
        format_bytes(report.bytes_freed)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::context;
    use crate::registry::ServerRecord;
    use chrono::Utc;
    use filetime::FileTime;
    use std::time::{Duration, SystemTime};

    fn age(path: &std::path::Path, days: u64) {
        let when = SystemTime::now() - Duration::from_secs(days * 86_400);
        filetime::set_file_mtime(path, FileTime::from_system_time(when)).unwrap();
    }

    fn record(name: &str, pid: u32) -> ServerRecord {
        ServerRecord {
            name: name.to_string(),
            pid,
            start_time: Utc::now(),
            client: None,
        }
    }

    #[test]
    fn test_cleanup_keeps_active_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), &[100]);
        let dir = ctx.paths.server_log_dir("serverX");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("server_100.log"), "{}\n").unwrap();
        std::fs::write(dir.join("server_200.log"), "{}\n").unwrap();
        age(&dir.join("server_200.log"), 2);

        run_cleanup(&ctx, 30, false, true, false).unwrap();

        assert!(dir.join("server_100.log").exists());
        assert!(!dir.join("server_200.log").exists());
    }

    #[test]
    fn test_cleanup_removes_old_inactive_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), &[]);
        let dir = ctx.paths.server_log_dir("serverY");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("server_300.log"), "{}\n").unwrap();
        age(&dir.join("server_300.log"), 40);

        run_cleanup(&ctx, 30, false, true, false).unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), &[]);
        let dir = ctx.paths.server_log_dir("serverY");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("server_300.log"), "{}\n").unwrap();
        age(&dir.join("server_300.log"), 40);
        ctx.registry().write(&[record("serverY", 300)]).unwrap();

        run_cleanup(&ctx, 30, true, false, true).unwrap();

        assert!(dir.join("server_300.log").exists());
        assert_eq!(ctx.registry().read().unwrap().len(), 1);
    }

    #[test]
    fn test_cleanup_prunes_registry() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), &[1]);
        ctx.registry()
            .write(&[record("a", 1), record("b", 2)])
            .unwrap();

        run_cleanup(&ctx, 30, false, true, false).unwrap();

        let remaining = ctx.registry().read().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].pid, 1);
    }

    #[test]
    fn test_describe_totals() {
        let report = PruneReport {
            dirs_removed: 1,
            files_removed: 3,
            bytes_freed: 2048,
            failures: 0,
        };
        assert_eq!(describe(&report), "1 directory, 3 file(s), 2.0 KB");
    }
}
