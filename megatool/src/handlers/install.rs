//! install command handler

use std::path::Path;

use anyhow::{Context, Result};

use super::CommandContext;
use crate::error::MegatoolError;
use crate::installer::{self, Client, ServerEntry};

/// Command written into client configs. Clients resolve it through PATH.
const LAUNCHER: &str = "megatool";

/// Handle the `install` command
pub fn run_install(ctx: &CommandContext, client: &str, server: &str) -> Result<()> {
    let client = Client::parse(client)?;
    let path = client.config_path()?;
    install_into(ctx, client, server, &path)?;

    println!("Installed '{}' for {}", server, client);
    println!("  Config: {}", path.display());
    println!("  Restart {} to pick up the change.", client);
    Ok(())
}

/// Add `server` to the client config at `path`
fn install_into(ctx: &CommandContext, client: Client, server: &str, path: &Path) -> Result<()> {
    let available = ctx.locator.available_servers();
    if !available.iter().any(|s| s == server) {
        return Err(MegatoolError::user_with_hint(
            format!("Unknown server '{}'", server),
            "Run 'megatool ls' to see available servers",
        )
        .into());
    }

    let entry = ServerEntry::for_server(LAUNCHER, server, client.id());
    installer::install_entry(path, server, &entry)
        .with_context(|| format!("Failed to install '{}' for {}", server, client))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::context;

    #[test]
    fn test_rejects_unknown_client() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), &[]);
        let err = run_install(&ctx, "emacs", "calculator").unwrap_err();
        let err = err.downcast_ref::<MegatoolError>().unwrap();
        assert!(err.hint().unwrap().contains("claude-desktop"));
    }

    #[test]
    fn test_rejects_unknown_server() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), &[]);
        let err = run_install(&ctx, "cursor", "calculator").unwrap_err();
        assert_eq!(err.to_string(), "Unknown server 'calculator'");
    }

    #[cfg(unix)]
    #[test]
    fn test_entry_launches_megatool_by_name() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let bin = tmp.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let binary = bin.join("megatool-calculator");
        std::fs::write(&binary, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

        let ctx = context(tmp.path(), &[]);
        let path = tmp.path().join("mcp.json");
        install_into(&ctx, Client::Cursor, "calculator", &path).unwrap();

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        let entry = &written["mcpServers"]["calculator"];
        assert_eq!(entry["command"], "megatool");
        assert_eq!(
            entry["args"],
            serde_json::json!(["run", "--client", "cursor", "calculator"])
        );
    }
}
