//! ls command handler

use anyhow::Result;

use super::CommandContext;

/// Handle the `ls` command
pub fn run_ls(ctx: &CommandContext) -> Result<()> {
    let servers = ctx.locator.available_servers();
    if servers.is_empty() {
        eprintln!("No servers installed next to megatool.");
        return Ok(());
    }
    for server in servers {
        println!("{}", server);
    }
    Ok(())
}
