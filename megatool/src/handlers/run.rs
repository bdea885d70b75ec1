//! run command handler

use anyhow::Result;

use super::CommandContext;
use crate::error::MegatoolError;
use crate::supervisor::{RunRequest, Supervisor};

const RUN_USAGE: &str = "\
Usage: megatool run [OPTIONS] <server> [--] [server args...]

Options:
      --client <c>      Record the MCP client that launched the server
      --configure       Run the server's interactive configuration
      --sse             Serve over SSE instead of stdio
      --port <p>        SSE port (default: 8080)
      --base-url <u>    Public SSE base URL (default: http://localhost:<port>)
  -h, --help            Show the server's own help";

/// Handle the `run` command
pub async fn run_server(ctx: &CommandContext, args: &[String]) -> Result<()> {
    let request = RunRequest::parse(args)?;

    if request.server.is_none() {
        let servers = ctx.locator.available_servers();
        if request.help_requested() {
            println!("{}", RUN_USAGE);
            print_servers(&servers, false);
            return Ok(());
        }
        print_servers(&servers, true);
        return Err(MegatoolError::user_with_hint(
            "No server specified",
            "Run 'megatool run --help' for usage",
        )
        .into());
    }

    let store = ctx.store();
    let registry = ctx.registry();
    let supervisor = Supervisor {
        locator: &ctx.locator,
        store: &store,
        registry: &registry,
        probe: ctx.probe(),
    };

    let code = supervisor.run(&request).await.map_err(|e| match e {
        MegatoolError::NotFound(message) => {
            MegatoolError::user_with_hint(message, "Run 'megatool ls' to see available servers")
        }
        other => other,
    })?;

    if code != 0 {
        return Err(MegatoolError::ChildFailed(code).into());
    }
    Ok(())
}

fn print_servers(servers: &[String], to_stderr: bool) {
    let mut text = String::from("\nAvailable servers:");
    if servers.is_empty() {
        text.push_str("\n  (none installed)");
    }
    for server in servers {
        text.push_str("\n  ");
        text.push_str(server);
    }
    if to_stderr {
        eprintln!("{}", text);
    } else {
        println!("{}", text);
    }
}
