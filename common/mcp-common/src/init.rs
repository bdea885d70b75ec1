//! Tracing setup and the `serve_server!` entry point macro

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::transport::help_mode;

/// Initialise tracing for a tool server.
///
/// Output goes to stderr because stdout carries the protocol. Lines are JSON
/// objects with `timestamp`, `level`, and `message` at the top level, the
/// shape `megatool logs` reads back. `LOG_FORMAT=text` switches to plain
/// text for local debugging.
///
/// Returns `false` without installing anything when `MCP_HELP_MODE=true`,
/// so `megatool run <server> --help` prints usage and nothing else.
pub fn init_tracing(crate_name: &str) -> anyhow::Result<bool> {
    if help_mode() {
        return Ok(false);
    }

    let directive = format!("{}=info", crate_name.replace('-', "_"));
    let filter = EnvFilter::from_default_env()
        .add_directive(directive.parse()?)
        .add_directive("mcp_common=info".parse()?);

    let use_text = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("text"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if use_text {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }

    Ok(true)
}

/// Generate `main` for a tool server.
///
/// `$server_type` needs a `new()` constructor and must implement
/// `rmcp::ServerHandler`. The transport is chosen from the environment, see
/// [`TransportMode::from_env`](crate::TransportMode::from_env).
///
/// ```rust,ignore
/// mcp_common::serve_server!(CalculatorServer, "calculator");
/// ```
#[macro_export]
macro_rules! serve_server {
    ($server_type:ty, $crate_name:expr) => {
        #[tokio::main]
        async fn main() -> anyhow::Result<()> {
            $crate::init_tracing($crate_name)?;
            $crate::serve(<$server_type>::new, $crate_name).await
        }
    };
}
