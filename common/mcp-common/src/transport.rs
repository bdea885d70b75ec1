//! Transport selection for tool servers
//!
//! `megatool run` passes stream-transport settings through the environment:
//! `MCP_SERVER_MODE=sse`, `MCP_SERVER_PORT`, and `MCP_SERVER_BASE_URL`.

use rmcp::{ServerHandler, ServiceExt};

pub const ENV_SERVER_MODE: &str = "MCP_SERVER_MODE";
pub const ENV_SERVER_PORT: &str = "MCP_SERVER_PORT";
pub const ENV_SERVER_BASE_URL: &str = "MCP_SERVER_BASE_URL";
pub const ENV_HELP_MODE: &str = "MCP_HELP_MODE";

const DEFAULT_PORT: u16 = 8080;

/// How a server talks to its client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMode {
    Stdio,
    Sse { port: u16, base_url: String },
}

impl TransportMode {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Resolve the mode from a variable lookup
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mode = var(ENV_SERVER_MODE).unwrap_or_default();
        if !mode.eq_ignore_ascii_case("sse") {
            return Ok(TransportMode::Stdio);
        }

        let port = match var(ENV_SERVER_PORT).filter(|p| !p.is_empty()) {
            Some(raw) => raw
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid {}: {}", ENV_SERVER_PORT, raw))?,
            None => DEFAULT_PORT,
        };
        let base_url = var(ENV_SERVER_BASE_URL)
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| format!("http://localhost:{}", port));

        Ok(TransportMode::Sse {
            port,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Whether the supervisor launched this server only to print its usage
pub fn help_mode() -> bool {
    std::env::var(ENV_HELP_MODE)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Serve `factory()` instances until the client goes away.
///
/// Over stdio there is exactly one instance; over SSE each connection gets
/// its own.
pub async fn serve<S, F>(factory: F, name: &str) -> anyhow::Result<()>
where
    S: ServerHandler,
    F: Fn() -> S + Send + Sync + 'static,
{
    match TransportMode::from_env()? {
        TransportMode::Stdio => {
            tracing::info!("Starting {} MCP server on stdio", name);
            let service = factory().serve(rmcp::transport::stdio()).await?;
            service.waiting().await?;
            tracing::info!("{} shutting down", name);
            Ok(())
        }
        TransportMode::Sse { port, base_url } => {
            tracing::info!("Starting {} MCP server on SSE port {}", name, port);
            crate::sse::serve_sse(factory, port, base_url).await
        }
    }
}
