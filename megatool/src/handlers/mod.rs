//! Command handlers module
//!
//! One handler per subcommand. `CommandContext` carries the resolved paths
//! and the process probe so handlers never reach for globals.

use anyhow::Result;

use crate::cli::Commands;
use crate::config::{LogPolicy, Paths};
use crate::locator::BinaryLocator;
use crate::logs::LogStore;
use crate::process::{ProcessProbe, SystemProbe};
use crate::registry::Registry;

pub mod cleanup;
pub mod install;
pub mod logs;
pub mod ls;
pub mod ps;
pub mod run;
pub mod stop;

pub use cleanup::run_cleanup;
pub use install::run_install;
pub use logs::run_logs;
pub use ls::run_ls;
pub use ps::run_ps;
pub use run::run_server;
pub use stop::run_stop;

/// Shared resources for command handlers
pub struct CommandContext {
    pub paths: Paths,
    pub policy: LogPolicy,
    pub locator: BinaryLocator,
    pub probe: Box<dyn ProcessProbe>,
}

impl CommandContext {
    /// Context for the current user and executable
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            paths: Paths::from_env()?,
            policy: LogPolicy::default(),
            locator: BinaryLocator::from_env(),
            probe: Box::new(SystemProbe),
        })
    }

    pub fn registry(&self) -> Registry {
        Registry::new(self.paths.registry_file())
    }

    pub fn store(&self) -> LogStore {
        LogStore::new(&self.paths.log_root, self.policy)
    }

    pub fn probe(&self) -> &dyn ProcessProbe {
        self.probe.as_ref()
    }
}

/// Route a parsed command to its handler
pub async fn dispatch(ctx: &CommandContext, command: Commands) -> Result<()> {
    match command {
        Commands::Run { args } => run_server(ctx, &args).await,
        Commands::Ls => run_ls(ctx),
        Commands::Ps {
            format,
            fields,
            no_header,
            client,
        } => run_ps(ctx, format, &fields, no_header, client.as_deref()),
        Commands::Stop {
            server,
            pid,
            all,
            client,
        } => run_stop(ctx, server.as_deref(), pid, all, client.as_deref()),
        Commands::Logs {
            server,
            follow,
            lines,
            all,
        } => run_logs(ctx, server.as_deref(), follow, lines, all).await,
        Commands::Cleanup {
            days,
            dry_run,
            force,
            verbose,
        } => run_cleanup(ctx, days, dry_run, force, verbose),
        Commands::Install { client, server } => run_install(ctx, &client, &server),
    }
}
