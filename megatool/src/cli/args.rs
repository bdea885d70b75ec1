//! CLI argument definitions
//!
//! Contains the main CLI struct and Commands enum for clap parsing.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "megatool")]
#[command(version, about = "Run and manage MCP tool servers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace). Default is warn.
    #[arg(short = 'v', action = ArgAction::Count, global = true)]
    pub verbosity: u8,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a tool server over stdio (or SSE with --sse)
    ///
    /// Usage: megatool run [--client <c>] [--configure] [--sse [--port <p>]
    /// [--base-url <u>]] <server> [--] [server args...]
    #[command(disable_help_flag = true)]
    Run {
        /// Server name followed by supervisor flags and server arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, num_args = 0..)]
        args: Vec<String>,
    },
    /// List installed tool servers
    Ls,
    /// Show running tool servers
    Ps {
        /// Output format
        #[arg(long, value_enum, default_value_t = PsFormat::Table)]
        format: PsFormat,
        /// Columns to show (comma-separated)
        #[arg(long, value_enum, value_delimiter = ',')]
        fields: Vec<PsField>,
        /// Omit the header row
        #[arg(long)]
        no_header: bool,
        /// Only show servers launched by this client
        #[arg(long)]
        client: Option<String>,
    },
    /// Stop running tool servers
    Stop {
        /// Server name
        server: Option<String>,
        /// Stop the instance with this PID
        #[arg(long)]
        pid: Option<u32>,
        /// Stop every matching instance
        #[arg(long)]
        all: bool,
        /// Only stop servers launched by this client
        #[arg(long)]
        client: Option<String>,
    },
    /// Show server logs
    Logs {
        /// Only show logs for this server
        server: Option<String>,
        /// Keep printing new lines as they are written
        #[arg(long, short)]
        follow: bool,
        /// Number of lines to show (0 = all)
        #[arg(long = "lines", short = 'n', default_value = "50")]
        lines: usize,
        /// Include logs from servers that are no longer running
        #[arg(long)]
        all: bool,
    },
    /// Remove stale registry entries and old log files
    Cleanup {
        /// Remove logs of stopped servers older than this many days
        #[arg(long, default_value = "30")]
        days: u64,
        /// Show what would be removed without deleting anything
        #[arg(long)]
        dry_run: bool,
        /// Do not ask for confirmation
        #[arg(long)]
        force: bool,
        /// List every file and directory that is removed
        #[arg(long)]
        verbose: bool,
    },
    /// Add a server to an MCP client's configuration
    Install {
        /// Client to configure (claude-desktop, cursor, windsurf)
        #[arg(long)]
        client: String,
        /// Server name
        server: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PsFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PsField {
    Name,
    Pid,
    Uptime,
    Client,
}

impl PsField {
    pub const DEFAULT: [PsField; 4] = [PsField::Name, PsField::Pid, PsField::Uptime, PsField::Client];

    pub fn header(&self) -> &'static str {
        match self {
            PsField::Name => "NAME",
            PsField::Pid => "PID",
            PsField::Uptime => "UPTIME",
            PsField::Client => "CLIENT",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            PsField::Name => "name",
            PsField::Pid => "pid",
            PsField::Uptime => "uptime",
            PsField::Client => "client",
        }
    }
}
