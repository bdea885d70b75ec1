use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use megatool::cli::Cli;
use megatool::handlers::{dispatch, CommandContext};
use megatool::MegatoolError;

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            eprint!("{}", usage_error(&e.render().to_string()));
            std::process::exit(1);
        }
        Err(e) => {
            // Help and version go to stdout with status 0
            let _ = e.print();
            std::process::exit(0);
        }
    };

    init_tracing(cli.verbosity);

    let result = match CommandContext::from_env() {
        Ok(ctx) => dispatch(&ctx, cli.command).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        std::process::exit(report(&e));
    }
}

/// Tracing goes to stderr; stdout carries the server's protocol stream
fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(filter)
        .init();
}

/// Print a failure and return the exit code for it
fn report(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<MegatoolError>() {
        Some(MegatoolError::ChildFailed(code)) => *code,
        Some(err) => {
            eprintln!("Error: {}", describe(error));
            if let Some(hint) = err.hint() {
                eprintln!("{}", hint);
            }
            err.exit_code()
        }
        None => {
            eprintln!("Error: {}", describe(error));
            1
        }
    }
}

/// Clap's message with the same `Error:` prefix as every other failure
fn usage_error(rendered: &str) -> String {
    let message = rendered.strip_prefix("error: ").unwrap_or(rendered);
    format!("Error: {}", message)
}

/// Join the cause chain, skipping causes already quoted by their parent
fn describe(error: &anyhow::Error) -> String {
    let mut text = String::new();
    for cause in error.chain() {
        let message = cause.to_string();
        if text.ends_with(&message) {
            continue;
        }
        if !text.is_empty() {
            text.push_str(": ");
        }
        text.push_str(&message);
    }
    text
}
