//! coinconv - convert between USD, EUR, USDT and VES from the terminal.
//!
//! Signing in stores a bearer token that later runs reuse until it expires
//! or the user signs out. Without a subcommand an interactive shell starts.

mod commands;
mod context;
mod shell;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use coinconv_core::CurrencyCode;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use context::AppContext;

/// Log file name prefix inside `--log-dir`
const LOG_FILE_PREFIX: &str = "coinconv.log";

#[derive(Parser)]
#[command(name = "coinconv", version, about = "Currency converter with a persistent sign-in session")]
struct Cli {
    /// API base URL (overrides COINCONV_API_URL and the config file)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Also write logs to daily files in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: Option<String>,
        /// Keep the token after this process exits
        #[arg(long)]
        remember: bool,
    },
    /// Sign out and forget the stored token
    Logout,
    /// Show the signed-in user
    Whoami {
        #[arg(long)]
        json: bool,
    },
    /// Show session, storage and rate cache state
    Status,
    /// Convert an amount, e.g. `convert 100 USD VES`
    Convert {
        amount: f64,
        from: CurrencyCode,
        to: CurrencyCode,
        /// Use cached or built-in rates only
        #[arg(long)]
        offline: bool,
    },
    /// List the current exchange rates
    Rates {
        /// Ignore the rate cache
        #[arg(long)]
        refresh: bool,
    },
    /// Interactive shell (the default)
    Shell,
}

/// Initialize the tracing subscriber for logging.
/// RUST_LOG controls the level (e.g., RUST_LOG=coinconv_core=debug).
fn init_tracing(log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_ref());
    info!("coinconv starting");

    let mut ctx = AppContext::build(cli.api_url)?;

    match cli.command.unwrap_or(Command::Shell) {
        Command::Login { email, remember } => {
            let email = match email {
                Some(email) => email,
                None => shell::prompt_line("Email", ctx.config.last_email.as_deref()).await?,
            };
            let remember = remember || ctx.config.remember_by_default;
            // A one-shot process forgets an unremembered token on exit
            commands::login(&mut ctx, &email, remember, true).await?;
        }
        Command::Logout => commands::logout(&ctx),
        Command::Whoami { json } => commands::whoami(&ctx, json).await?,
        Command::Status => commands::status(&ctx),
        Command::Convert {
            amount,
            from,
            to,
            offline,
        } => commands::convert(&ctx, amount, from, to, offline).await?,
        Command::Rates { refresh } => commands::rates(&ctx, refresh).await,
        Command::Shell => shell::run(&mut ctx).await?,
    }

    info!("coinconv exiting");
    Ok(())
}
