//! bore-auth - forward-auth service for bore tunnels
//!
//! Main entry point for the bore-auth CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{keygen, serve};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// bore-auth - forward-auth service for bore tunnels
#[derive(Parser)]
#[command(name = "bore-auth")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write JSON logs to daily files in this directory
    #[arg(long, global = true, env = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Defaults to `serve` configured from the environment
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the forward-auth server
    Serve(serve::ServeArgs),

    /// Print a fresh pair of cookie keys
    Keygen(keygen::KeygenArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable) + optional daily JSON file
    let filter = if cli.verbose {
        "bore_auth=debug,bore_auth_server=debug,bore_auth_oauth=debug,bore_auth_session=debug,\
         tower_http=debug,info"
    } else {
        "bore_auth=info,bore_auth_server=info,bore_auth_oauth=info,bore_auth_session=info,warn"
    };
    let console_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let (file_writer, _guard) = match &cli.log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "bore-auth.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            (Some(non_blocking), Some(guard))
        }
        None => (None, None),
    };

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_filter(console_filter),
        )
        .with(file_writer.map(|writer| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "bore_auth=trace,bore_auth_server=trace,bore_auth_oauth=trace,\
                     bore_auth_session=trace,info",
                ))
        }))
        .init();

    let ctx = commands::Context {
        verbose: cli.verbose,
    };

    match cli.command {
        Some(Commands::Serve(args)) => serve::run(args, &ctx).await,
        Some(Commands::Keygen(args)) => keygen::run(args, &ctx),
        None => serve::run(serve::ServeArgs::from_env(), &ctx).await,
    }
}
