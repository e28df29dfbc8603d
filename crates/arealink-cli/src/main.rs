//! Operator CLI for arealink
//!
//! Inspect the paired session, pair a device with an Area, force a credential
//! renewal, or log out.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{
    common::Context,
    logout,
    pair::{self, PairCommand},
    renew, status,
};

#[derive(Parser)]
#[command(name = "arealink")]
#[command(about = "arealink - device pairing and session upkeep for Areas", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, default_value = ".arealink/config.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Restore the stored session and show its role and expiry
    Status,

    /// Pair this device with an Area
    Pair(PairCommand),

    /// Renew the access token now
    Renew,

    /// End the session and clear stored credentials
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let context = Context::load(&cli.config)?;

    match cli.command {
        Commands::Status => status::run(&context).await?,
        Commands::Pair(cmd) => pair::run(&context, cmd).await?,
        Commands::Renew => renew::run(&context).await?,
        Commands::Logout => logout::run(&context).await?,
    }

    Ok(())
}
