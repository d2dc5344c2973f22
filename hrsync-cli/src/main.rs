//! hrsync: pull employee photos, documents and certificates from HRIMS.
//!
//! # Usage
//!
//! ```text
//! hrsync sync <photos|documents|certificates> [--institution <id>]... [--after <name>]
//!             [--name <substring>] [--limit <n>] [--resume] [--bulk] [--json] [--quiet]
//! hrsync status [--json]
//! hrsync serve [--addr <host:port>]
//! hrsync trigger <photos|documents|certificates> [--institution <id>] [--url <url>]
//!                [--follow-up] [--resume] [--bulk]
//! ```

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{serve::ServeArgs, status::StatusArgs, sync::SyncArgs, trigger::TriggerArgs};
use hrsync_core::Config;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "hrsync",
    version,
    about = "Synchronize employee artifacts from HRIMS into the object store",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the sync pipeline in the foreground.
    Sync(SyncArgs),

    /// Show stored checkpoints per artifact family.
    Status(StatusArgs),

    /// Serve the HTTP sync trigger.
    Serve(ServeArgs),

    /// Start a run on a running server and follow its progress stream.
    Trigger(TriggerArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let home = dirs::home_dir().context("could not determine home directory")?;
    let config = Config::load_at(&home, |key| std::env::var(key).ok())
        .context("failed to load configuration")?;

    match cli.command {
        Commands::Sync(args) => args.run(&config),
        Commands::Status(args) => args.run(&config),
        Commands::Serve(args) => args.run(config),
        Commands::Trigger(args) => args.run(&config),
    }
}
