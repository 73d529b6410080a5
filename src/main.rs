use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use stockpile::cli::{
    handle_backup_command, handle_config_command, handle_item_command, BackupCommands,
    ConfigCommands, Engine, ItemCommands,
};
use stockpile::config::{Settings, StockpilePaths};
use stockpile::storage::Storage;

#[derive(Parser)]
#[command(
    name = "stockpile",
    version,
    about = "Terminal-based inventory management with durable backup and restore",
    long_about = "Stockpile tracks inventory from the command line and treats your \
                  data with respect: every backup is checksummed, optionally \
                  encrypted, verified on demand, rotated by policy, and restorable \
                  in full, merge, or preview mode."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backup management commands
    #[command(subcommand)]
    Backup(BackupCommands),

    /// Inventory item commands
    #[command(subcommand)]
    Item(ItemCommands),

    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Initialize paths and settings
    let paths = StockpilePaths::new()?;
    let mut settings = Settings::load_or_create(&paths)?;

    // Initialize storage and the backup engine
    let storage = Arc::new(Storage::new(paths.clone())?);
    storage.load_all()?;
    let engine = Engine::new(Arc::clone(&storage), &settings)?;

    match cli.command {
        Commands::Backup(cmd) => handle_backup_command(&engine, &settings, cmd)?,
        Commands::Item(cmd) => handle_item_command(&engine, &settings, cmd)?,
        Commands::Config(cmd) => handle_config_command(&engine, &paths, &mut settings, cmd)?,
    }

    Ok(())
}
