//! Nexus admin CLI
//!
//! Operates on the Nexus database directly for account recovery, backups of
//! dashboard layouts, and quick health checks of a running server.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use nexus_common::{Database, NexusConfig};

mod commands;
mod output;

use commands::{dashboard, health, integration, user};

/// Nexus homelab dashboard administration
#[derive(Parser)]
#[command(name = "nexus")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "NEXUS_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Database path (overrides config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage user accounts
    #[command(subcommand)]
    User(user::UserCommands),

    /// Inspect stored integrations
    #[command(subcommand)]
    Integration(integration::IntegrationCommands),

    /// Export and import dashboard layouts
    #[command(subcommand)]
    Dashboard(dashboard::DashboardCommands),

    /// Check a running server
    Health(health::HealthArgs),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let Cli {
        config,
        db,
        format,
        command,
        ..
    } = cli;

    match command {
        Commands::User(cmd) => {
            let (config, db) = open_store(config, db)?;
            user::execute(cmd, &db, &config, format)?
        }
        Commands::Integration(cmd) => integration::execute(cmd, &open_store(config, db)?.1, format)?,
        Commands::Dashboard(cmd) => dashboard::execute(cmd, &open_store(config, db)?.1, format)?,
        Commands::Health(args) => health::execute(args).await?,
        Commands::Version => {
            println!("Nexus CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

/// Resolve configuration the same way the server does and open its database.
fn open_store(
    config: Option<PathBuf>,
    db: Option<PathBuf>,
) -> anyhow::Result<(NexusConfig, Database)> {
    let config_path = config.unwrap_or_else(nexus_common::default_config_path);
    let mut config = NexusConfig::load(&config_path)?;
    config.apply_env()?;
    if let Some(db) = db {
        config.database.path = db;
    }
    let db = Database::open(&config.database.path)?;
    Ok((config, db))
}
