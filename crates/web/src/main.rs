use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use nexus_common::NexusConfig;

/// Nexus homelab dashboard server
#[derive(Parser, Debug)]
#[command(name = "nexus-web", version, about)]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "NEXUS_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address (overrides config)
    #[arg(short, long)]
    listen: Option<String>,

    /// Database path (overrides config)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Frontend bundle directory (overrides config)
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = args.config.unwrap_or_else(nexus_common::default_config_path);
    let mut config = NexusConfig::load(&config_path)?;
    config.apply_env()?;

    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if let Some(db) = args.db {
        config.database.path = db;
    }
    if let Some(dir) = args.static_dir {
        config.server.static_dir = Some(dir);
    }

    info!(
        "Starting Nexus {} (config: {:?}, database: {:?})",
        nexus_common::VERSION,
        config_path,
        config.database.path
    );

    nexus_web::server::serve(config).await
}
