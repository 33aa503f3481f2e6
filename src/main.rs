use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use plexport::app::ExportMode;
use plexport::config::Config;

/// Export a Plex library to a formatted spreadsheet.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// What to export
    #[arg(value_enum, default_value_t = ExportMode::All)]
    mode: ExportMode,

    /// Output file, or a directory to place the default filename in
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Concurrent TVMaze lookups (overrides LOOKUP_CONCURRENCY)
    #[arg(short, long)]
    concurrency: Option<usize>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let loaded = dotenv();
    init_tracing();
    match loaded {
        Ok(path) => info!("Loaded environment from {:?}", path),
        Err(e) => warn!("No .env file loaded ({}) - relying on environment", e),
    }

    let mut config = Config::from_env()?;
    if let Some(n) = cli.concurrency {
        config = config.with_concurrency(n);
    }
    plexport::app::run(config, cli.mode, cli.output).await?;
    Ok(())
}
