mod daemon;

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use teamdeck_config::AppConfig;

#[derive(Debug, Parser)]
#[command(
    name = "teamdeck",
    version,
    about = "Mirror agent team, inbox and task files into a queryable store"
)]
struct Cli {
    /// Configuration file.
    #[arg(long, global = true, default_value = "config/default.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the reconciliation daemon in the foreground.
    Serve,
    /// One-shot full scan against the store file, then exit.
    Scan,
    /// Show the running daemon's status.
    Status,
    /// Ask the running daemon for a full scan.
    Rescan,
    /// Print change events from the running daemon as JSON lines.
    Watch,
    /// Ask the running daemon to shut down.
    Stop,
    /// Write the effective configuration to the `--config` path.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => teamdeck_runtime::run_daemon(config).await?,
        Commands::Scan => daemon::run_scan(&config)?,
        Commands::Status => daemon::print_status(&config).await?,
        Commands::Rescan => daemon::request_rescan(&config).await?,
        Commands::Watch => daemon::watch_events(&config).await?,
        Commands::Stop => daemon::stop(&config).await?,
        Commands::Init { force } => write_config(&config, &cli.config, force)?,
    }
    Ok(())
}

fn write_config(config: &AppConfig, path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }
    config.save_to(path)?;
    println!("wrote {}", path.display());
    Ok(())
}
