use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serversync::config::{ClientConfig, ServerConfig};
use serversync::ActionProgress;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "serversync", version, about = "Keep a file set in sync with a server")]
struct Cli {
    /// Increase log verbosity
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the managed directories to clients
    Serve {
        /// Server configuration file (TOML)
        #[arg(short, long, env = "SERVERSYNC_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Pull the server's managed files into the local root
    Pull {
        /// Client configuration file (TOML)
        #[arg(short, long, env = "SERVERSYNC_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn report_progress(progress: &ActionProgress) {
    if progress.is_complete() {
        tracing::debug!("{}: done", progress.path());
    } else if progress.is_started() {
        tracing::trace!("{}: {:.0}%", progress.path(), progress.progress() * 100.0);
    } else {
        tracing::debug!("{}: starting", progress.path());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Serve { config } => {
            let config = match config {
                Some(path) => ServerConfig::load(&path)
                    .with_context(|| format!("Failed to load {}", path.display()))?,
                None => ServerConfig::default(),
            };
            serversync::server::run_server(&config)
                .await
                .context("Server stopped")?;
        }
        Command::Pull { config } => {
            let config = match config {
                Some(path) => ClientConfig::load(&path)
                    .with_context(|| format!("Failed to load {}", path.display()))?,
                None => ClientConfig::default(),
            };
            let report = serversync::sync::sync_pull(&config, report_progress)
                .await
                .with_context(|| format!("Sync with {} failed", config.server))?;

            tracing::info!(
                "Updated {} files ({} bytes), {} already current",
                report.updated,
                report.bytes_transferred,
                report.skipped
            );
            if !report.is_clean() {
                anyhow::bail!("{} files failed: {}", report.failed.len(), report.failed.join(", "));
            }
        }
    }

    Ok(())
}
