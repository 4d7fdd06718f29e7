//! mirage daemon binary entry point.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mirage_core::config::MirageConfig;
use mirage_daemon::Daemon;

/// mirage - adaptive deception honeypot.
#[derive(Parser, Debug)]
#[command(name = "mirage", version, about)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, default_value = "~/.config/mirage/config.toml")]
    config: String,

    /// Override the listen port from the config file.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter =
        EnvFilter::try_from_env("MIRAGE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config_path = expand_tilde(&args.config);
    tracing::info!(config = %config_path.display(), "mirage starting");

    let mut config = MirageConfig::load(&config_path).context("loading configuration")?;
    if let Some(port) = args.port {
        config.listen_port = port;
    }

    let daemon = Daemon::new(config)?;
    daemon.run().await
}

/// Expand `~` at the start of a path to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if path.starts_with("~/") || path == "~" {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(path.replacen('~', &home, 1));
        }
    }
    PathBuf::from(path)
}
