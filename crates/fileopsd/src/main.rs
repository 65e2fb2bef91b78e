//! fileopsd — serves positioned block reads of local files over TCP.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use fileops_core::config::ServerConfig;

#[derive(Parser, Debug)]
#[command(name = "fileopsd", version, about = "Block-oriented remote file read server")]
struct Args {
    /// Config file (default: $FILEOPS_CONFIG or ~/.config/fileops/server.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the config file
    #[arg(short, long)]
    listen: Option<String>,

    /// Confine requested paths to this directory
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Do not start the HTTP status API
    #[arg(long)]
    no_api: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(ServerConfig::file_path);
    if let Err(e) = ServerConfig::write_default_if_missing(&config_path) {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = ServerConfig::load_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    if let Some(listen) = args.listen {
        config.network.listen_addr = listen;
    }
    if let Some(root) = args.root {
        config.files.root_dir = root;
    }
    if args.no_api {
        config.network.api_enabled = false;
    }

    let fs = fileopsd::filesystem_for(&config.files)?;
    let server = fileopsd::start(&config, fs).await?;

    {
        let shutdown = server.shutdown_sender();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    server.wait().await;
    tracing::info!("fileopsd stopped");
    Ok(())
}
