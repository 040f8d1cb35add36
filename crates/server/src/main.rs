use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

mod api;
mod config;

use config::ServerConfig;

#[derive(Parser, Debug)]
#[command(name = "weir")]
#[command(about = "Declarative workflow execution engine", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "weir.toml")]
    config: PathBuf,

    /// Path to a KEY=VALUE env file loaded before startup
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "WEIR_PORT")]
    port: Option<u16>,

    /// Host to bind to (overrides the config file)
    #[arg(long)]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weir=info,tower_http=debug".into()),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    tracing::info!("Starting weir workflow engine");

    // Export .env entries before anything reads the environment; outbound
    // call steps substitute ${VAR} references from it.
    if let Err(e) = config::load_env_file(&args.env_file) {
        tracing::warn!("Could not load env file {}: {}", args.env_file.display(), e);
    }

    let mut config = ServerConfig::load(&args.config)?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Starting API server on {}", addr);

    api::serve(&addr).await?;

    Ok(())
}
