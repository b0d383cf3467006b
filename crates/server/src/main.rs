//! Barge server binary.

use anyhow::{Context, Result};
use barge_core::config::AppConfig;
use barge_server::{AppState, create_router, sweep};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Barge - resumable chunked file transfer server
#[derive(Parser, Debug)]
#[command(name = "barged")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "BARGE_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Barge v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (file is optional, env vars can provide/override everything)
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();

    if has_config_file {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with("BARGE_") && key != "BARGE_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: barged --config /path/to/config.toml\n  \
             2. Environment variables: BARGE_SERVER__BIND=0.0.0.0:4000 \
             BARGE_STORAGE__TYPE=filesystem BARGE_STORAGE__PATH=/var/lib/barge/blobs \
             BARGE_METADATA__TYPE=sqlite BARGE_METADATA__PATH=/var/lib/barge/barge.db barged"
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("BARGE_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    barge_server::metrics::register_metrics();

    let storage = barge_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    tracing::info!(backend = storage.backend_name(), "Storage backend initialized");

    let metadata = barge_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    metadata
        .health_check()
        .await
        .context("metadata health check failed")?;
    tracing::info!("Metadata store initialized");

    let state = AppState::new(config.clone(), storage, metadata);

    if let Some(_handle) = sweep::spawn_sweeper(state.clone()) {
        tracing::info!(
            interval_secs = config.server.sweep_interval_secs,
            stale_ttl_secs = config.server.stale_ttl_secs,
            "Background sweeper spawned"
        );
    }

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
