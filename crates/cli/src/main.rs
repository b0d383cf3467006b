//! Barge client binary.

use anyhow::{Context, Result};
use barge_cli::api::ApiClient;
use barge_cli::engine::{EngineOptions, UploadEngine};
use barge_cli::progress::EngineEvent;
use barge_core::config::ClientConfig;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

/// Barge - resumable chunked file uploads
#[derive(Parser, Debug)]
#[command(name = "barge")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Barge server base URL
    #[arg(
        long,
        global = true,
        env = "BARGE_API_BASE_URL",
        default_value = "http://127.0.0.1:4000"
    )]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a file, resuming any previous attempt for the same file
    Upload {
        /// File to upload
        file: PathBuf,
        /// Chunk size in bytes
        #[arg(long)]
        chunk_size: Option<u64>,
        /// Maximum chunks in flight
        #[arg(long)]
        concurrency: Option<usize>,
        /// Retries per chunk before the transfer fails
        #[arg(long)]
        retries: Option<u32>,
    },
    /// Show the state of an upload
    Status {
        /// Upload ID returned by a previous upload
        upload_id: String,
    },
    /// Sweep stale uploads on the server
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = ClientConfig {
        base_url: cli.server.clone(),
        ..Default::default()
    };
    let api = ApiClient::new(
        &config.base_url,
        Duration::from_secs(config.request_timeout_secs),
    )?;

    match cli.command {
        Command::Upload {
            file,
            chunk_size,
            concurrency,
            retries,
        } => upload(api, config, file, chunk_size, concurrency, retries).await,
        Command::Status { upload_id } => {
            let state = api
                .get_state(&upload_id)
                .await
                .context("failed to query upload state")?;
            println!(
                "{} {} ({}/{} chunks)",
                state.upload_id,
                state.status,
                state.uploaded_chunks.len(),
                state.total_chunks
            );
            if let Some(hash) = state.final_hash {
                println!("sha256: {hash}");
            }
            Ok(())
        }
        Command::Cleanup => {
            let response = api.cleanup().await.context("cleanup request failed")?;
            println!("cleaned {} stale upload(s)", response.cleaned);
            Ok(())
        }
    }
}

async fn upload(
    api: ApiClient,
    config: ClientConfig,
    file: PathBuf,
    chunk_size: Option<u64>,
    concurrency: Option<usize>,
    retries: Option<u32>,
) -> Result<()> {
    let mut options = EngineOptions::from_config(&config);
    if let Some(chunk_size) = chunk_size {
        options.chunk_size = chunk_size;
    }
    if let Some(concurrency) = concurrency {
        options.max_concurrency = concurrency;
    }
    if let Some(retries) = retries {
        options.max_retries = retries;
    }

    let (engine, mut events) = UploadEngine::new(api, file, options);

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner} [{bar:40.green/blue}] {bytes}/{total_bytes} {msg}",
        )
        .expect("static progress template")
        .progress_chars("## "),
    );

    let render = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                EngineEvent::Progress(snapshot) => {
                    bar.set_length(snapshot.total_bytes);
                    bar.set_position(snapshot.uploaded_bytes);
                    bar.set_message(format!(
                        "{:?} {:.1} MiB/s eta {:.0}s",
                        snapshot.status, snapshot.speed_mbps, snapshot.eta_seconds
                    ));
                }
                EngineEvent::Completed(_) => {
                    bar.finish_with_message("done");
                }
                EngineEvent::Error(detail) => {
                    bar.abandon_with_message(detail);
                }
            }
        }
    });

    let result = engine.run().await;
    let _ = render.await;

    let response = result.context("upload failed")?;
    println!("upload {} {}", response.upload_id, response.status);
    println!("sha256: {}", response.hash);
    println!("archive entries:");
    for name in &response.zip_content {
        println!("  {name}");
    }
    Ok(())
}
