//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:4000").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Default chunk size in bytes, used when the client does not negotiate one.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Maximum chunk size a client may negotiate.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u64,
    /// Age in seconds after which an UPLOADING upload with no activity is
    /// considered stale and swept.
    #[serde(default = "default_stale_ttl_secs")]
    pub stale_ttl_secs: u64,
    /// Interval in seconds between background sweep runs. Zero disables the
    /// background sweeper (the DELETE /api/files endpoint still works).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Enable the /metrics endpoint for Prometheus scraping.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:4000".to_string()
}

fn default_chunk_size() -> u64 {
    crate::DEFAULT_CHUNK_SIZE
}

fn default_max_chunk_size() -> u64 {
    crate::MAX_CHUNK_SIZE
}

fn default_stale_ttl_secs() -> u64 {
    86400 // 24 hours
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            chunk_size: default_chunk_size(),
            max_chunk_size: default_max_chunk_size(),
            stale_ttl_secs: default_stale_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    /// Get the stale-upload TTL as a Duration.
    pub fn stale_ttl(&self) -> Duration {
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        let secs = i64::try_from(self.stale_ttl_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }
}

/// Blob storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Directory holding one blob file per upload.
        path: PathBuf,
    },
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database file.
    Sqlite { path: PathBuf },
}

/// Top-level server application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub metadata: MetadataConfig,
}

/// Client engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the Barge server.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Chunk size in bytes for the upload plan.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Maximum chunk PUTs in flight at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Retries per chunk before the transfer fails.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Per-request timeout in seconds for chunk PUTs.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:4000".to_string()
}

fn default_max_concurrency() -> usize {
    3
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chunk_size: default_chunk_size(),
            max_concurrency: default_max_concurrency(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}
