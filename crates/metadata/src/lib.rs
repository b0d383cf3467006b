//! Durable store for the Barge server.
//!
//! This crate provides the control-plane data model:
//! - Upload records with lifecycle status and final hash
//! - Per-chunk receipt records for resume and completeness checks
//! - The atomic single-winner UPLOADING -> PROCESSING transition

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use repos::{ChunkRepo, FinalizeClaim, UploadRepo};
pub use store::{MetadataStore, SqliteStore};

use barge_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
