//! Blob storage for the Barge server.
//!
//! One blob per upload, assembled from chunks written at arbitrary offsets in
//! any order. The filesystem backend relies on sparse files: holes are legal
//! while an upload is in flight and read back as zeros.

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use error::{StorageError, StorageResult};
pub use traits::{BlobMeta, BlobStore, ByteStream};

use barge_core::config::StorageConfig;
use std::sync::Arc;

/// Create a blob store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn BlobStore>> {
    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend) as Arc<dyn BlobStore>)
        }
    }
}
