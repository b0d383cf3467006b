//! Application state shared across handlers.

use barge_core::config::AppConfig;
use barge_metadata::MetadataStore;
use barge_storage::BlobStore;
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Blob storage backend.
    pub storage: Arc<dyn BlobStore>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            storage,
            metadata,
        }
    }
}

/// Storage key for an upload's blob file.
pub fn blob_key(upload_id: Uuid) -> String {
    format!("{upload_id}.bin")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_key_is_stable() {
        let id = Uuid::nil();
        assert_eq!(blob_key(id), "00000000-0000-0000-0000-000000000000.bin");
    }
}
