//! Local filesystem blob store backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{BlobMeta, BlobStore, ByteStream};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tracing::instrument;

/// Default chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Local filesystem blob store.
///
/// One file per blob key under the root directory. Positional writes rely on
/// the filesystem's sparse-file semantics: a write past the current end
/// extends the file, and unwritten ranges below it read as zeros.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Get the full path for a key, rejecting traversal attempts.
    ///
    /// Keys are server-generated (`{upload_id}.bin`), but validation stays in
    /// place so the backend is safe with any caller.
    fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }

        for component in Path::new(key).components() {
            match component {
                std::path::Component::Normal(_) => {}
                _ => {
                    return Err(StorageError::InvalidKey(format!(
                        "contains unsafe path component: {key}"
                    )));
                }
            }
        }

        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn create(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key)?;
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key)?;
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn head(&self, key: &str) -> StorageResult<BlobMeta> {
        let path = self.key_path(key)?;
        let metadata = fs::metadata(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;

        Ok(BlobMeta {
            size: metadata.len(),
            last_modified: metadata.modified().ok().map(|t| t.into()),
        })
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", len = data.len()))]
    async fn write_at(&self, key: &str, offset: u64, data: Bytes) -> StorageResult<()> {
        let path = self.key_path(key)?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await?;

        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn read_stream(&self, key: &str) -> StorageResult<ByteStream> {
        use tokio::io::AsyncReadExt;

        let path = self.key_path(key)?;
        let file = fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;

        // Stream the file in bounded buffers instead of loading it into memory
        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Box::pin(stream))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn open_std(&self, key: &str) -> StorageResult<std::fs::File> {
        let path = self.key_path(key)?;
        let owned_key = key.to_string();
        tokio::task::spawn_blocking(move || {
            std::fs::File::open(&path).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    StorageError::NotFound(owned_key)
                } else {
                    StorageError::Io(e)
                }
            })
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}"))))?
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tempfile::tempdir;

    async fn collect(mut stream: ByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(piece) = stream.next().await {
            out.extend_from_slice(&piece.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn create_is_idempotent_on_existing() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();

        assert!(backend.create("a.bin").await.unwrap());
        assert!(!backend.create("a.bin").await.unwrap());
        assert!(backend.exists("a.bin").await.unwrap());
    }

    #[tokio::test]
    async fn out_of_order_writes_assemble() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();

        backend
            .write_at("b.bin", 6, Bytes::from_static(b"world"))
            .await
            .unwrap();
        backend
            .write_at("b.bin", 0, Bytes::from_static(b"hello "))
            .await
            .unwrap();

        let data = collect(backend.read_stream("b.bin").await.unwrap()).await;
        assert_eq!(data, b"hello world");
    }

    #[tokio::test]
    async fn sparse_hole_reads_as_zeros() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();

        backend
            .write_at("c.bin", 4, Bytes::from_static(b"x"))
            .await
            .unwrap();

        let data = collect(backend.read_stream("c.bin").await.unwrap()).await;
        assert_eq!(data, [0, 0, 0, 0, b'x']);
        assert_eq!(backend.head("c.bin").await.unwrap().size, 5);
    }

    #[tokio::test]
    async fn overlapping_write_is_last_write_wins() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();

        backend
            .write_at("d.bin", 0, Bytes::from_static(b"aaaa"))
            .await
            .unwrap();
        backend
            .write_at("d.bin", 1, Bytes::from_static(b"bb"))
            .await
            .unwrap();

        let data = collect(backend.read_stream("d.bin").await.unwrap()).await;
        assert_eq!(data, b"abba");
    }

    #[tokio::test]
    async fn read_stream_spans_multiple_buffers() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();

        let payload = vec![7u8; STREAM_CHUNK_SIZE * 2 + 123];
        backend
            .write_at("e.bin", 0, Bytes::from(payload.clone()))
            .await
            .unwrap();

        let data = collect(backend.read_stream("e.bin").await.unwrap()).await;
        assert_eq!(data, payload);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();

        backend.create("f.bin").await.unwrap();
        backend.delete("f.bin").await.unwrap();
        backend.delete("f.bin").await.unwrap();
        assert!(!backend.exists("f.bin").await.unwrap());
    }

    #[tokio::test]
    async fn rejects_traversal_keys() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();

        for key in ["../escape.bin", "/abs.bin", "a/../../b", ""] {
            assert!(matches!(
                backend.exists(key).await,
                Err(StorageError::InvalidKey(_))
            ));
        }
    }

    #[tokio::test]
    async fn open_std_reads_written_bytes() {
        use std::io::Read;

        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();

        backend
            .write_at("g.bin", 0, Bytes::from_static(b"sync view"))
            .await
            .unwrap();

        let mut file = backend.open_std("g.bin").await.unwrap();
        let mut contents = String::new();
        file.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "sync view");
    }

    #[tokio::test]
    async fn missing_blob_errors() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();

        assert!(matches!(
            backend.head("missing.bin").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            backend.read_stream("missing.bin").await,
            Err(StorageError::NotFound(_))
        ));
    }
}
