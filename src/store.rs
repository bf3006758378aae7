//! Local blob stores keyed by string.

use crate::error::BlobStoreError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

const ZSTD_LEVEL: i32 = 5;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn has(&self, key: &str) -> Result<bool, BlobStoreError>;

    /// Fails with [`BlobStoreError::NotFound`] when nothing is stored under `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobStoreError>;

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), BlobStoreError>;
}

pub async fn get_json<T: DeserializeOwned>(
    store: &dyn BlobStore,
    key: &str,
) -> Result<T, BlobStoreError> {
    let bytes = store.get(key).await?;
    serde_json::from_slice(&bytes).map_err(|source| BlobStoreError::Codec {
        key: key.to_string(),
        source,
    })
}

pub async fn put_json<T: Serialize + ?Sized>(
    store: &dyn BlobStore,
    key: &str,
    value: &T,
) -> Result<(), BlobStoreError> {
    let bytes = serde_json::to_vec(value).map_err(|source| BlobStoreError::Codec {
        key: key.to_string(),
        source,
    })?;
    store.put(key, bytes).await
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn has(&self, key: &str) -> Result<bool, BlobStoreError> {
        Ok(self.blobs.read().contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobStoreError> {
        self.blobs
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), BlobStoreError> {
        self.blobs.write().insert(key.to_string(), value);
        Ok(())
    }
}

/// One zstd-compressed file per key under a root directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.zst", sanitize_key(key)))
    }
}

fn sanitize_key(key: &str) -> String {
    let sanitized: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized
    }
}

fn io_error(key: &str, source: io::Error) -> BlobStoreError {
    BlobStoreError::Io {
        key: key.to_string(),
        source,
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn has(&self, key: &str) -> Result<bool, BlobStoreError> {
        tokio::fs::try_exists(self.path_for(key))
            .await
            .map_err(|err| io_error(key, err))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobStoreError> {
        let compressed = match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(BlobStoreError::NotFound(key.to_string()));
            }
            Err(err) => return Err(io_error(key, err)),
        };
        zstd::decode_all(compressed.as_slice()).map_err(|err| io_error(key, err))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), BlobStoreError> {
        let compressed =
            zstd::encode_all(value.as_slice(), ZSTD_LEVEL).map_err(|err| io_error(key, err))?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|err| io_error(key, err))?;
        let path = self.path_for(key);
        let staging = path.with_extension("zst.tmp");
        tokio::fs::write(&staging, compressed)
            .await
            .map_err(|err| io_error(key, err))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|err| io_error(key, err))
    }
}
