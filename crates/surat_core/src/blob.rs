//! Blob storage for attachments and signature images.
//!
//! Blobs are addressed by relative keys (`lampiran/<submission>/<attribute>/<file>`,
//! `ttd/<user>/<file>.png`). The key is what gets persisted, so rows stay valid
//! when the storage root moves.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

/// Error type for blob storage operations
#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid blob key: {0}")]
    InvalidKey(String),
}

impl From<BlobStoreError> for crate::error::SuratError {
    fn from(e: BlobStoreError) -> Self {
        Self::Internal(anyhow::Error::new(e))
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `content` under `key`, replacing any existing blob.
    async fn store(&self, key: &str, content: &[u8], content_type: &str)
        -> Result<(), BlobStoreError>;

    /// Idempotent: deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), BlobStoreError>;

    async fn exists(&self, key: &str) -> Result<bool, BlobStoreError>;
}

/// Reject keys that could escape the storage root.
pub fn check_key(key: &str) -> Result<(), BlobStoreError> {
    if key.is_empty() || key.contains('\\') || key.contains('\0') {
        return Err(BlobStoreError::InvalidKey(key.to_string()));
    }
    let path = Path::new(key);
    if !path
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(BlobStoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Local filesystem store rooted at `base_path`.
pub struct LocalBlobStore {
    base_path: PathBuf,
}

impl LocalBlobStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn path_for_key(&self, key: &str) -> Result<PathBuf, BlobStoreError> {
        check_key(key)?;
        Ok(self.base_path.join(key))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn store(
        &self,
        key: &str,
        content: &[u8],
        _content_type: &str,
    ) -> Result<(), BlobStoreError> {
        let path = self.path_for_key(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BlobStoreError> {
        let path = self.path_for_key(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobStoreError> {
        let path = self.path_for_key(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}
