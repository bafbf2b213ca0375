//! Durable key → bytes mapping over hash-sharded file paths.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWriteExt};

use crate::error::StoreError;
use crate::path::{path_for, PathKey};

/// Content-addressable store rooted at a single directory.
///
/// Safe for concurrent access across distinct keys. Concurrent writers to
/// the same key race at the byte level (last write wins).
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn locate(&self, key: &str) -> (PathKey, PathBuf) {
        let path_key = path_for(key);
        let full = path_key.full_path(&self.root);
        (path_key, full)
    }

    /// Whether content for `key` exists on disk.
    pub async fn has(&self, key: &str) -> bool {
        let (_, full) = self.locate(key);
        fs::metadata(&full).await.is_ok()
    }

    /// Write everything `reader` yields under `key`, returning the number
    /// of bytes written.
    pub async fn write<R>(&self, key: &str, reader: &mut R) -> Result<u64, StoreError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let (path_key, full) = self.locate(key);
        fs::create_dir_all(self.root.join(&path_key.dir)).await?;

        let mut file = File::create(&full).await?;
        let written = tokio::io::copy(reader, &mut file).await?;
        file.flush().await?;

        tracing::debug!(bytes = written, path = %full.display(), "written to disk");
        Ok(written)
    }

    /// Read the full content for `key`.
    pub async fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let (_, full) = self.locate(key);
        fs::read(&full).await.map_err(|e| not_found(e, key))
    }

    /// Open the content for `key` for streaming, returning its size and
    /// an open file handle.
    pub async fn open(&self, key: &str) -> Result<(u64, File), StoreError> {
        let (_, full) = self.locate(key);
        let meta = fs::metadata(&full).await.map_err(|e| not_found(e, key))?;
        let file = File::open(&full).await.map_err(|e| not_found(e, key))?;
        Ok((meta.len(), file))
    }

    /// Remove the content for `key`.
    ///
    /// Removes the key's entire top-level shard directory, so any other
    /// key sharing the same first shard segment is removed with it. With
    /// 5-hex-character shards a collision takes ~2^20 keys, but the risk
    /// exists.
    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let (path_key, _) = self.locate(key);
        let shard = self.root.join(path_key.first_shard());
        fs::remove_dir_all(&shard).await?;

        tracing::debug!(file = %path_key.filename, "deleted from disk");
        Ok(())
    }

    /// Remove the entire store root.
    pub async fn clear(&self) -> Result<(), StoreError> {
        fs::remove_dir_all(&self.root).await?;
        Ok(())
    }
}

fn not_found(err: std::io::Error, key: &str) -> StoreError {
    if err.kind() == ErrorKind::NotFound {
        StoreError::NotFound(key.to_string())
    } else {
        StoreError::Io(err)
    }
}
