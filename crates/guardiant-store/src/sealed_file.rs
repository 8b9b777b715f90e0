//! File-backed store sealing every value with the device's state key.
//!
//! Each key maps to `<dir>/<key>.sealed`. Writes go to a temporary sibling
//! that is synced before it is renamed into place, and the directory is
//! synced after, so power loss leaves either the old or the new value.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use guardiant_crypto::sealing_key::SealingKey;
use tokio::io::AsyncWriteExt;

use crate::error::{StoreError, StoreResult};
use crate::traits::SecureKeyValueStore;

pub struct SealedFileStore {
    dir: PathBuf,
    key: SealingKey,
}

impl SealedFileStore {
    pub fn new(dir: impl Into<PathBuf>, key: SealingKey) -> Self {
        Self {
            dir: dir.into(),
            key,
        }
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.sealed")))
    }
}

/// Make a rename inside `dir` durable.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

#[async_trait]
impl SecureKeyValueStore for SealedFileStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        let blob = match tokio::fs::read(&path).await {
            Ok(blob) => blob,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(self.key.open(&blob)?))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        let path = self.path_for(key)?;
        let blob = self.key.seal(&value)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let tmp = path.with_extension("sealed.tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&blob).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &path).await?;
        sync_dir(&self.dir).await?;
        tracing::debug!("Sealed {} bytes under {key}", value.len());
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
