use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{CachedLink, LinkStore, StoreError, hash_key};

/// one json file per key. writes go to a throwaway file first and get renamed over the real one
/// so a reader never sees half a record, and two writers on the same key just race to the last
/// rename.
pub struct FileLinkStore {
    dir: PathBuf,
    // held around the final rename of a put and around a purge's compare and remove, so a purge
    // can't take out a record that was renamed in after it looked
    swap: Mutex<()>,
}

impl FileLinkStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        info!("File link store ready at {}", dir.display());

        Ok(Self {
            dir,
            swap: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hash_key(key)))
    }
}

#[async_trait]
impl LinkStore for FileLinkStore {
    async fn get(&self, key: &str) -> Result<Option<CachedLink>, StoreError> {
        match tokio::fs::read(self.record_path(key)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, link: &CachedLink) -> Result<(), StoreError> {
        let path = self.record_path(&link.key);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", hash_key(&link.key), nanoid::nanoid!()));

        let bytes = serde_json::to_vec(link)?;
        tokio::fs::write(&tmp, &bytes).await?;

        let renamed = {
            let _swap = self.swap.lock().await;
            tokio::fs::rename(&tmp, &path).await
        };
        if let Err(e) = renamed {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!("Wrote link record {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    async fn purge(&self, stale: &CachedLink) -> Result<bool, StoreError> {
        let _swap = self.swap.lock().await;

        // a record we can't parse is no use to anyone either
        let current = match self.get(&stale.key).await {
            Ok(current) => current,
            Err(StoreError::Corrupt(_)) => None,
            Err(e) => return Err(e),
        };
        if current.as_ref().is_some_and(|current| current != stale) {
            debug!("Link record for {} was rewritten, not purging", stale.key);
            return Ok(false);
        }

        match tokio::fs::remove_file(self.record_path(&stale.key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn health_check(&self) -> Result<f64, StoreError> {
        let start = Instant::now();
        let metadata = tokio::fs::metadata(&self.dir).await?;
        if !metadata.is_dir() {
            return Err(StoreError::Io(std::io::Error::new(
                ErrorKind::NotADirectory,
                format!("{} is not a directory", self.dir.display()),
            )));
        }
        Ok(start.elapsed().as_secs_f64() * 1000.0)
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}
