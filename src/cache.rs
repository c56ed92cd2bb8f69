use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry<T> {
    pub key: String,
    pub value: T,
}

#[derive(Debug)]
pub struct SlotCache<T> {
    path: Option<PathBuf>,
    slot: Option<CacheEntry<T>>,
}

impl<T> SlotCache<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    pub fn in_memory() -> Self {
        Self {
            path: None,
            slot: None,
        }
    }

    /// Opens a file-backed slot. A missing or unreadable file starts empty.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let slot = match load_entry(&path).await {
            Ok(Some(entry)) => {
                info!("Loaded cache slot '{}' from {:?}", entry.key, path);
                Some(entry)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Ignoring unreadable cache file {:?}: {:#}", path, e);
                None
            }
        };
        Self {
            path: Some(path),
            slot,
        }
    }

    /// The stored value if it was stored under `key`.
    pub fn get(&self, key: &str) -> Option<&T> {
        match &self.slot {
            Some(entry) if entry.key == key => Some(&entry.value),
            Some(entry) => {
                debug!("Cache slot stale: stored '{}', wanted '{}'", entry.key, key);
                None
            }
            None => None,
        }
    }

    pub fn stored_key(&self) -> Option<&str> {
        self.slot.as_ref().map(|e| e.key.as_str())
    }

    /// Overwrites the slot. The in-memory slot is updated even if the file
    /// write fails; the error is returned for the caller to log.
    pub async fn put(&mut self, key: &str, value: T) -> Result<()> {
        self.slot = Some(CacheEntry {
            key: key.to_string(),
            value,
        });
        let (Some(path), Some(entry)) = (&self.path, &self.slot) else {
            return Ok(());
        };
        let bytes = serde_json::to_vec(entry).context("Failed to serialize cache entry")?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create cache directory {:?}", parent))?;
        }
        tokio::fs::write(path, bytes)
            .await
            .with_context(|| format!("Failed to write cache file {:?}", path))?;
        Ok(())
    }

    /// Returns the cached value for `key`, or computes, stores and returns a
    /// fresh one. Callers must serialize access per slot (hold the slot's
    /// lock across the whole call).
    pub async fn get_or_compute<F, Fut>(&mut self, key: &str, compute: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        if let Some(hit) = self.get(key) {
            debug!("Cache hit for '{}'", key);
            return Ok(hit.clone());
        }
        let fresh = compute().await?;
        if let Err(e) = self.put(key, fresh.clone()).await {
            warn!("Failed to persist cache slot '{}': {:#}", key, e);
        }
        Ok(fresh)
    }
}

async fn load_entry<T: DeserializeOwned>(path: &Path) -> Result<Option<CacheEntry<T>>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
    };
    let entry = serde_json::from_slice(&bytes).context("Cache file is not a valid entry")?;
    Ok(Some(entry))
}
