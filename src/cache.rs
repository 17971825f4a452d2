//! Single-slot, same-day cache of the last extraction result.

use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::deals::ResponseData;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("cache file is not valid response data: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct ResponseCache {
    path: PathBuf,
}

impl ResponseCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the cached result only if it was produced on `today`.
    /// Missing or unreadable files count as "no cache".
    pub async fn load_fresh(&self, today: NaiveDate) -> Option<ResponseData> {
        let data = match self.read().await {
            Ok(data) => data,
            Err(CacheError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no local cache file");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable cache file");
                return None;
            }
        };

        if data.last_updated == today {
            info!(path = %self.path.display(), "local cache is up to date");
            Some(data)
        } else {
            debug!(cached = %data.last_updated, %today, "local cache is stale");
            None
        }
    }

    async fn read(&self) -> Result<ResponseData, CacheError> {
        let content = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&content)?)
    }

    /// Overwrites the cache slot with `data`.
    pub async fn store(&self, data: &ResponseData) -> Result<(), CacheError> {
        let json = serde_json::to_vec_pretty(data)?;
        tokio::fs::write(&self.path, json).await?;
        info!(path = %self.path.display(), offers = data.offers.len(), "wrote cache file");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn scratch_path(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "melon-deals-{label}-{}-{}.json",
        std::process::id(),
        fastrand::u64(..)
    ))
}
