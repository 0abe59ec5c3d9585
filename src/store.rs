//! Persistent key → media mapping.
//!
//! The store is a flat JSON file: the whole map is loaded once at startup
//! and rewritten in full on every insertion. Lookups are served from
//! memory; a failed write leaves memory ahead of disk until the next
//! successful persist.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Kind of a stored media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

/// Stored reference to one uploaded media item.
///
/// `file_id` is the platform-issued reference and is only meaningful to
/// the bot that received the upload. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    /// Platform-issued media reference
    pub file_id: String,
    /// Photo or video, decides which send method delivery uses
    #[serde(rename = "type")]
    pub kind: MediaKind,
}

/// Capability interface over the key store.
///
/// Handlers depend on this trait rather than on the JSON file directly so
/// the backing store can later move to an embedded database without
/// touching call sites.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Pure lookup; no side effects.
    async fn get(&self, key: &str) -> Option<MediaDescriptor>;

    /// Inserts the descriptor and persists the whole map.
    ///
    /// A persistence failure is logged and absorbed: the in-memory
    /// insertion always survives, leaving memory ahead of disk until the
    /// next successful write.
    async fn put(&self, key: String, descriptor: MediaDescriptor);

    /// Rewrites the whole map to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the file write fails.
    async fn persist(&self) -> Result<(), StoreError>;

    /// Number of stored entries.
    async fn len(&self) -> usize;
}

/// [`MediaStore`] backed by a single pretty-printed JSON file.
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, MediaDescriptor>>,
}

impl JsonFileStore {
    /// Loads the store from `path`, failing soft: a missing file is seeded
    /// with an empty map, an unreadable or unparseable file is logged and
    /// treated as empty. Startup never aborts on store problems.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(e) => {
                    error!("Failed to parse key store {}: {e}", path.display());
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Err(e) = tokio::fs::write(&path, "{}").await {
                    warn!("Failed to seed key store {}: {e}", path.display());
                }
                HashMap::new()
            }
            Err(e) => {
                error!("Failed to read key store {}: {e}", path.display());
                HashMap::new()
            }
        };

        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    async fn write_snapshot(
        &self,
        snapshot: &HashMap<String, MediaDescriptor>,
    ) -> Result<(), StoreError> {
        // Non-ASCII survives as-is: serde_json never escapes above-ASCII
        // code points.
        let body = serde_json::to_string_pretty(snapshot)?;
        tokio::fs::write(&self.path, body).await?;
        Ok(())
    }
}

#[async_trait]
impl MediaStore for JsonFileStore {
    async fn get(&self, key: &str) -> Option<MediaDescriptor> {
        self.entries.read().await.get(key).cloned()
    }

    async fn put(&self, key: String, descriptor: MediaDescriptor) {
        // Snapshot under the write lock so the file never sees a torn map;
        // the write itself happens outside the lock.
        let snapshot = {
            let mut entries = self.entries.write().await;
            entries.insert(key, descriptor);
            entries.clone()
        };

        if let Err(e) = self.write_snapshot(&snapshot).await {
            error!("Failed to persist key store {}: {e}", self.path.display());
        }
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let snapshot = self.entries.read().await.clone();
        self.write_snapshot(&snapshot).await
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
