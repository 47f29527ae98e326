//! On-disk layout of the mirror
//!
//! The store is the only durable state. Writes are additive; the only delete is
//! [`LocalStore::remove_item`], used by forced single-item re-fetches.

use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::types::ContentKind;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Paths and persistence helpers for the local mirror
#[derive(Clone, Debug)]
pub struct LocalStore {
    config: StorageConfig,
}

impl LocalStore {
    /// Create a store rooted at `config.data_dir`
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    /// Storage configuration
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Create every directory of the layout
    pub async fn ensure_layout(&self) -> Result<()> {
        for dir in [
            self.config.months_dir(),
            self.config.content_dir(),
            self.config.images_dir(),
        ] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| Error::persistence(&dir, e))?;
        }
        Ok(())
    }

    /// Persisted top-level index
    pub fn classify_file(&self) -> PathBuf {
        self.config.classify_file()
    }

    /// Persisted listing for one classification key
    pub fn listing_file(&self, key: &str) -> PathBuf {
        self.config.months_dir().join(format!("{key}.json"))
    }

    /// Body document of an item
    pub fn body_file(&self, kind: ContentKind, id: i64) -> PathBuf {
        self.config.content_dir().join(format!("{kind}_{id}.md"))
    }

    /// Metadata document of an item
    pub fn meta_file(&self, kind: ContentKind, id: i64) -> PathBuf {
        self.config.content_dir().join(format!("{kind}_{id}_meta.json"))
    }

    /// Image cache directory
    pub fn images_dir(&self) -> PathBuf {
        self.config.images_dir()
    }

    /// Load a JSON document; missing or unreadable documents are `None`
    pub async fn load_json(&self, path: &Path) -> Option<serde_json::Value> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read document");
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unparsable document");
                None
            }
        }
    }

    /// Write a pretty-printed JSON document, creating parent directories
    pub async fn save_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(path, &bytes).await
    }

    /// Write a text document, creating parent directories
    pub async fn save_text(&self, path: &Path, text: &str) -> Result<()> {
        self.write_bytes(path, text.as_bytes()).await
    }

    async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::persistence(parent, e))?;
        }
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| Error::persistence(path, e))?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Saved document");
        Ok(())
    }

    /// Whether an item has a valid body/metadata pair on disk
    ///
    /// Both files must exist, the body must be larger than `min_body_bytes`
    /// and the metadata larger than `min_meta_bytes`.
    pub async fn is_materialized(&self, kind: ContentKind, id: i64) -> bool {
        let body = file_size(&self.body_file(kind, id)).await;
        let meta = file_size(&self.meta_file(kind, id)).await;
        match (body, meta) {
            (Some(body), Some(meta)) => self.pair_is_valid(body, meta),
            _ => false,
        }
    }

    /// Threshold check shared with the verifier
    pub fn pair_is_valid(&self, body_len: u64, meta_len: u64) -> bool {
        body_len > self.config.min_body_bytes && meta_len > self.config.min_meta_bytes
    }

    /// Delete an item's body and metadata; missing files are not an error
    pub async fn remove_item(&self, kind: ContentKind, id: i64) -> Result<()> {
        for path in [self.body_file(kind, id), self.meta_file(kind, id)] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "Removed document"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::persistence(&path, e)),
            }
        }
        Ok(())
    }
}

async fn file_size(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path)
        .await
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.len())
}
