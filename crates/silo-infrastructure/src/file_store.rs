//! File-backed durable store.
//!
//! Implements the `DurableStore` contract over a single atomically replaced
//! JSON document, so a batch commit is genuinely all-or-nothing: either the
//! rename lands with every operation applied, or the previous document stays
//! in place untouched.

use crate::atomic_file::AtomicJsonFile;
use crate::paths::SiloPaths;
use async_trait::async_trait;
use serde_json::Value;
use silo_core::error::{Result, SiloError};
use silo_core::store::{DurableStore, StoreOp};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// The on-disk document: every record keyed by its store key.
type Document = BTreeMap<String, Value>;

/// Crash-durable store over one atomic JSON document file.
#[derive(Clone)]
pub struct FileStore {
    file: AtomicJsonFile<Document>,
}

impl FileStore {
    /// Creates a file store at `path`. The file is created on first commit.
    pub fn new(path: PathBuf) -> Self {
        Self {
            file: AtomicJsonFile::new(path),
        }
    }

    /// Creates a file store at the platform default location
    /// (`<config_dir>/silo/store.json`).
    ///
    /// # Errors
    ///
    /// Returns an error if the platform config directory cannot be
    /// determined.
    pub fn default_location() -> Result<Self> {
        Ok(Self::new(SiloPaths::store_path()?))
    }
}

#[async_trait]
impl DurableStore for FileStore {
    async fn commit(&self, batch: Vec<StoreOp>) -> Result<()> {
        let file = self.file.clone();
        let count = batch.len();

        tokio::task::spawn_blocking(move || {
            file.update(Document::new(), |doc| {
                for op in batch {
                    match op {
                        StoreOp::Put { key, value } => {
                            doc.insert(key, value);
                        }
                        StoreOp::Delete { key } => {
                            doc.remove(&key);
                        }
                    }
                }
                Ok(())
            })
        })
        .await
        .map_err(|e| SiloError::internal(format!("store task panicked: {e}")))?
        .map_err(|e| SiloError::store_unavailable(e.to_string()))?;

        tracing::debug!("committed batch of {} operations", count);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let file = self.file.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || {
            let doc = file.load()?.unwrap_or_default();
            Ok(doc.get(&key).cloned())
        })
        .await
        .map_err(|e| SiloError::internal(format!("store task panicked: {e}")))?
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<(String, Value)>> {
        let file = self.file.clone();
        let prefix = prefix.to_string();

        tokio::task::spawn_blocking(move || {
            let doc = file.load()?.unwrap_or_default();
            Ok(doc
                .range(prefix.clone()..)
                .take_while(|(k, _)| k.starts_with(&prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect())
        })
        .await
        .map_err(|e| SiloError::internal(format!("store task panicked: {e}")))?
    }
}
