//! Durable store contract.
//!
//! Defines the transactional key/value persistence abstraction the registry
//! and reconciliation engine commit through, plus the two-tier wrapper that
//! layers a process-lifetime read cache over the crash-durable tier.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A single operation inside a store batch.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    /// Insert or replace the value at `key`.
    Put { key: String, value: Value },
    /// Remove `key` (a tombstone; absent keys delete to a no-op).
    Delete { key: String },
}

impl StoreOp {
    /// Creates a put operation.
    pub fn put(key: impl Into<String>, value: Value) -> Self {
        Self::Put {
            key: key.into(),
            value,
        }
    }

    /// Creates a delete operation.
    pub fn delete(key: impl Into<String>) -> Self {
        Self::Delete { key: key.into() }
    }

    /// Returns the key this operation targets.
    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// An abstract transactional key/value store.
///
/// This trait defines the contract for the crash-durable persistence tier,
/// decoupling the domain logic from the specific storage mechanism
/// (e.g., an atomic JSON file, an in-memory test double).
///
/// # Contract
///
/// - `commit` applies the whole batch or none of it, and the data is durable
///   before the call returns. A failed commit leaves the store exactly as it
///   was; callers must not assume partial writes occurred.
/// - `get` and `scan` are read-only and reflect the last successful commit.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Atomically applies a batch of puts and deletes.
    ///
    /// # Errors
    ///
    /// Returns `SiloError::StoreUnavailable` if the underlying medium rejects
    /// the write.
    async fn commit(&self, batch: Vec<StoreOp>) -> Result<()>;

    /// Reads the value at `key`, if present.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Lists all `(key, value)` pairs whose key starts with `prefix`,
    /// ordered by key.
    async fn scan(&self, prefix: &str) -> Result<Vec<(String, Value)>>;
}

/// Two-tier store: a crash-durable source of truth fronted by a
/// process-lifetime warm cache.
///
/// Every mutation lands on the durable tier synchronously before the cache
/// is updated, so a crash between the two loses only the warm cache. The
/// cache is constructed empty on every process start and is never reconciled
/// against the durable tier; it is simply repopulated on read misses.
pub struct TieredStore {
    durable: Arc<dyn DurableStore>,
    /// `Some(value)` = cached present, `None` = cached known-absent.
    cache: RwLock<HashMap<String, Option<Value>>>,
}

impl TieredStore {
    /// Creates a tiered store with an empty warm cache over `durable`.
    pub fn new(durable: Arc<dyn DurableStore>) -> Self {
        Self {
            durable,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Drops the entire warm cache. The durable tier is untouched.
    pub async fn discard_cache(&self) {
        self.cache.write().await.clear();
    }
}

#[async_trait]
impl DurableStore for TieredStore {
    async fn commit(&self, batch: Vec<StoreOp>) -> Result<()> {
        // Durable tier first. If this fails the cache is left untouched and
        // the caller sees the store exactly as before.
        self.durable.commit(batch.clone()).await?;

        let mut cache = self.cache.write().await;
        for op in batch {
            match op {
                StoreOp::Put { key, value } => {
                    cache.insert(key, Some(value));
                }
                StoreOp::Delete { key } => {
                    cache.insert(key, None);
                }
            }
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(key) {
                return Ok(cached.clone());
            }
        }

        let value = self.durable.get(key).await?;
        let mut cache = self.cache.write().await;
        cache.insert(key.to_string(), value.clone());
        Ok(value)
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<(String, Value)>> {
        // Scans always consult the durable tier: the cache indexes single
        // keys and cannot answer "every key under this prefix".
        let entries = self.durable.scan(prefix).await?;

        let mut cache = self.cache.write().await;
        for (key, value) in &entries {
            cache.insert(key.clone(), Some(value.clone()));
        }
        Ok(entries)
    }
}
