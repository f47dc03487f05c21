//! In-memory durable store.
//!
//! A HashMap-backed `DurableStore` for tests and embedded use. Supports a
//! failure toggle so callers can exercise `StoreUnavailable` paths.

use async_trait::async_trait;
use serde_json::Value;
use silo_core::error::{Result, SiloError};
use silo_core::store::{DurableStore, StoreOp};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-memory store. "Durable" only for the lifetime of the instance; tests
/// simulate restarts by reloading registries over the same instance.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, Value>>,
    fail_commits: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// When `true`, every subsequent commit fails with `StoreUnavailable`
    /// and leaves the records untouched.
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn commit(&self, batch: Vec<StoreOp>) -> Result<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(SiloError::store_unavailable("memory store rejected write"));
        }

        let mut records = self.records.lock().unwrap();
        for op in batch {
            match op {
                StoreOp::Put { key, value } => {
                    records.insert(key, value);
                }
                StoreOp::Delete { key } => {
                    records.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.records.lock().unwrap().get(key).cloned())
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<(String, Value)>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
