use super::{Store, StoreError, StoreResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// In-process store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, Value>>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with `Unavailable` while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::unavailable("memory store is offline"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        self.check_online()?;
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, record: Value) -> StoreResult<()> {
        self.check_online()?;
        self.records.write().await.insert(key.to_string(), record);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.check_online()?;
        Ok(self.records.write().await.remove(key).is_some())
    }

    async fn list_keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        self.check_online()?;
        Ok(self
            .records
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn compare_and_put(
        &self,
        key: &str,
        expected: &Value,
        record: Value,
    ) -> StoreResult<bool> {
        self.check_online()?;
        let mut records = self.records.write().await;
        match records.get(key) {
            Some(current) if current == expected => {
                records.insert(key.to_string(), record);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
