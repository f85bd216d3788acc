use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::record::{Record, RecordClient};
use crate::adapters::{AdapterError, AdapterResult};

/// In-process record store, keyed by `(namespace, name)`.
#[derive(Default)]
pub struct MemoryRecordClient {
    records: RwLock<BTreeMap<(String, String), Record>>,
    unreachable: Option<String>,
    initialize_calls: AtomicUsize,
}

impl MemoryRecordClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client whose connection attempt always fails with `reason`.
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self {
            unreachable: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn initialize_count(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Direct write that bypasses the adapter, for seeding or corrupting records.
    pub async fn put(&self, record: Record) {
        self.records
            .write()
            .await
            .insert((record.namespace.clone(), record.name.clone()), record);
    }
}

#[async_trait]
impl RecordClient for MemoryRecordClient {
    async fn initialize(&self) -> AdapterResult<()> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        match &self.unreachable {
            Some(reason) => Err(AdapterError::ConnectionFailed(reason.clone())),
            None => Ok(()),
        }
    }

    async fn get(&self, namespace: &str, name: &str) -> AdapterResult<Option<Record>> {
        let key = (namespace.to_string(), name.to_string());
        Ok(self.records.read().await.get(&key).cloned())
    }

    async fn create(&self, record: &Record) -> AdapterResult<()> {
        let key = (record.namespace.clone(), record.name.clone());
        let mut records = self.records.write().await;
        if records.contains_key(&key) {
            return Err(AdapterError::AlreadyExists {
                kind: "record",
                id: record.name.clone(),
            });
        }
        records.insert(key, record.clone());
        Ok(())
    }

    async fn replace(&self, record: &Record) -> AdapterResult<()> {
        let key = (record.namespace.clone(), record.name.clone());
        let mut records = self.records.write().await;
        match records.get_mut(&key) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(AdapterError::NotFound {
                kind: "record",
                id: record.name.clone(),
            }),
        }
    }

    async fn delete(&self, namespace: &str, name: &str) -> AdapterResult<bool> {
        let key = (namespace.to_string(), name.to_string());
        Ok(self.records.write().await.remove(&key).is_some())
    }

    async fn list(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
        limit: Option<usize>,
    ) -> AdapterResult<Vec<Record>> {
        let records = self.records.read().await;
        let matching = records
            .iter()
            .filter(|((ns, _), record)| ns == namespace && record.matches(selector))
            .map(|(_, record)| record.clone())
            .take(limit.unwrap_or(usize::MAX))
            .collect();
        Ok(matching)
    }

    async fn close(&self) -> AdapterResult<()> {
        Ok(())
    }
}
