use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{StoreError, StoreResult};

/// 100 MiB.
pub const DEFAULT_MAX_PACKAGE_SIZE: usize = 100 * 1024 * 1024;

const KIND: &str = "package content";

/// Binary package content keyed by package ID.
#[async_trait]
pub trait PackageContentStore: Send + Sync {
    /// Stores or replaces the content. Fails with `ContentTooLarge` above the limit.
    async fn put(&self, package_id: &str, content: &[u8]) -> StoreResult<()>;
    async fn get(&self, package_id: &str) -> StoreResult<Vec<u8>>;
    async fn delete(&self, package_id: &str) -> StoreResult<()>;
    async fn exists(&self, package_id: &str) -> StoreResult<bool>;
    fn max_size(&self) -> usize;
}

pub struct MemoryPackageContentStore {
    contents: RwLock<HashMap<String, Vec<u8>>>,
    max_size: usize,
}

impl Default for MemoryPackageContentStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PACKAGE_SIZE)
    }
}

impl MemoryPackageContentStore {
    pub fn new(max_size: usize) -> Self {
        Self {
            contents: RwLock::new(HashMap::new()),
            max_size,
        }
    }

    pub async fn total_bytes(&self) -> usize {
        self.contents.read().await.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl PackageContentStore for MemoryPackageContentStore {
    async fn put(&self, package_id: &str, content: &[u8]) -> StoreResult<()> {
        if content.len() > self.max_size {
            tracing::warn!(
                package_id = %package_id,
                size = content.len(),
                max = self.max_size,
                "Rejected oversized package content"
            );
            return Err(StoreError::ContentTooLarge {
                size: content.len(),
                max: self.max_size,
            });
        }
        self.contents
            .write()
            .await
            .insert(package_id.to_string(), content.to_vec());
        Ok(())
    }

    async fn get(&self, package_id: &str) -> StoreResult<Vec<u8>> {
        self.contents
            .read()
            .await
            .get(package_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: KIND,
                id: package_id.to_string(),
            })
    }

    async fn delete(&self, package_id: &str) -> StoreResult<()> {
        match self.contents.write().await.remove(package_id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound {
                kind: KIND,
                id: package_id.to_string(),
            }),
        }
    }

    async fn exists(&self, package_id: &str) -> StoreResult<bool> {
        Ok(self.contents.read().await.contains_key(package_id))
    }

    fn max_size(&self) -> usize {
        self.max_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_content_limit_is_inclusive() {
        let store = MemoryPackageContentStore::new(4);
        store.put("p1", b"1234").await.unwrap();

        let err = store.put("p2", b"12345").await.unwrap_err();
        assert_eq!(err, StoreError::ContentTooLarge { size: 5, max: 4 });
        assert!(!store.exists("p2").await.unwrap());
        assert_eq!(store.total_bytes().await, 4);
    }

    #[tokio::test]
    async fn test_content_lifecycle() {
        let store = MemoryPackageContentStore::default();
        assert_eq!(store.max_size(), DEFAULT_MAX_PACKAGE_SIZE);

        store.put("p1", b"chart").await.unwrap();
        store.put("p1", b"chart-v2").await.unwrap();
        assert_eq!(store.get("p1").await.unwrap(), b"chart-v2".to_vec());

        store.delete("p1").await.unwrap();
        assert!(matches!(
            store.get("p1").await.unwrap_err(),
            StoreError::NotFound { .. }
        ));
        assert!(matches!(
            store.delete("p1").await.unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }
}
