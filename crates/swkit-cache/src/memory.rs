//! In-memory cache store.

use async_trait::async_trait;
use hashbrown::HashMap;
use tokio::sync::RwLock;
use tracing::trace;

use crate::{CacheEntry, CacheResult, CacheStore, RequestKey};

/// A single partition.
#[derive(Debug, Default)]
struct Partition {
    name: String,
    entries: HashMap<RequestKey, CacheEntry>,
    order: Vec<RequestKey>,
}

impl Partition {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn put(&mut self, key: &RequestKey, entry: CacheEntry) {
        if self.entries.insert(key.clone(), entry).is_some() {
            self.order.retain(|k| k != key);
        }
        self.order.push(key.clone());
    }
}

/// [`CacheStore`] that lives for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    partitions: RwLock<Vec<Partition>>,
}

impl MemoryCacheStore {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of entries across every partition.
    pub async fn len(&self) -> usize {
        self.partitions
            .read()
            .await
            .iter()
            .map(|p| p.entries.len())
            .sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn open(&self, partition: &str) -> CacheResult<()> {
        let mut partitions = self.partitions.write().await;
        if !partitions.iter().any(|p| p.name == partition) {
            trace!(partition, "Creating partition");
            partitions.push(Partition::new(partition));
        }
        Ok(())
    }

    async fn has(&self, partition: &str) -> CacheResult<bool> {
        Ok(self.partitions.read().await.iter().any(|p| p.name == partition))
    }

    async fn partitions(&self) -> CacheResult<Vec<String>> {
        Ok(self
            .partitions
            .read()
            .await
            .iter()
            .map(|p| p.name.clone())
            .collect())
    }

    async fn delete(&self, partition: &str) -> CacheResult<bool> {
        let mut partitions = self.partitions.write().await;
        let before = partitions.len();
        partitions.retain(|p| p.name != partition);
        Ok(partitions.len() != before)
    }

    async fn match_request(
        &self,
        partition: &str,
        key: &RequestKey,
    ) -> CacheResult<Option<CacheEntry>> {
        Ok(self
            .partitions
            .read()
            .await
            .iter()
            .find(|p| p.name == partition)
            .and_then(|p| p.entries.get(key).cloned()))
    }

    async fn put(&self, partition: &str, key: &RequestKey, entry: CacheEntry) -> CacheResult<()> {
        let mut partitions = self.partitions.write().await;
        let index = match partitions.iter().position(|p| p.name == partition) {
            Some(index) => index,
            None => {
                partitions.push(Partition::new(partition));
                partitions.len() - 1
            }
        };
        partitions[index].put(key, entry);
        Ok(())
    }

    async fn keys(&self, partition: &str) -> CacheResult<Vec<RequestKey>> {
        Ok(self
            .partitions
            .read()
            .await
            .iter()
            .find(|p| p.name == partition)
            .map(|p| p.order.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swkit_net::Response;

    fn entry(url: &str, body: &'static str) -> (RequestKey, CacheEntry) {
        let key = RequestKey::get(url);
        let entry = CacheEntry::from_response(&key, &Response::new(200, body));
        (key, entry)
    }

    #[tokio::test]
    async fn test_open_is_lazy_and_idempotent() {
        let store = MemoryCacheStore::new();
        assert!(!store.has("campusguide-runtime").await.unwrap());

        store.open("campusguide-runtime").await.unwrap();
        store.open("campusguide-runtime").await.unwrap();

        assert_eq!(store.partitions().await.unwrap(), vec!["campusguide-runtime"]);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_put_then_match() {
        let store = MemoryCacheStore::new();
        let (key, stored) = entry("https://campus.example/app.css", "body{}");

        store.put("campusguide-runtime", &key, stored.clone()).await.unwrap();

        let found = store
            .match_request("campusguide-runtime", &key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.status, stored.status);
        assert_eq!(found.body, stored.body);

        // Other partitions do not see it.
        assert!(store.match_request("campusguide-images", &key).await.unwrap().is_none());
        assert!(!store.has("campusguide-images").await.unwrap());
    }

    #[tokio::test]
    async fn test_partitions_in_creation_order() {
        let store = MemoryCacheStore::new();
        store.open("b").await.unwrap();
        store.open("a").await.unwrap();
        let (key, e) = entry("https://campus.example/x", "x");
        store.put("c", &key, e).await.unwrap();

        assert_eq!(store.partitions().await.unwrap(), vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_overwrite_moves_key_to_end() {
        let store = MemoryCacheStore::new();
        let (a, ea) = entry("https://campus.example/a", "a1");
        let (b, eb) = entry("https://campus.example/b", "b");
        let (_, ea2) = entry("https://campus.example/a", "a2");

        store.put("p", &a, ea).await.unwrap();
        store.put("p", &b, eb).await.unwrap();
        store.put("p", &a, ea2).await.unwrap();

        assert_eq!(store.keys("p").await.unwrap(), vec![b, a.clone()]);
        let found = store.match_request("p", &a).await.unwrap().unwrap();
        assert_eq!(found.body, b"a2".to_vec());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryCacheStore::new();
        let (key, e) = entry("https://campus.example/a", "a");
        store.put("p", &key, e).await.unwrap();

        assert!(store.delete("p").await.unwrap());
        assert!(!store.delete("p").await.unwrap());
        assert!(store.match_request("p", &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_match_any_uses_creation_order() {
        let store = MemoryCacheStore::new();
        let (key, first) = entry("https://campus.example/", "precached");
        let (_, second) = entry("https://campus.example/", "runtime");

        store.put("campusguide-ios-v2.3.4", &key, first).await.unwrap();
        store.put("campusguide-runtime", &key, second).await.unwrap();

        let found = store.match_any(&key).await.unwrap().unwrap();
        assert_eq!(found.body, b"precached".to_vec());

        let missing = RequestKey::get("https://campus.example/nope");
        assert!(store.match_any(&missing).await.unwrap().is_none());
    }
}
