//! Test doubles shared by the scenario tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hashbrown::HashMap;
use swkit_cache::{CacheEntry, CacheError, CacheResult, CacheStore, MemoryCacheStore, RequestKey};
use swkit_common::{init_logging, LogConfig};
use swkit_net::{Fetcher, NetError, Request, Response};
use swkit_sw::{AgentConfig, AgentEvent, OfflineAgent};
use tokio::sync::mpsc;
use ::url::Url;

pub const ROOT: &str = "https://campusguide.app/";

pub fn init_tracing() {
    init_logging(LogConfig::debug().with_filter("swkit_sw=trace,swkit_cache=debug"));
}

pub fn url(path: &str) -> Url {
    Url::parse(ROOT).unwrap().join(path).unwrap()
}

// ==================== Fetcher ====================

/// What the network does for one URL.
#[derive(Debug, Clone)]
pub enum Outcome {
    Respond(Response),
    /// 200 whose body is `"<url>#<call number>"`.
    Fresh,
    Offline,
    /// Never completes.
    Hang,
}

/// Network double answering from a per-URL script. Unscripted URLs are offline.
#[derive(Default)]
pub struct ScriptedFetcher {
    script: Mutex<HashMap<String, Outcome>>,
    calls: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every essential resource answers 200.
    pub fn with_essentials() -> Self {
        let fetcher = Self::new();
        for path in AgentConfig::default().precache_urls {
            fetcher.respond(&path, Response::new(200, format!("essential {}", path)));
        }
        fetcher
    }

    pub fn script(&self, path: &str, outcome: Outcome) -> &Self {
        self.script
            .lock()
            .unwrap()
            .insert(url(path).to_string(), outcome);
        self
    }

    pub fn respond(&self, path: &str, response: Response) -> &Self {
        self.script(path, Outcome::Respond(response.with_url(url(path).as_str())))
    }

    /// Total fetches across every URL.
    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn calls(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(url(path).as_str())
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        let key = request.url.to_string();
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(key.clone()).or_insert(0);
            *count += 1;
            *count
        };
        let outcome = self.script.lock().unwrap().get(&key).cloned();

        match outcome {
            Some(Outcome::Respond(response)) => Ok(response),
            Some(Outcome::Fresh) => {
                Ok(Response::new(200, format!("{}#{}", key, call)).with_url(key.as_str()))
            }
            Some(Outcome::Hang) => std::future::pending().await,
            Some(Outcome::Offline) | None => Err(NetError::Offline(key)),
        }
    }
}

// ==================== Store ====================

/// In-memory store that counts every operation and can refuse to delete named partitions.
#[derive(Default)]
pub struct InstrumentedStore {
    inner: MemoryCacheStore,
    operations: AtomicUsize,
    undeletable: Mutex<HashSet<String>>,
}

impl InstrumentedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make deleting `partition` fail.
    pub fn fail_delete(&self, partition: &str) {
        self.undeletable.lock().unwrap().insert(partition.to_string());
    }

    pub fn operations(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    /// Seed an entry without counting it.
    pub async fn seed(&self, partition: &str, path: &str, body: &str) {
        let key = RequestKey::get(url(path).as_str());
        let entry = CacheEntry::from_response(&key, &Response::new(200, body.to_string()));
        self.inner.put(partition, &key, entry).await.unwrap();
    }

    /// Partition names without counting the call.
    pub async fn partition_names(&self) -> Vec<String> {
        self.inner.partitions().await.unwrap()
    }

    pub async fn entry_count(&self, partition: &str) -> usize {
        self.inner.keys(partition).await.unwrap().len()
    }

    pub async fn body(&self, partition: &str, path: &str) -> Option<String> {
        let key = RequestKey::get(url(path).as_str());
        self.inner
            .match_request(partition, &key)
            .await
            .unwrap()
            .map(|entry| String::from_utf8_lossy(&entry.body).into_owned())
    }

    fn count(&self) {
        self.operations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CacheStore for InstrumentedStore {
    async fn open(&self, partition: &str) -> CacheResult<()> {
        self.count();
        self.inner.open(partition).await
    }

    async fn has(&self, partition: &str) -> CacheResult<bool> {
        self.count();
        self.inner.has(partition).await
    }

    async fn partitions(&self) -> CacheResult<Vec<String>> {
        self.count();
        self.inner.partitions().await
    }

    async fn delete(&self, partition: &str) -> CacheResult<bool> {
        self.count();
        if self.undeletable.lock().unwrap().contains(partition) {
            return Err(CacheError::Storage(format!("{} is locked", partition)));
        }
        self.inner.delete(partition).await
    }

    async fn match_request(
        &self,
        partition: &str,
        key: &RequestKey,
    ) -> CacheResult<Option<CacheEntry>> {
        self.count();
        self.inner.match_request(partition, key).await
    }

    async fn put(&self, partition: &str, key: &RequestKey, entry: CacheEntry) -> CacheResult<()> {
        self.count();
        self.inner.put(partition, key, entry).await
    }

    async fn keys(&self, partition: &str) -> CacheResult<Vec<RequestKey>> {
        self.count();
        self.inner.keys(partition).await
    }
}

// ==================== Harness ====================

pub struct Harness {
    pub agent: OfflineAgent,
    pub events: mpsc::UnboundedReceiver<AgentEvent>,
    pub store: Arc<InstrumentedStore>,
    pub fetcher: Arc<ScriptedFetcher>,
}

impl Harness {
    pub fn new(fetcher: ScriptedFetcher) -> Self {
        Self::with_store(fetcher, InstrumentedStore::new())
    }

    pub fn with_store(fetcher: ScriptedFetcher, store: InstrumentedStore) -> Self {
        init_tracing();
        let store = Arc::new(store);
        let fetcher = Arc::new(fetcher);
        let (agent, events) =
            OfflineAgent::new(AgentConfig::default(), store.clone(), fetcher.clone()).unwrap();
        Self {
            agent,
            events,
            store,
            fetcher,
        }
    }

    /// Install and activate.
    pub async fn activated(fetcher: ScriptedFetcher) -> Self {
        let harness = Self::new(fetcher);
        harness.agent.install().await.unwrap();
        harness.agent.activate().await.unwrap();
        harness
    }

    pub fn drain_events(&mut self) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
