//! Caching strategies.
//!
//! Concurrent requests for the same key are not coalesced: two misses in flight both go to
//! the network and both write, and the later write wins.

use std::sync::{Arc, Mutex};

use swkit_cache::{CacheEntry, CacheStore, RequestKey};
use swkit_net::{Fetcher, Request, Response};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::{Result, ServiceWorkerError};

/// Where a cache-first lookup searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    /// Only the named partition.
    Partition(&'a str),
    /// Every partition, in creation order.
    AnyPartition,
}

/// Detached cache writes that must never delay a response.
///
/// Writes run as independent tokio tasks. Dropping the executor or a pending `settle()`
/// detaches them; a started write is never aborted.
#[derive(Clone, Default)]
pub struct BackgroundWrites {
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BackgroundWrites {
    pub fn new() -> Self {
        Self::default()
    }

    fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
        tasks.retain(|handle| !handle.is_finished());
        tasks.push(tokio::spawn(task));
    }

    /// Number of writes still running.
    pub fn pending(&self) -> usize {
        let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
        tasks.retain(|handle| !handle.is_finished());
        tasks.len()
    }

    /// Wait for every write spawned so far. Returns how many were awaited.
    pub async fn settle(&self) -> usize {
        let drained = {
            let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
            std::mem::take(&mut *tasks)
        };

        let mut settled = 0;
        for handle in drained {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background cache write did not complete");
            }
            settled += 1;
        }
        settled
    }
}

/// Runs the caching strategies against a store and a fetcher.
#[derive(Clone)]
pub struct StrategyExecutor {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    writes: BackgroundWrites,
}

impl StrategyExecutor {
    pub fn new(store: Arc<dyn CacheStore>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            store,
            fetcher,
            writes: BackgroundWrites::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn background_writes(&self) -> &BackgroundWrites {
        &self.writes
    }

    /// Serve from cache when present; otherwise fetch and, for a 200, store into `partition`
    /// in the background.
    ///
    /// Network failures and non-cacheable responses are returned untouched.
    pub async fn cache_first(
        &self,
        request: &Request,
        lookup: Lookup<'_>,
        partition: &str,
    ) -> Result<Response> {
        let key = RequestKey::from(request);

        if let Some(entry) = self.lookup(&key, lookup).await {
            trace!(key = %key, "Cache hit");
            return Ok(entry.to_response());
        }

        trace!(key = %key, "Cache miss; fetching");
        let response = self.fetcher.fetch(request).await?;

        if response.is_cacheable() {
            self.store_in_background(partition, key, &response);
        } else {
            debug!(
                key = %key,
                status = response.status,
                response_type = ?response.response_type,
                "Not caching response"
            );
        }
        Ok(response)
    }

    /// Fetch first; on success store a copy into `partition` in the background. When the
    /// network fails, answer from any partition, or propagate the network failure.
    pub async fn network_first(&self, request: &Request, partition: &str) -> Result<Response> {
        let key = RequestKey::from(request);

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.store_in_background(partition, key, &response);
                }
                Ok(response)
            }
            Err(network_error) => {
                debug!(key = %key, error = %network_error, "Network failed; trying cache");
                match self.store.match_any(&key).await {
                    Ok(Some(entry)) => Ok(entry.to_response()),
                    Ok(None) => Err(network_error.into()),
                    Err(e) => {
                        warn!(key = %key, error = %e, "Cache fallback lookup failed");
                        Err(network_error.into())
                    }
                }
            }
        }
    }

    /// Fetch every URL in order and store it into `partition`.
    ///
    /// Stops at the first failure. Entries stored before the failure are left in place.
    pub async fn precache(&self, urls: &[Url], partition: &str) -> Result<usize> {
        self.store.open(partition).await?;

        for url in urls {
            let request = Request::get(url.clone());
            let response = self.fetcher.fetch(&request).await.map_err(|e| {
                ServiceWorkerError::InstallFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            })?;

            if !response.is_cacheable() {
                return Err(ServiceWorkerError::InstallFailed {
                    url: url.to_string(),
                    reason: format!("status {}", response.status),
                });
            }

            let key = RequestKey::from(&request);
            let entry = CacheEntry::from_response(&key, &response);
            self.store.put(partition, &key, entry).await?;
            trace!(url = %url, partition, "Precached");
        }

        info!(count = urls.len(), partition, "Precache complete");
        Ok(urls.len())
    }

    async fn lookup(&self, key: &RequestKey, lookup: Lookup<'_>) -> Option<CacheEntry> {
        let result = match lookup {
            Lookup::Partition(name) => match self.store.open(name).await {
                Ok(()) => self.store.match_request(name, key).await,
                Err(e) => Err(e),
            },
            Lookup::AnyPartition => self.store.match_any(key).await,
        };

        result.unwrap_or_else(|e| {
            // Treated as a miss: the network still gets a chance to answer.
            warn!(key = %key, error = %e, "Cache lookup failed");
            None
        })
    }

    /// Snapshot `response` now and write it without blocking the caller.
    fn store_in_background(&self, partition: &str, key: RequestKey, response: &Response) {
        let entry = CacheEntry::from_response(&key, response);
        let store = Arc::clone(&self.store);
        let partition = partition.to_string();

        self.writes.spawn(async move {
            match store.put(&partition, &key, entry).await {
                Ok(()) => trace!(partition = %partition, key = %key, "Stored response"),
                Err(e) => warn!(partition = %partition, key = %key, error = %e, "Cache write failed"),
            }
        });
    }
}
