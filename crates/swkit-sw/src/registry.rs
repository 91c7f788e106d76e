//! Cache partition registry.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use swkit_cache::CacheStore;
use tracing::{debug, info, warn};

use crate::{Result, ServiceWorkerError};

/// Outcome of a best-effort eviction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Partitions that were deleted.
    pub deleted: Vec<String>,
    /// Partitions whose deletion failed, with the reason.
    pub failed: Vec<(String, String)>,
}

/// Knows which partitions belong to the running version and removes the rest.
#[derive(Clone)]
pub struct PartitionRegistry {
    store: Arc<dyn CacheStore>,
    current: BTreeSet<String>,
}

impl PartitionRegistry {
    pub fn new(store: Arc<dyn CacheStore>, current: BTreeSet<String>) -> Self {
        Self { store, current }
    }

    /// Partitions the running version keeps.
    pub fn current_partition_names(&self) -> &BTreeSet<String> {
        &self.current
    }

    /// Delete every partition not in `keep`.
    ///
    /// All deletions are attempted concurrently. Failures are logged and reported, never
    /// returned as an error.
    pub async fn evict_stale(&self, keep: &BTreeSet<String>) -> EvictionReport {
        let names = match self.store.partitions().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Could not list partitions; skipping eviction");
                return EvictionReport::default();
            }
        };

        let stale: Vec<String> = names.into_iter().filter(|n| !keep.contains(n)).collect();
        let results = join_all(stale.iter().map(|name| {
            info!(partition = %name, "Deleting stale partition");
            self.store.delete(name)
        }))
        .await;

        let mut report = EvictionReport::default();
        for (name, result) in stale.into_iter().zip(results) {
            match result {
                Ok(_) => report.deleted.push(name),
                Err(e) => {
                    warn!(partition = %name, error = %e, "Failed to delete stale partition");
                    report.failed.push((name, e.to_string()));
                }
            }
        }
        report
    }

    /// Delete every partition regardless of name.
    ///
    /// Every deletion is attempted; the first failure is returned after all have run.
    pub async fn clear_all(&self) -> Result<usize> {
        let names = self.store.partitions().await?;
        let results = join_all(names.iter().map(|name| self.store.delete(name))).await;

        let mut deleted = 0;
        let mut first_error: Option<ServiceWorkerError> = None;
        for (name, result) in names.iter().zip(results) {
            match result {
                Ok(_) => deleted += 1,
                Err(e) => {
                    warn!(partition = %name, error = %e, "Failed to delete partition");
                    first_error.get_or_insert(e.into());
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                debug!(deleted, "Cleared all partitions");
                Ok(deleted)
            }
        }
    }
}
