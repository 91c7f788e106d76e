//! # swkit Cache
//!
//! Named cache partitions mapping request keys to stored responses.
//!
//! ## Architecture
//!
//! ```text
//! CacheStore (trait)
//!     ├── MemoryCacheStore   (process lifetime)
//!     └── SqliteCacheStore   (persists across restarts)
//!
//! Partition "campusguide-runtime"
//!     └── RequestKey ("GET https://…/app.css") → CacheEntry
//! ```
//!
//! Partitions are created lazily by [`CacheStore::open`] or the first [`CacheStore::put`],
//! and are listed in creation order. Entries within a partition are listed in insertion
//! order; overwriting a key moves it to the end.

use std::fmt;

use async_trait::async_trait;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use swkit_net::{Request, Response, ResponseType};
use thiserror::Error;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryCacheStore;
pub use sqlite::SqliteCacheStore;

// ==================== Errors ====================

/// Errors raised by a cache store.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

// ==================== Keys ====================

/// Identifies a cached entry: method plus the URL without its fragment. Query strings are
/// compared exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
        }
    }

    /// Key for a GET of `url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }
}

impl From<&Request> for RequestKey {
    fn from(request: &Request) -> Self {
        let mut url = request.url.clone();
        url.set_fragment(None);
        Self::new(request.method.as_str(), url.as_str())
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

// ==================== Entries ====================

/// A stored response snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL.
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response status text.
    pub status_text: String,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response type at the time it was stored.
    #[serde(default)]
    pub response_type: ResponseType,

    /// Response body.
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Snapshot a response for `key`.
    pub fn from_response(key: &RequestKey, response: &Response) -> Self {
        Self {
            url: key.url.clone(),
            method: key.method.clone(),
            status: response.status,
            status_text: response.status_text.clone(),
            headers: response.headers.clone(),
            response_type: response.response_type,
            body: response.body.to_vec(),
            cached_at: swkit_common::now_millis(),
        }
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.method.clone(), self.url.clone())
    }

    /// Rebuild a response marked as served from cache.
    pub fn to_response(&self) -> Response {
        Response {
            url: self.url.clone(),
            status: self.status,
            status_text: self.status_text.clone(),
            headers: self.headers.clone(),
            body: self.body.clone().into(),
            response_type: self.response_type,
            from_cache: true,
        }
    }
}

// ==================== Store ====================

/// Partition-keyed, request-keyed response storage.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Create the partition if it does not exist.
    async fn open(&self, partition: &str) -> CacheResult<()>;

    /// Check if a partition exists.
    async fn has(&self, partition: &str) -> CacheResult<bool>;

    /// All partition names, in creation order.
    async fn partitions(&self) -> CacheResult<Vec<String>>;

    /// Delete a partition and everything in it. Returns whether it existed.
    async fn delete(&self, partition: &str) -> CacheResult<bool>;

    /// Exact-key lookup in one partition. A missing partition is a miss.
    async fn match_request(
        &self,
        partition: &str,
        key: &RequestKey,
    ) -> CacheResult<Option<CacheEntry>>;

    /// Store an entry, creating the partition if needed. The entry is written whole.
    async fn put(&self, partition: &str, key: &RequestKey, entry: CacheEntry) -> CacheResult<()>;

    /// Keys stored in a partition, in insertion order.
    async fn keys(&self, partition: &str) -> CacheResult<Vec<RequestKey>>;

    /// Exact-key lookup across every partition in creation order; first hit wins.
    async fn match_any(&self, key: &RequestKey) -> CacheResult<Option<CacheEntry>> {
        for partition in self.partitions().await? {
            if let Some(entry) = self.match_request(&partition, key).await? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }
}
