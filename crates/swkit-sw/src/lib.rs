//! # swkit Service Worker
//!
//! Offline-caching agent for the CampusGuide web application.
//!
//! ## Features
//!
//! - **Routing**: every intercepted request is classified as bypass, image, document, or
//!   generic asset
//! - **Strategies**: cache-first for images and assets, network-first for documents,
//!   all-or-nothing precache on install
//! - **Lifecycle**: install, skip-waiting, activate with stale-partition eviction and
//!   client claiming
//! - **Messages**: `SKIP_WAITING` and `CLEAR_CACHE` from controlled pages
//! - **Notifications**: push display and click-through to the root page
//!
//! ## Architecture
//!
//! ```text
//! Host ──events──► OfflineAgent
//!                     ├── RequestClassifier ──► Route
//!                     ├── StrategyExecutor ──► CacheStore + Fetcher
//!                     │       └── BackgroundWrites (detached cache writes)
//!                     ├── PartitionRegistry  (eviction, clear-all)
//!                     ├── Lifecycle          (Installing → Waiting → Activating → Active)
//!                     ├── Clients            (connected pages)
//!                     └── NotificationRelay
//!
//! OfflineAgent ──AgentEvent──► Host
//! ```

use thiserror::Error;

pub mod agent;
pub mod classify;
pub mod clients;
pub mod config;
pub mod lifecycle;
pub mod message;
pub mod notification;
pub mod registry;
pub mod strategy;

pub use agent::{AgentEvent, EventOutcome, FetchDecision, HostEvent, OfflineAgent};
pub use classify::{RequestClassifier, Route};
pub use clients::{Client, ClientMatchOptions, ClientType, Clients};
pub use config::{AgentConfig, NotificationConfig};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use message::{AgentMessage, ClientMessage};
pub use notification::{Notification, NotificationAction, NotificationId, NotificationRelay};
pub use registry::{EvictionReport, PartitionRegistry};
pub use strategy::{BackgroundWrites, Lookup, StrategyExecutor};

use swkit_cache::CacheError;
use swkit_net::NetError;

// ==================== Errors ====================

/// Errors surfaced by the agent to its host.
#[derive(Error, Debug)]
pub enum ServiceWorkerError {
    #[error("Install failed while caching {url}: {reason}")]
    InstallFailed { url: String, reason: String },

    #[error("Network error: {0}")]
    Network(#[from] NetError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl ServiceWorkerError {
    /// Error class, for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            ServiceWorkerError::InstallFailed { .. } => "install",
            ServiceWorkerError::Network(_) => "network",
            ServiceWorkerError::Cache(_) => "cache",
            ServiceWorkerError::StateError(_) => "state",
            ServiceWorkerError::Config(_) => "config",
        }
    }
}

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, ServiceWorkerError>;
