//! The offline agent: one handler per host event.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value as JsonValue;
use swkit_cache::CacheStore;
use swkit_net::{Fetcher, Request, Response};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::classify::{RequestClassifier, Route};
use crate::clients::{Client, Clients};
use crate::config::AgentConfig;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::message::{AgentMessage, ClientMessage};
use crate::notification::{Notification, NotificationId, NotificationRelay};
use crate::registry::{EvictionReport, PartitionRegistry};
use crate::strategy::{Lookup, StrategyExecutor};
use crate::Result;

/// Events the host delivers to the agent.
#[derive(Debug, Clone)]
pub enum HostEvent {
    Install,
    Activate,
    Fetch(Request),
    /// Message posted by a page; arbitrary JSON.
    Message(JsonValue),
    /// Push with an optional payload.
    Push(Option<Vec<u8>>),
    NotificationClick {
        id: NotificationId,
        action: Option<String>,
    },
}

/// What a handled [`HostEvent`] produced.
#[derive(Debug)]
pub enum EventOutcome {
    /// Number of essential resources stored.
    Installed(usize),
    Activated(EvictionReport),
    Fetch(FetchDecision),
    /// The recognised message, if any.
    Message(Option<AgentMessage>),
    NotificationShown(Notification),
    /// The window that was focused or opened.
    NotificationClicked(Client),
}

/// The agent's answer to an intercepted request.
pub enum FetchDecision {
    /// Not intercepted; the host performs the request itself.
    Passthrough,
    /// The host must await this future and use its result as the response.
    RespondWith(BoxFuture<'static, Result<Response>>),
}

impl FetchDecision {
    pub fn is_passthrough(&self) -> bool {
        matches!(self, FetchDecision::Passthrough)
    }

    /// Await the intercepted response. `None` for passthrough.
    pub async fn into_response(self) -> Option<Result<Response>> {
        match self {
            FetchDecision::Passthrough => None,
            FetchDecision::RespondWith(fut) => Some(fut.await),
        }
    }
}

impl fmt::Debug for FetchDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchDecision::Passthrough => f.write_str("Passthrough"),
            FetchDecision::RespondWith(_) => f.write_str("RespondWith(..)"),
        }
    }
}

/// Notifications the agent sends back to its host.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Lifecycle state changed.
    StateChange { state: LifecycleState },
    SkipWaitingRequested,
    /// Stale partitions were removed during activation.
    PartitionsEvicted {
        deleted: Vec<String>,
        failed: Vec<String>,
    },
    ClientsClaimed { count: usize },
    /// Every partition was deleted and pages were told.
    CachesCleared { deleted: usize, notified: usize },
    NotificationShown { id: NotificationId },
    NotificationClosed { id: NotificationId },
    WindowOpened { client_id: String, url: Url },
    WindowFocused { client_id: String, url: Url },
}

/// Offline-caching agent for one deployed version.
pub struct OfflineAgent {
    config: Arc<AgentConfig>,
    classifier: RequestClassifier,
    executor: StrategyExecutor,
    registry: PartitionRegistry,
    lifecycle: RwLock<Lifecycle>,
    notifications: NotificationRelay,

    /// Connected pages.
    pub clients: Arc<RwLock<Clients>>,

    event_tx: mpsc::UnboundedSender<AgentEvent>,
}

impl OfflineAgent {
    /// Create an agent. The receiver yields every [`AgentEvent`].
    pub fn new(
        config: AgentConfig,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<AgentEvent>)> {
        config.validate()?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let agent = Self {
            classifier: RequestClassifier::new(config.bypass_hosts.iter()),
            registry: PartitionRegistry::new(Arc::clone(&store), config.current_partitions()),
            executor: StrategyExecutor::new(store, fetcher),
            lifecycle: RwLock::new(Lifecycle::new()),
            notifications: NotificationRelay::new(config.notification.clone()),
            clients: Arc::new(RwLock::new(Clients::new())),
            config: Arc::new(config),
            event_tx,
        };
        Ok((agent, event_rx))
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> LifecycleState {
        self.lifecycle.read().await.state()
    }

    /// Snapshot of the lifecycle, including when it last changed.
    pub async fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.read().await.clone()
    }

    /// Wait for outstanding background cache writes.
    pub async fn settle(&self) -> usize {
        self.executor.background_writes().settle().await
    }

    fn emit(&self, event: AgentEvent) {
        let _ = self.event_tx.send(event);
    }

    fn emit_state(&self, state: LifecycleState) {
        debug!(state = ?state, "Lifecycle state changed");
        self.emit(AgentEvent::StateChange { state });
    }

    /// Route a host event to its handler.
    pub async fn dispatch(&self, event: HostEvent) -> Result<EventOutcome> {
        match event {
            HostEvent::Install => self.install().await.map(EventOutcome::Installed),
            HostEvent::Activate => self.activate().await.map(EventOutcome::Activated),
            HostEvent::Fetch(request) => Ok(EventOutcome::Fetch(self.fetch(request))),
            HostEvent::Message(data) => self.message(&data).await.map(EventOutcome::Message),
            HostEvent::Push(payload) => Ok(EventOutcome::NotificationShown(
                self.push(payload.as_deref()).await,
            )),
            HostEvent::NotificationClick { id, action } => self
                .notification_click(id, action.as_deref())
                .await
                .map(EventOutcome::NotificationClicked),
        }
    }

    // ==================== Lifecycle ====================

    /// Precache every essential resource, then request skip-waiting.
    ///
    /// On failure the agent becomes `Redundant` and install may be retried. Entries stored
    /// before the failing URL stay in the precache partition.
    pub async fn install(&self) -> Result<usize> {
        let urls = self.config.resolved_precache_urls()?;
        let partition = self.config.precache_name();

        self.lifecycle.write().await.begin_install()?;
        self.emit_state(LifecycleState::Installing);
        info!(partition = %partition, count = urls.len(), "Installing");

        match self.executor.precache(&urls, &partition).await {
            Ok(stored) => {
                {
                    let mut lifecycle = self.lifecycle.write().await;
                    lifecycle.install_succeeded();
                    lifecycle.skip_waiting();
                }
                self.emit_state(LifecycleState::Waiting);
                self.emit(AgentEvent::SkipWaitingRequested);
                Ok(stored)
            }
            Err(e) => {
                error!(error = %e, category = e.category(), "Install failed");
                self.lifecycle.write().await.install_failed();
                self.emit_state(LifecycleState::Redundant);
                Err(e)
            }
        }
    }

    /// Evict partitions from older versions and take control of every page.
    pub async fn activate(&self) -> Result<EvictionReport> {
        self.lifecycle.write().await.begin_activate()?;
        self.emit_state(LifecycleState::Activating);

        let report = self
            .registry
            .evict_stale(self.registry.current_partition_names())
            .await;
        if !report.deleted.is_empty() || !report.failed.is_empty() {
            self.emit(AgentEvent::PartitionsEvicted {
                deleted: report.deleted.clone(),
                failed: report.failed.iter().map(|(name, _)| name.clone()).collect(),
            });
        }

        let count = self.clients.write().await.claim();
        self.emit(AgentEvent::ClientsClaimed { count });

        self.lifecycle.write().await.activated();
        self.emit_state(LifecycleState::Active);
        info!(
            evicted = report.deleted.len(),
            eviction_failures = report.failed.len(),
            claimed = count,
            "Activated"
        );
        Ok(report)
    }

    // ==================== Fetch ====================

    /// Decide how to answer `request`.
    ///
    /// Lifecycle state is not consulted; the host only delivers fetches once the agent
    /// controls the page.
    pub fn fetch(&self, request: Request) -> FetchDecision {
        let route = self.classifier.classify(&request);
        let executor = self.executor.clone();
        let config = Arc::clone(&self.config);

        match route {
            Route::Bypass => FetchDecision::Passthrough,
            Route::Image => FetchDecision::RespondWith(Box::pin(async move {
                let images = config.image_cache.as_str();
                executor
                    .cache_first(&request, Lookup::Partition(images), images)
                    .await
            })),
            Route::Document => FetchDecision::RespondWith(Box::pin(async move {
                executor.network_first(&request, &config.runtime_cache).await
            })),
            Route::Generic => FetchDecision::RespondWith(Box::pin(async move {
                executor
                    .cache_first(&request, Lookup::AnyPartition, &config.runtime_cache)
                    .await
            })),
        }
    }

    // ==================== Messages ====================

    /// Handle a page message. Unknown messages are ignored and yield `Ok(None)`.
    pub async fn message(&self, data: &JsonValue) -> Result<Option<AgentMessage>> {
        match AgentMessage::parse(data) {
            Some(message) => {
                self.handle_message(message).await?;
                Ok(Some(message))
            }
            None => {
                debug!(data = %data, "Ignoring unknown message");
                Ok(None)
            }
        }
    }

    pub async fn handle_message(&self, message: AgentMessage) -> Result<()> {
        match message {
            AgentMessage::SkipWaiting => {
                let activate_now = {
                    let mut lifecycle = self.lifecycle.write().await;
                    lifecycle.skip_waiting();
                    lifecycle.should_activate_now()
                };
                self.emit(AgentEvent::SkipWaitingRequested);
                if activate_now {
                    self.activate().await?;
                }
                Ok(())
            }
            AgentMessage::ClearCache => {
                let deleted = self.registry.clear_all().await?;
                let notified = self.clients.write().await.broadcast(ClientMessage::CacheCleared);
                info!(deleted, notified, "Caches cleared");
                self.emit(AgentEvent::CachesCleared { deleted, notified });
                Ok(())
            }
        }
    }

    // ==================== Notifications ====================

    /// Show a notification for a push.
    pub async fn push(&self, payload: Option<&[u8]>) -> Notification {
        let notification = self.notifications.show(payload).await;
        self.emit(AgentEvent::NotificationShown {
            id: notification.id,
        });
        notification
    }

    /// Close the notification and bring the root page forward.
    ///
    /// Every action, including "dismiss", opens the root page.
    pub async fn notification_click(
        &self,
        id: NotificationId,
        action: Option<&str>,
    ) -> Result<Client> {
        if self.notifications.close(id).await.is_some() {
            self.emit(AgentEvent::NotificationClosed { id });
        } else {
            warn!(id = id.raw(), "Clicked notification was not shown");
        }
        debug!(id = id.raw(), action = action.unwrap_or(""), "Notification clicked");

        let root = self.config.root_url()?;
        let mut clients = self.clients.write().await;

        let existing = clients.find_window(&root).map(|c| c.id.clone());
        let client = match existing {
            Some(client_id) => {
                let client = clients.focus(&client_id)?.clone();
                self.emit(AgentEvent::WindowFocused {
                    client_id: client.id.clone(),
                    url: client.url.clone(),
                });
                client
            }
            None => {
                let client = clients.open_window(root);
                self.emit(AgentEvent::WindowOpened {
                    client_id: client.id.clone(),
                    url: client.url.clone(),
                });
                client
            }
        };
        Ok(client)
    }
}
