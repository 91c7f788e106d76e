//! Pages connected to the agent.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use url::Url;

use crate::message::ClientMessage;
use crate::{Result, ServiceWorkerError};

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientType {
    #[default]
    Window,
    Worker,
    SharedWorker,
    All,
}

/// A connected page or worker.
#[derive(Debug, Clone)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Client URL.
    pub url: Url,

    /// Client type.
    pub client_type: ClientType,

    /// Whether focused.
    pub focused: bool,

    /// Whether this agent controls the client.
    pub controlled: bool,

    mailbox: Option<mpsc::UnboundedSender<ClientMessage>>,
}

impl Client {
    /// Post a message to the client. Returns `false` if the client has no mailbox or has
    /// gone away.
    pub fn post_message(&self, message: ClientMessage) -> bool {
        match self.mailbox {
            Some(ref tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    fn focus(&mut self) -> Result<()> {
        if self.client_type != ClientType::Window {
            return Err(ServiceWorkerError::StateError(
                "Can only focus window clients".to_string(),
            ));
        }
        self.focused = true;
        Ok(())
    }
}

/// Options for [`Clients::match_all`].
#[derive(Debug, Clone, Default)]
pub struct ClientMatchOptions {
    pub include_uncontrolled: bool,
    pub client_type: ClientType,
}

/// Clients API.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
    order: Vec<String>,
}

impl Clients {
    /// Create new clients manager.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id() -> String {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    fn insert(&mut self, client: Client) {
        self.order.push(client.id.clone());
        self.clients.insert(client.id.clone(), client);
    }

    /// Register a page. The receiver gets every message posted to it.
    pub fn connect(
        &mut self,
        url: Url,
        client_type: ClientType,
    ) -> (String, mpsc::UnboundedReceiver<ClientMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Self::next_id();
        debug!(client_id = %id, url = %url, "Client connected");
        self.insert(Client {
            id: id.clone(),
            url,
            client_type,
            focused: false,
            controlled: false,
            mailbox: Some(tx),
        });
        (id, rx)
    }

    /// Remove a client.
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.order.retain(|c| c != id);
        self.clients.remove(id)
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Match clients in connection order.
    pub fn match_all(&self, options: &ClientMatchOptions) -> Vec<&Client> {
        self.order
            .iter()
            .filter_map(|id| self.clients.get(id))
            .filter(|c| options.include_uncontrolled || c.controlled)
            .filter(|c| match options.client_type {
                ClientType::All => true,
                t => c.client_type == t,
            })
            .collect()
    }

    /// Take control of every client. Returns how many were newly claimed.
    pub fn claim(&mut self) -> usize {
        let mut claimed = 0;
        for client in self.clients.values_mut() {
            if !client.controlled {
                client.controlled = true;
                claimed += 1;
            }
        }
        trace!(claimed, "Claimed clients");
        claimed
    }

    /// Post `message` to every window client, controlled or not. Clients whose mailbox is
    /// closed are dropped. Returns how many received it.
    pub fn broadcast(&mut self, message: ClientMessage) -> usize {
        let options = ClientMatchOptions {
            include_uncontrolled: true,
            client_type: ClientType::Window,
        };

        let mut delivered = 0;
        let mut gone = Vec::new();
        for client in self.match_all(&options) {
            if client.post_message(message) {
                delivered += 1;
            } else if client.mailbox.is_some() {
                gone.push(client.id.clone());
            }
        }
        for id in gone {
            debug!(client_id = %id, "Dropping disconnected client");
            self.remove(&id);
        }
        delivered
    }

    /// Focus a window client.
    pub fn focus(&mut self, id: &str) -> Result<&Client> {
        let missing = || ServiceWorkerError::StateError(format!("no client {}", id));

        self.clients.get_mut(id).ok_or_else(missing)?.focus()?;
        for other in self.clients.values_mut() {
            if other.id != id {
                other.focused = false;
            }
        }
        self.clients.get(id).ok_or_else(missing)
    }

    /// First window client showing exactly `url`.
    pub fn find_window(&self, url: &Url) -> Option<&Client> {
        self.order
            .iter()
            .filter_map(|id| self.clients.get(id))
            .find(|c| c.client_type == ClientType::Window && &c.url == url)
    }

    /// Open a new window. The host owns the resulting page, so it has no mailbox until the
    /// page connects itself.
    pub fn open_window(&mut self, url: Url) -> Client {
        let client = Client {
            id: Self::next_id(),
            url,
            client_type: ClientType::Window,
            focused: true,
            controlled: true,
            mailbox: None,
        };
        for other in self.clients.values_mut() {
            other.focused = false;
        }
        debug!(client_id = %client.id, url = %client.url, "Opened window");
        self.insert(client.clone());
        client
    }
}
