//! Push notification relay.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::NotificationConfig;

/// Action identifier for opening the application.
pub const ACTION_VIEW: &str = "view";
/// Action identifier for dismissing the notification.
pub const ACTION_DISMISS: &str = "dismiss";

/// Unique identifier for a shown notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(u64);

impl NotificationId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A button on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

/// Data attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    /// Arrival time (ms since epoch).
    pub date_of_arrival: u64,
    pub primary_key: u32,
}

/// A notification handed to the host for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

/// Builds notifications from push payloads and tracks the ones on screen.
#[derive(Debug)]
pub struct NotificationRelay {
    config: NotificationConfig,
    shown: RwLock<HashMap<NotificationId, Notification>>,
}

impl NotificationRelay {
    pub fn new(config: NotificationConfig) -> Self {
        Self {
            config,
            shown: RwLock::new(HashMap::new()),
        }
    }

    /// Build a notification for a push payload. Missing or non-UTF-8 payloads get the
    /// default body.
    pub fn build(&self, payload: Option<&[u8]>) -> Notification {
        let body = match payload.map(std::str::from_utf8) {
            Some(Ok(text)) => text.to_string(),
            Some(Err(e)) => {
                warn!(error = %e, "Unreadable push payload; using default body");
                self.config.default_body.clone()
            }
            None => self.config.default_body.clone(),
        };

        let action = |action: &str, title: &str| NotificationAction {
            action: action.to_string(),
            title: title.to_string(),
            icon: self.config.action_icon.clone(),
        };

        Notification {
            id: NotificationId::new(),
            title: self.config.title.clone(),
            body,
            icon: self.config.icon.clone(),
            badge: self.config.badge.clone(),
            vibrate: self.config.vibrate.clone(),
            data: NotificationData {
                date_of_arrival: swkit_common::now_millis(),
                primary_key: 1,
            },
            actions: vec![
                action(ACTION_VIEW, &self.config.view_title),
                action(ACTION_DISMISS, &self.config.dismiss_title),
            ],
        }
    }

    /// Build and record a notification as shown.
    pub async fn show(&self, payload: Option<&[u8]>) -> Notification {
        let notification = self.build(payload);
        debug!(id = notification.id.raw(), body = %notification.body, "Showing notification");
        self.shown
            .write()
            .await
            .insert(notification.id, notification.clone());
        notification
    }

    /// Close a notification. Returns it if it was still shown.
    pub async fn close(&self, id: NotificationId) -> Option<Notification> {
        self.shown.write().await.remove(&id)
    }

    /// Notifications currently on screen.
    pub async fn shown(&self) -> Vec<Notification> {
        self.shown.read().await.values().cloned().collect()
    }
}
