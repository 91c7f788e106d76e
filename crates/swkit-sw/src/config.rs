//! Agent configuration.
//!
//! Everything the deployed worker treats as a constant (partition names, the essential
//! resource list, hosts that are never intercepted, notification appearance) lives here
//! and is fixed for the lifetime of an [`crate::OfflineAgent`].

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::ServiceWorkerError;

/// Static configuration for one deployed version of the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Origin and path the agent controls; relative URLs resolve against it.
    pub scope: Url,

    /// Prefix of the versioned precache partition.
    pub cache_prefix: String,

    /// Deployed version, embedded in the precache partition name.
    pub version: String,

    /// Partition for documents and generic assets.
    pub runtime_cache: String,

    /// Partition for images.
    pub image_cache: String,

    /// Resources that must be in the precache partition once install completes.
    pub precache_urls: Vec<String>,

    /// Hostname substrings that are never intercepted.
    pub bypass_hosts: Vec<String>,

    /// Appearance of push notifications.
    pub notification: NotificationConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            scope: Url::parse("https://campusguide.app/").expect("static scope URL is valid"),
            cache_prefix: "campusguide-ios".to_string(),
            version: "2.3.4".to_string(),
            runtime_cache: "campusguide-runtime".to_string(),
            image_cache: "campusguide-images".to_string(),
            precache_urls: [
                "/",
                "/index.html",
                "/manifest.json",
                "/icon-192.png",
                "/icon-512.png",
                "/apple-touch-icon.png",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            bypass_hosts: ["supabase.co", "cloudinary.com", "googleapis.com", "google.com"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            notification: NotificationConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ServiceWorkerError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ServiceWorkerError::Config(format!("invalid agent config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, ServiceWorkerError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ServiceWorkerError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Name of the versioned precache partition, e.g. `campusguide-ios-v2.3.4`.
    pub fn precache_name(&self) -> String {
        format!("{}-v{}", self.cache_prefix, self.version)
    }

    /// Partitions that survive activation.
    pub fn current_partitions(&self) -> BTreeSet<String> {
        [
            self.precache_name(),
            self.runtime_cache.clone(),
            self.image_cache.clone(),
        ]
        .into_iter()
        .collect()
    }

    /// Essential resources as absolute URLs, in declaration order.
    pub fn resolved_precache_urls(&self) -> Result<Vec<Url>, ServiceWorkerError> {
        self.precache_urls
            .iter()
            .map(|raw| {
                self.scope.join(raw).map_err(|e| {
                    ServiceWorkerError::Config(format!("bad precache URL {:?}: {}", raw, e))
                })
            })
            .collect()
    }

    /// The application's root page.
    pub fn root_url(&self) -> Result<Url, ServiceWorkerError> {
        self.scope
            .join("/")
            .map_err(|e| ServiceWorkerError::Config(format!("bad scope: {}", e)))
    }

    /// Reject configurations the agent cannot run with.
    pub fn validate(&self) -> Result<(), ServiceWorkerError> {
        if !matches!(self.scope.scheme(), "http" | "https") || self.scope.host_str().is_none() {
            return Err(ServiceWorkerError::Config(format!(
                "scope must be an http(s) URL with a host, got {}",
                self.scope
            )));
        }
        if self.version.trim().is_empty() {
            return Err(ServiceWorkerError::Config("version must not be empty".to_string()));
        }
        let names = [
            self.precache_name(),
            self.runtime_cache.clone(),
            self.image_cache.clone(),
        ];
        if names.iter().any(|n| n.trim().is_empty()) {
            return Err(ServiceWorkerError::Config(
                "partition names must not be empty".to_string(),
            ));
        }
        if self.current_partitions().len() != names.len() {
            return Err(ServiceWorkerError::Config(format!(
                "partition names must be distinct: {:?}",
                names
            )));
        }
        if self.bypass_hosts.iter().any(|h| h.is_empty()) {
            // An empty substring would match every host.
            return Err(ServiceWorkerError::Config(
                "bypass host entries must not be empty".to_string(),
            ));
        }
        self.resolved_precache_urls()?;
        Ok(())
    }
}

/// Fixed appearance of push notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub title: String,
    /// Body used when the push carries no readable text.
    pub default_body: String,
    pub icon: String,
    pub badge: String,
    /// Vibration pattern in milliseconds.
    pub vibrate: Vec<u32>,
    pub view_title: String,
    pub dismiss_title: String,
    pub action_icon: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: "CampusGuide".to_string(),
            default_body: "Nouvelle notification".to_string(),
            icon: "/icon-192.png".to_string(),
            badge: "/icon-192.png".to_string(),
            vibrate: vec![100, 50, 100],
            view_title: "Voir".to_string(),
            dismiss_title: "Fermer".to_string(),
            action_icon: "/icon-192.png".to_string(),
        }
    }
}
