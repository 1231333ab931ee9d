//! Worker configuration

use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shellkit_cache::CacheStorage;
use shellkit_common::{RetryConfig, ShellKitError};
use url::Url;

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Scope URL; also the origin that notification clicks look for
    pub scope: String,

    /// Current cache generation (version tag)
    pub cache_version: String,

    /// Unversioned bucket for API responses
    pub api_cache_name: String,

    /// LRU bound of the API bucket
    pub api_cache_max_entries: usize,

    /// Largest body accepted into any bucket, in bytes
    pub max_entry_bytes: Option<usize>,

    /// Path fragment that marks an API request
    pub api_marker: String,

    /// Assets fetched into the current generation at install
    pub precache: Vec<String>,

    /// Store assets fetched on a Cache-First miss
    pub cache_first_write_back: bool,

    /// Show an "app updated" notification after activation
    pub announce_updates: bool,

    /// LocalStore key of the pending notification queue
    pub pending_queue_key: String,

    /// Notification defaults
    pub notifications: NotificationDefaults,

    /// Push subscription persistence
    pub subscription: SubscriptionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationDefaults {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    pub renotify: bool,
    pub vibrate: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Endpoint the subscription JSON is POSTed to, relative to the scope
    pub endpoint: String,

    /// LocalStore key used when the POST fails
    pub storage_key: String,

    /// VAPID public key, base64url
    pub application_server_key: Option<String>,

    /// POST attempts before falling back to local storage
    pub attempts: u32,

    /// Delay before the first retry in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scope: "http://localhost/".to_string(),
            cache_version: "shellkit-v1".to_string(),
            api_cache_name: "api-cache".to_string(),
            api_cache_max_entries: 128,
            max_entry_bytes: None,
            api_marker: "/api/".to_string(),
            precache: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/manifest.json".to_string(),
                "/pwa-192x192.png".to_string(),
                "/pwa-512x512.png".to_string(),
            ],
            cache_first_write_back: false,
            announce_updates: true,
            pending_queue_key: "pending-notifications".to_string(),
            notifications: NotificationDefaults::default(),
            subscription: SubscriptionConfig::default(),
        }
    }
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            title: "ShellKit".to_string(),
            body: "New notification available".to_string(),
            icon: "/pwa-192x192.png".to_string(),
            badge: "/pwa-192x192.png".to_string(),
            tag: "default".to_string(),
            renotify: true,
            vibrate: vec![100, 50, 100],
        }
    }
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            endpoint: "/api/push-subscription".to_string(),
            storage_key: "pushSubscription".to_string(),
            application_server_key: None,
            attempts: 1,
            retry_delay_ms: 200,
        }
    }
}

impl SubscriptionConfig {
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::attempts(self.attempts, Duration::from_millis(self.retry_delay_ms))
    }
}

impl WorkerConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ShellKitError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ShellKitError::config_with_source("invalid worker config", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ShellKitError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ShellKitError> {
        self.scope_url()?;
        if self.cache_version.is_empty() {
            return Err(ShellKitError::config("cache_version must not be empty"));
        }
        if self.cache_version == self.api_cache_name {
            return Err(ShellKitError::config(
                "cache_version and api_cache_name must name different buckets",
            ));
        }
        if self.api_cache_max_entries == 0 {
            return Err(ShellKitError::config("api_cache_max_entries must be at least 1"));
        }
        if self.api_marker.is_empty() {
            return Err(ShellKitError::config("api_marker must not be empty"));
        }
        Ok(())
    }

    pub fn scope_url(&self) -> Result<Url, ShellKitError> {
        Url::parse(&self.scope)
            .map_err(|e| ShellKitError::config_with_source(format!("invalid scope '{}'", self.scope), e))
    }

    pub fn api_cache_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.api_cache_max_entries).unwrap_or(NonZeroUsize::MIN)
    }

    /// Origin cache storage with this config's API bucket bound and entry
    /// size limit. Built once per origin and shared by every worker version.
    pub fn cache_storage(&self) -> CacheStorage {
        let caches = CacheStorage::new().with_capacity(&self.api_cache_name, self.api_cache_capacity());
        match self.max_entry_bytes {
            Some(limit) => caches.with_max_entry_bytes(limit),
            None => caches,
        }
    }
}
