//! Platform seams: everything the worker needs from its host.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use shellkit_cache::{CacheStorage, LocalStore};
use shellkit_common::Result;
use shellkit_net::Fetcher;
use url::Url;

use crate::notification::Notification;
use crate::subscription::{PushSubscription, SubscribeOptions};

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientType {
    #[default]
    Window,
    Worker,
    SharedWorker,
    All,
}

/// A page context the host knows about. No identity survives a reload.
#[derive(Debug, Clone, PartialEq)]
pub struct Client {
    pub id: String,
    pub url: Url,
    pub client_type: ClientType,
    pub focused: bool,
}

/// Options for `clients.matchAll()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientQuery {
    pub client_type: ClientType,
    pub include_uncontrolled: bool,
}

impl ClientQuery {
    pub fn windows() -> Self {
        Self {
            client_type: ClientType::Window,
            include_uncontrolled: true,
        }
    }

    pub fn controlled() -> Self {
        Self {
            client_type: ClientType::All,
            include_uncontrolled: false,
        }
    }
}

/// The Clients API.
#[async_trait]
pub trait ClientsHost: Send + Sync {
    async fn match_all(&self, query: &ClientQuery) -> Result<Vec<Client>>;

    /// Open a new top-level window. `None` when the host opened it but
    /// cannot hand back a client (e.g. cross-origin target).
    async fn open_window(&self, url: &Url) -> Result<Option<Client>>;

    async fn focus(&self, client_id: &str) -> Result<()>;

    async fn navigate(&self, client_id: &str, url: &Url) -> Result<()>;

    async fn post_message(&self, client_id: &str, message: JsonValue) -> Result<()>;

    /// Take control of every open page in scope.
    async fn claim(&self) -> Result<()>;
}

/// The platform notification surface.
#[async_trait]
pub trait NotificationSurface: Send + Sync {
    async fn show(&self, notification: &Notification) -> Result<()>;

    async fn close(&self, notification: &Notification) -> Result<()>;
}

/// The Push API.
#[async_trait]
pub trait PushManager: Send + Sync {
    async fn get_subscription(&self) -> Result<Option<PushSubscription>>;

    async fn subscribe(&self, options: &SubscribeOptions) -> Result<PushSubscription>;
}

/// Host capabilities handed to a worker instance.
///
/// `push` is optional: hosts without a push service still get caching and
/// local notifications. `caches` and `store` belong to the origin and must be
/// handed unchanged to every worker version.
#[derive(Clone)]
pub struct Host {
    pub fetcher: Arc<dyn Fetcher>,
    pub caches: Arc<CacheStorage>,
    pub notifications: Arc<dyn NotificationSurface>,
    pub clients: Arc<dyn ClientsHost>,
    pub push: Option<Arc<dyn PushManager>>,
    pub store: Arc<LocalStore>,
}
