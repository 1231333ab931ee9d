//! In-memory host fakes for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use shellkit_cache::{CacheStorage, LocalStore};
use shellkit_common::{Result, ShellKitError};
use shellkit_net::http::{HeaderMap, Method, StatusCode};
use shellkit_net::{Fetcher, NetError, Request, Response};
use url::Url;

use crate::config::WorkerConfig;
use crate::host::{Client, ClientQuery, ClientType, ClientsHost, Host, NotificationSurface, PushManager};
use crate::notification::Notification;
use crate::subscription::{PushSubscription, SubscribeOptions, SubscriptionKeys};

pub const ORIGIN: &str = "https://app.example";

pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

// ==================== Network ====================

#[derive(Clone)]
struct Route {
    status: StatusCode,
    body: Vec<u8>,
}

/// Scripted network. Unknown URLs answer 404; `set_online(false)` makes
/// every fetch fail.
#[derive(Default)]
pub struct FakeNetwork {
    routes: Mutex<HashMap<String, Route>>,
    online: AtomicBool,
    delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<(Method, String)>>,
}

impl FakeNetwork {
    pub fn new() -> Arc<Self> {
        let network = Self::default();
        network.online.store(true, Ordering::SeqCst);
        Arc::new(network)
    }

    pub fn respond(&self, path: &str, status: u16, body: &str) {
        self.routes.lock().unwrap().insert(
            url(path).to_string(),
            Route {
                status: StatusCode::from_u16(status).unwrap(),
                body: body.as_bytes().to_vec(),
            },
        );
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<(Method, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, path: &str) -> usize {
        let target = url(path).to_string();
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, u)| *u == target)
            .count()
    }
}

#[async_trait]
impl Fetcher for FakeNetwork {
    async fn fetch(&self, request: &Request) -> std::result::Result<Response, NetError> {
        self.calls
            .lock()
            .unwrap()
            .push((request.method.clone(), request.url.to_string()));

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if !self.online.load(Ordering::SeqCst) {
            return Err(NetError::Offline);
        }

        let route = self
            .routes
            .lock()
            .unwrap()
            .get(request.url.as_str())
            .cloned()
            .unwrap_or(Route {
                status: StatusCode::NOT_FOUND,
                body: Vec::new(),
            });

        Ok(Response::new(
            request.url.clone(),
            route.status,
            HeaderMap::new(),
            route.body,
        ))
    }
}

// ==================== Notifications ====================

/// Records notifications. Models tag replacement: a notification whose tag
/// is already displayed replaces it, and only alerts if `renotify` is set.
#[derive(Default)]
pub struct FakeNotifications {
    displayed: Mutex<Vec<Notification>>,
    shown: Mutex<Vec<Notification>>,
    closed: Mutex<Vec<Notification>>,
    alerts: AtomicUsize,
    failing: AtomicBool,
}

impl FakeNotifications {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every successful `show`, in order.
    pub fn shown(&self) -> Vec<Notification> {
        self.shown.lock().unwrap().clone()
    }

    /// What is currently on screen.
    pub fn displayed(&self) -> Vec<Notification> {
        self.displayed.lock().unwrap().clone()
    }

    pub fn closed(&self) -> Vec<Notification> {
        self.closed.lock().unwrap().clone()
    }

    pub fn alerts(&self) -> usize {
        self.alerts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationSurface for FakeNotifications {
    async fn show(&self, notification: &Notification) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ShellKitError::Unsupported("notification permission denied".into()));
        }

        let mut displayed = self.displayed.lock().unwrap();
        let existing = notification.options.tag.as_ref().and_then(|tag| {
            displayed
                .iter()
                .position(|n| n.options.tag.as_ref() == Some(tag))
        });
        match existing {
            Some(index) => {
                displayed[index] = notification.clone();
                if notification.options.renotify {
                    self.alerts.fetch_add(1, Ordering::SeqCst);
                }
            }
            None => {
                displayed.push(notification.clone());
                self.alerts.fetch_add(1, Ordering::SeqCst);
            }
        }

        self.shown.lock().unwrap().push(notification.clone());
        Ok(())
    }

    async fn close(&self, notification: &Notification) -> Result<()> {
        self.displayed
            .lock()
            .unwrap()
            .retain(|n| n.options.tag != notification.options.tag);
        self.closed.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

// ==================== Clients ====================

#[derive(Debug, Clone, PartialEq)]
pub enum ClientCall {
    Focus(String),
    Navigate(String, String),
    Open(String),
    Post(String, JsonValue),
    Claim,
}

#[derive(Default)]
pub struct FakeClients {
    clients: Mutex<Vec<Client>>,
    calls: Mutex<Vec<ClientCall>>,
    fail_match_all: AtomicBool,
    fail_focus: AtomicBool,
    next_id: AtomicUsize,
}

impl FakeClients {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_window(&self, id: &str, url: &str) {
        self.clients.lock().unwrap().push(Client {
            id: id.to_string(),
            url: Url::parse(url).unwrap(),
            client_type: ClientType::Window,
            focused: false,
        });
    }

    pub fn add_worker(&self, id: &str, url: &str) {
        self.clients.lock().unwrap().push(Client {
            id: id.to_string(),
            url: Url::parse(url).unwrap(),
            client_type: ClientType::Worker,
            focused: false,
        });
    }

    pub fn set_fail_match_all(&self, fail: bool) {
        self.fail_match_all.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_focus(&self, fail: bool) {
        self.fail_focus.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<ClientCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn opened(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ClientCall::Open(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn posted(&self) -> Vec<(String, JsonValue)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ClientCall::Post(id, message) => Some((id, message)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ClientsHost for FakeClients {
    async fn match_all(&self, query: &ClientQuery) -> Result<Vec<Client>> {
        if self.fail_match_all.load(Ordering::SeqCst) {
            return Err(ShellKitError::internal("client enumeration failed"));
        }
        Ok(self
            .clients
            .lock()
            .unwrap()
            .iter()
            .filter(|c| query.client_type == ClientType::All || c.client_type == query.client_type)
            .cloned()
            .collect())
    }

    async fn open_window(&self, url: &Url) -> Result<Option<Client>> {
        let id = format!("opened-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let client = Client {
            id,
            url: url.clone(),
            client_type: ClientType::Window,
            focused: true,
        };
        self.calls
            .lock()
            .unwrap()
            .push(ClientCall::Open(url.to_string()));
        self.clients.lock().unwrap().push(client.clone());
        Ok(Some(client))
    }

    async fn focus(&self, client_id: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(ClientCall::Focus(client_id.to_string()));
        if self.fail_focus.load(Ordering::SeqCst) {
            return Err(ShellKitError::NotFound(format!("client {client_id}")));
        }
        Ok(())
    }

    async fn navigate(&self, client_id: &str, url: &Url) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(ClientCall::Navigate(client_id.to_string(), url.to_string()));
        Ok(())
    }

    async fn post_message(&self, client_id: &str, message: JsonValue) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(ClientCall::Post(client_id.to_string(), message));
        Ok(())
    }

    async fn claim(&self) -> Result<()> {
        self.calls.lock().unwrap().push(ClientCall::Claim);
        Ok(())
    }
}

// ==================== Push ====================

#[derive(Default)]
pub struct FakePush {
    current: Mutex<Option<PushSubscription>>,
    subscribe_calls: Mutex<Vec<SubscribeOptions>>,
}

impl FakePush {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_existing(subscription: PushSubscription) -> Arc<Self> {
        let push = Self::default();
        *push.current.lock().unwrap() = Some(subscription);
        Arc::new(push)
    }

    pub fn subscribe_calls(&self) -> Vec<SubscribeOptions> {
        self.subscribe_calls.lock().unwrap().clone()
    }
}

pub fn subscription(endpoint: &str) -> PushSubscription {
    PushSubscription {
        endpoint: endpoint.to_string(),
        expiration_time: None,
        keys: SubscriptionKeys {
            p256dh: "BPub".to_string(),
            auth: "secret".to_string(),
        },
    }
}

#[async_trait]
impl PushManager for FakePush {
    async fn get_subscription(&self) -> Result<Option<PushSubscription>> {
        Ok(self.current.lock().unwrap().clone())
    }

    async fn subscribe(&self, options: &SubscribeOptions) -> Result<PushSubscription> {
        let mut calls = self.subscribe_calls.lock().unwrap();
        calls.push(options.clone());
        let fresh = subscription(&format!("https://push.example/sub/{}", calls.len()));
        *self.current.lock().unwrap() = Some(fresh.clone());
        Ok(fresh)
    }
}

// ==================== Host ====================

pub struct FakeHost {
    pub network: Arc<FakeNetwork>,
    pub notifications: Arc<FakeNotifications>,
    pub clients: Arc<FakeClients>,
    pub push: Arc<FakePush>,
    pub caches: Arc<CacheStorage>,
    pub store: Arc<LocalStore>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            network: FakeNetwork::new(),
            notifications: FakeNotifications::new(),
            clients: FakeClients::new(),
            push: FakePush::new(),
            caches: Arc::new(WorkerConfig::default().cache_storage()),
            store: Arc::new(LocalStore::in_memory()),
        }
    }

    pub fn host(&self) -> Host {
        Host {
            fetcher: self.network.clone(),
            caches: self.caches.clone(),
            notifications: self.notifications.clone(),
            clients: self.clients.clone(),
            push: Some(self.push.clone()),
            store: self.store.clone(),
        }
    }

    pub fn host_without_push(&self) -> Host {
        Host {
            push: None,
            ..self.host()
        }
    }
}
