//! # ShellKit Service Worker
//!
//! The worker half of an installable web app: offline caching, version
//! lifecycle, and the push/notification bridge back to open pages.
//!
//! ## Features
//!
//! - **Routing**: API calls, static assets, and documents each get their own
//!   caching strategy
//! - **Strategies**: Network-First, Cache-First, Stale-While-Revalidate
//! - **Lifecycle**: install (precache), activate (evict old generations,
//!   claim clients)
//! - **Notifications**: push payload → notification, click → focus/open
//! - **Messaging**: `SKIP_WAITING`, `SHOW_NOTIFICATION`, `GET_CLIENT_ID`
//! - **Background sync**: pending notification queue, data sync broadcast
//! - **Push subscriptions**: persist remotely with a local fallback
//!
//! ## Architecture
//!
//! ```text
//! Host (platform) ── WorkerEvent ──→ ServiceWorker::handle()
//!                                        │
//!                 ┌──────────────────────┼──────────────────────┐
//!                 │                      │                      │
//!              Router ──→ Strategies   Lifecycle        NotificationBridge
//!                            │           │                 │        │
//!                       CacheStorage ◄───┘          BackgroundSync  SubscriptionManager
//!                            │                             │        │
//!                         Fetcher                       LocalStore ◄┘
//! ```
//!
//! Every event handler is an async function; the host must await it (and
//! settle any returned [`WaitUntil`]) before it may stop the worker.

use shellkit_cache::CacheError;
use shellkit_common::ShellKitError;
use shellkit_net::NetError;
use thiserror::Error;

pub mod config;
pub mod event;
pub mod host;
pub mod lifecycle;
pub mod message;
pub mod notification;
pub mod router;
pub mod strategy;
pub mod subscription;
pub mod sync;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{NotificationDefaults, SubscriptionConfig, WorkerConfig};
pub use event::{EventOutcome, FetchOutcome, WorkerEvent};
pub use host::{Client, ClientQuery, ClientType, ClientsHost, Host, NotificationSurface, PushManager};
pub use lifecycle::{ActivationReport, Lifecycle, WorkerState};
pub use message::{ClientIdReply, ClientMessage, MessageEvent, WorkerMessage};
pub use notification::{
    ClickOutcome, DisplayOutcome, Notification, NotificationAction, NotificationBridge,
    NotificationOptions, PushPayload,
};
pub use router::{Router, Strategy};
pub use strategy::{ResponseSource, Strategies, StrategyError, StrategyResponse, WaitUntil};
pub use subscription::{
    PersistedTo, PushSubscription, SubscribeOptions, SubscriptionKeys, SubscriptionManager,
};
pub use sync::{BackgroundSync, PendingQueue, SyncOutcome, SYNC_DATA_TAG, SYNC_NOTIFICATIONS_TAG};
pub use worker::ServiceWorker;

// ==================== Errors ====================

/// Errors that can occur in service worker operations.
#[derive(Error, Debug)]
pub enum SwError {
    #[error("Network error: {0}")]
    Network(#[from] NetError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Host error: {0}")]
    Host(#[from] ShellKitError),

    #[error("Fetch failed: {0}")]
    Strategy(#[from] StrategyError),

    #[error("Invalid state: expected {expected}, worker is {actual}")]
    InvalidState {
        expected: &'static str,
        actual: WorkerState,
    },

    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
