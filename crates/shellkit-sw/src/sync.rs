//! Background sync: the pending notification queue and the data-sync
//! broadcast.

use std::sync::Arc;

use shellkit_cache::LocalStore;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::host::{ClientQuery, ClientsHost, NotificationSurface};
use crate::message::WorkerMessage;
use crate::notification::Notification;
use crate::SwError;

/// Drains notifications that could not be displayed.
pub const SYNC_NOTIFICATIONS_TAG: &str = "background-sync-notifications";
/// Tells every controlled page to refresh its data.
pub const SYNC_DATA_TAG: &str = "background-sync-data";

/// Notifications waiting for a successful display, persisted as one JSON
/// array in the local store.
#[derive(Clone)]
pub struct PendingQueue {
    store: Arc<LocalStore>,
    key: String,
    // Serializes read-modify-write across clones.
    lock: Arc<Mutex<()>>,
}

impl PendingQueue {
    pub fn new(store: Arc<LocalStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Append to the queue. An unreadable queue is moved aside to
    /// `<key>.corrupt` before a fresh one is started.
    pub async fn push(&self, notification: Notification) -> Result<(), SwError> {
        let _guard = self.lock.lock().await;
        let mut pending = match self.store.get(&self.key).await {
            None => Vec::new(),
            Some(raw) => match serde_json::from_str::<Vec<Notification>>(&raw) {
                Ok(pending) => pending,
                Err(e) => {
                    let backup = format!("{}.corrupt", self.key);
                    warn!(key = %self.key, backup = %backup, error = %e, "Pending queue is unreadable, starting over");
                    self.store.set(&backup, raw).await?;
                    Vec::new()
                }
            },
        };
        pending.push(notification);
        self.store.set_json(&self.key, &pending).await?;
        debug!(key = %self.key, pending = pending.len(), "Queued notification");
        Ok(())
    }

    /// Current contents; an unreadable queue is empty.
    pub async fn load(&self) -> Vec<Notification> {
        self.store
            .get_json::<Vec<Notification>>(&self.key)
            .await
            .unwrap_or_default()
    }

    /// Show every queued notification. Entries that fail again stay queued,
    /// in their original order.
    pub async fn drain(&self, surface: &dyn NotificationSurface) -> Result<(usize, usize), SwError> {
        let _guard = self.lock.lock().await;
        let pending = self.load().await;
        if pending.is_empty() {
            return Ok((0, 0));
        }

        let mut remaining = Vec::new();
        let mut shown = 0;
        for notification in pending {
            match surface.show(&notification).await {
                Ok(()) => shown += 1,
                Err(e) => {
                    warn!(title = %notification.title, error = %e, "Queued notification failed again");
                    remaining.push(notification);
                }
            }
        }

        if remaining.is_empty() {
            self.store.remove(&self.key).await?;
        } else {
            self.store.set_json(&self.key, &remaining).await?;
        }
        Ok((shown, remaining.len()))
    }
}

/// Result of a `sync` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Notifications { shown: usize, remaining: usize },
    DataBroadcast { clients: usize },
    /// Unrecognized tag.
    Ignored,
}

pub struct BackgroundSync {
    queue: PendingQueue,
    surface: Arc<dyn NotificationSurface>,
    clients: Arc<dyn ClientsHost>,
}

impl BackgroundSync {
    pub fn new(
        queue: PendingQueue,
        surface: Arc<dyn NotificationSurface>,
        clients: Arc<dyn ClientsHost>,
    ) -> Self {
        Self {
            queue,
            surface,
            clients,
        }
    }

    pub async fn on_sync(&self, tag: &str) -> Result<SyncOutcome, SwError> {
        match tag {
            SYNC_NOTIFICATIONS_TAG => {
                let (shown, remaining) = self.queue.drain(self.surface.as_ref()).await?;
                info!(shown, remaining, "Notification sync finished");
                Ok(SyncOutcome::Notifications { shown, remaining })
            }
            SYNC_DATA_TAG => {
                let clients = self.broadcast(WorkerMessage::SyncData).await?;
                info!(clients, "Data sync broadcast");
                Ok(SyncOutcome::DataBroadcast { clients })
            }
            other => {
                debug!(tag = other, "Ignoring unknown sync tag");
                Ok(SyncOutcome::Ignored)
            }
        }
    }

    /// Post to every controlled client. A failed post is logged and skipped.
    async fn broadcast(&self, message: WorkerMessage) -> Result<usize, SwError> {
        let message = serde_json::to_value(message)?;
        let clients = self.clients.match_all(&ClientQuery::controlled()).await?;

        let mut delivered = 0;
        for client in clients {
            match self.clients.post_message(&client.id, message.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(client_id = %client.id, error = %e, "Failed to post message"),
            }
        }
        Ok(delivered)
    }
}
