//! The worker instance and its event dispatch.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use shellkit_cache::CacheStorage;
use shellkit_net::Request;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::WorkerConfig;
use crate::event::{EventOutcome, FetchOutcome, WorkerEvent};
use crate::host::Host;
use crate::lifecycle::{ActivationReport, Lifecycle, WorkerState};
use crate::message::{ClientIdReply, ClientMessage, MessageEvent};
use crate::notification::NotificationBridge;
use crate::router::Router;
use crate::strategy::{Strategies, WaitUntil};
use crate::subscription::{PersistedTo, PushSubscription, SubscriptionManager};
use crate::sync::{BackgroundSync, PendingQueue};
use crate::SwError;

/// One worker version. Owns its state machine and bridges; cache storage and
/// the local store come from the host and outlive the version.
pub struct ServiceWorker {
    config: WorkerConfig,
    caches: Arc<CacheStorage>,
    router: Router,
    strategies: Strategies,
    lifecycle: Lifecycle,
    notifications: NotificationBridge,
    sync: BackgroundSync,
    subscriptions: SubscriptionManager,
}

impl ServiceWorker {
    pub fn new(config: WorkerConfig, host: Host) -> Result<Self, SwError> {
        config.validate()?;
        let scope = config.scope_url()?;

        let caches = host.caches.clone();

        let precache = config
            .precache
            .iter()
            .map(|path| scope.join(path))
            .collect::<Result<Vec<Url>, _>>()?;

        let strategies = Strategies::new(
            caches.clone(),
            host.fetcher.clone(),
            &config.cache_version,
            &config.api_cache_name,
        )
        .with_cache_first_write_back(config.cache_first_write_back);

        let lifecycle = Lifecycle::new(
            caches.clone(),
            host.fetcher.clone(),
            host.clients.clone(),
            &config.cache_version,
            &config.api_cache_name,
            precache,
        );

        let queue = PendingQueue::new(host.store.clone(), &config.pending_queue_key);
        let notifications = NotificationBridge::new(
            host.notifications.clone(),
            host.clients.clone(),
            queue.clone(),
            config.notifications.clone(),
            scope.clone(),
        );
        let sync = BackgroundSync::new(queue, host.notifications.clone(), host.clients.clone());
        let subscriptions = SubscriptionManager::new(
            host.push.clone(),
            host.fetcher.clone(),
            host.store.clone(),
            &scope,
            &config.subscription,
        )?;

        debug!(scope = %scope, cache = %config.cache_version, "Created service worker");

        Ok(Self {
            router: Router::new(&config.api_marker),
            config,
            caches,
            strategies,
            lifecycle,
            notifications,
            sync,
            subscriptions,
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn caches(&self) -> &Arc<CacheStorage> {
        &self.caches
    }

    pub async fn state(&self) -> WorkerState {
        self.lifecycle.state().await
    }

    /// Whether install asked to activate without waiting for old pages.
    pub fn skip_waiting_requested(&self) -> bool {
        self.lifecycle.skip_waiting_requested()
    }

    /// Dispatch one event. The host must await this, and settle any
    /// returned [`WaitUntil`], before stopping the worker.
    pub async fn handle(&self, event: WorkerEvent) -> Result<EventOutcome, SwError> {
        debug!(event = event.name(), "Dispatching event");

        match event {
            WorkerEvent::Install => {
                self.lifecycle.install().await?;
                Ok(EventOutcome::Installed)
            }
            WorkerEvent::Activate => Ok(EventOutcome::Activated(self.activate().await?)),
            WorkerEvent::Fetch(request) => Ok(EventOutcome::Fetch(self.handle_fetch(&request).await)),
            WorkerEvent::Push { data } => {
                let outcome = self.notifications.on_push(data.as_deref()).await?;
                Ok(EventOutcome::Displayed(outcome))
            }
            WorkerEvent::NotificationClick {
                notification,
                action,
            } => {
                let outcome = self
                    .notifications
                    .on_click(&notification, action.as_deref())
                    .await?;
                Ok(EventOutcome::Clicked(outcome))
            }
            WorkerEvent::Sync { tag } => Ok(EventOutcome::Synced(self.sync.on_sync(&tag).await?)),
            WorkerEvent::Message(message) => Ok(EventOutcome::Message(self.on_message(message).await?)),
            WorkerEvent::PushSubscriptionChange { old, new } => {
                let (subscription, persisted) = self
                    .subscriptions
                    .on_subscription_change(old.as_ref(), new)
                    .await?;
                Ok(EventOutcome::Subscribed {
                    subscription,
                    persisted,
                })
            }
            WorkerEvent::Error { message } => {
                error!(message = %message, "Worker error");
                Ok(EventOutcome::Logged)
            }
            WorkerEvent::UnhandledRejection { reason } => {
                error!(reason = %reason, "Unhandled rejection in worker");
                Ok(EventOutcome::Logged)
            }
        }
    }

    /// Resolve a fetch. Requests are only intercepted once the worker is
    /// active and the router picks a strategy.
    pub async fn handle_fetch(&self, request: &Request) -> FetchOutcome {
        if !self.lifecycle.is_active().await {
            debug!(url = %request.url, "Not active, passing fetch through");
            return FetchOutcome::passthrough();
        }
        let Some(strategy) = self.router.route(request) else {
            return FetchOutcome::passthrough();
        };

        let mut wait_until = WaitUntil::new();
        let result = self.strategies.execute(strategy, request, &mut wait_until).await;
        if let Err(e) = &result {
            warn!(url = %request.url, ?strategy, error = %e, "Fetch failed");
        }
        FetchOutcome {
            respond_with: Some(result),
            wait_until,
        }
    }

    async fn activate(&self) -> Result<ActivationReport, SwError> {
        let report = self.lifecycle.activate().await?;
        if self.config.announce_updates {
            if let Err(e) = self.notifications.announce_update().await {
                warn!(error = %e, "Could not show update notification");
            }
        }
        Ok(report)
    }

    async fn on_message(&self, event: MessageEvent) -> Result<Option<ClientMessage>, SwError> {
        let Some(message) = ClientMessage::decode(&event.data) else {
            return Ok(None);
        };

        match &message {
            ClientMessage::SkipWaiting => {
                self.lifecycle.request_skip_waiting();
                if self.lifecycle.state().await == WorkerState::Waiting {
                    info!("Skip waiting requested by page, activating");
                    self.activate().await?;
                }
            }
            ClientMessage::ShowNotification { title, options } => {
                self.notifications
                    .show_requested(title.clone(), options.clone())
                    .await?;
            }
            ClientMessage::GetClientId => {
                let reply = ClientIdReply {
                    client_id: event.source.clone().unwrap_or_default(),
                };
                match &event.reply_port {
                    Some(port) => {
                        let reply: JsonValue = serde_json::to_value(reply)?;
                        if port.send(reply).is_err() {
                            debug!("Reply port closed before GET_CLIENT_ID answer");
                        }
                    }
                    None => debug!("GET_CLIENT_ID without a reply port"),
                }
            }
            ClientMessage::Unknown => {
                debug!(data = %event.data, "Ignoring unknown message type");
            }
        }
        Ok(Some(message))
    }

    /// Make sure a push subscription exists and has been persisted.
    pub async fn subscribe_to_push(&self) -> Result<(PushSubscription, PersistedTo), SwError> {
        self.subscriptions.ensure_subscription().await
    }
}
