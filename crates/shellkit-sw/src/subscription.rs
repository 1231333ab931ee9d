//! Push subscription setup and persistence.
//!
//! A subscription is POSTed to the app server. When that fails (transport
//! error or non-2xx after retries) it is written to the local store instead,
//! so the page can forward it later.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use shellkit_cache::LocalStore;
use shellkit_common::{retry_when, RetryConfig, ShellKitError};
use shellkit_net::{Fetcher, Request};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::SubscriptionConfig;
use crate::host::PushManager;
use crate::SwError;

/// A push subscription as the platform serializes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    pub endpoint: String,
    pub expiration_time: Option<u64>,
    pub keys: SubscriptionKeys,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// `PushManager.subscribe()` options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    pub user_visible_only: bool,
    /// Raw VAPID public key bytes; empty when none is configured.
    pub application_server_key: Vec<u8>,
}

/// Where a subscription ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistedTo {
    Remote,
    Local,
}

/// Decode a base64url VAPID key, padded or not.
pub fn decode_application_server_key(key: &str) -> Result<Vec<u8>, SwError> {
    URL_SAFE_NO_PAD
        .decode(key.trim().trim_end_matches('='))
        .map_err(|e| SwError::Config(format!("invalid application server key: {e}")))
}

pub struct SubscriptionManager {
    push: Option<Arc<dyn PushManager>>,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<LocalStore>,
    endpoint: Url,
    storage_key: String,
    application_server_key: Vec<u8>,
    retry: RetryConfig,
}

impl SubscriptionManager {
    pub fn new(
        push: Option<Arc<dyn PushManager>>,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<LocalStore>,
        scope: &Url,
        config: &SubscriptionConfig,
    ) -> Result<Self, SwError> {
        let application_server_key = match config.application_server_key.as_deref() {
            Some(key) => decode_application_server_key(key)?,
            None => Vec::new(),
        };

        Ok(Self {
            push,
            fetcher,
            store,
            endpoint: scope.join(&config.endpoint)?,
            storage_key: config.storage_key.clone(),
            application_server_key,
            retry: config.retry(),
        })
    }

    pub fn is_supported(&self) -> bool {
        self.push.is_some()
    }

    fn push_manager(&self) -> Result<&Arc<dyn PushManager>, SwError> {
        self.push
            .as_ref()
            .ok_or_else(|| SwError::Unsupported("push messaging is not available on this host".into()))
    }

    /// Reuse the current subscription or create one, then persist it.
    pub async fn ensure_subscription(&self) -> Result<(PushSubscription, PersistedTo), SwError> {
        let push = self.push_manager()?;
        let subscription = match push.get_subscription().await? {
            Some(existing) => {
                debug!(endpoint = %existing.endpoint, "Reusing push subscription");
                existing
            }
            None => self.subscribe().await?,
        };
        let persisted = self.persist(&subscription).await?;
        Ok((subscription, persisted))
    }

    async fn subscribe(&self) -> Result<PushSubscription, SwError> {
        let options = SubscribeOptions {
            user_visible_only: true,
            application_server_key: self.application_server_key.clone(),
        };
        let subscription = self.push_manager()?.subscribe(&options).await?;
        info!(endpoint = %subscription.endpoint, "Subscribed to push");
        Ok(subscription)
    }

    /// Handle `pushsubscriptionchange`: adopt the replacement if the
    /// platform supplied one, otherwise subscribe again.
    pub async fn on_subscription_change(
        &self,
        old: Option<&PushSubscription>,
        new: Option<PushSubscription>,
    ) -> Result<(PushSubscription, PersistedTo), SwError> {
        info!(
            old = old.map(|s| s.endpoint.as_str()).unwrap_or("none"),
            "Push subscription changed"
        );
        let subscription = match new {
            Some(new) => new,
            None => self.subscribe().await?,
        };
        let persisted = self.persist(&subscription).await?;
        Ok((subscription, persisted))
    }

    /// POST to the app server, falling back to the local store.
    pub async fn persist(&self, subscription: &PushSubscription) -> Result<PersistedTo, SwError> {
        let request = Request::post_json(self.endpoint.clone(), subscription)?;

        let sent = retry_when(
            &self.retry,
            || self.post(&request),
            ShellKitError::is_retryable,
        )
        .await;

        match sent {
            Ok(()) => {
                info!(endpoint = %self.endpoint, "Push subscription sent to server");
                Ok(PersistedTo::Remote)
            }
            Err(e) => {
                warn!(
                    endpoint = %self.endpoint,
                    error = %e,
                    category = e.category(),
                    "Could not send push subscription, storing locally"
                );
                self.store.set_json(&self.storage_key, subscription).await?;
                Ok(PersistedTo::Local)
            }
        }
    }

    async fn post(&self, request: &Request) -> Result<(), ShellKitError> {
        let response = self
            .fetcher
            .fetch(request)
            .await
            .map_err(|e| ShellKitError::network_with_source("subscription POST failed", e))?;

        if response.ok() {
            Ok(())
        } else if response.status.is_server_error() {
            Err(ShellKitError::network(format!("server answered {}", response.status)))
        } else {
            Err(ShellKitError::InvalidArgument(format!(
                "server rejected subscription: {}",
                response.status
            )))
        }
    }

    /// The locally stored fallback copy, if any.
    pub async fn stored(&self) -> Option<PushSubscription> {
        self.store.get_json(&self.storage_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{subscription, url, FakeNetwork, FakePush, ORIGIN};
    use shellkit_net::http::Method;

    const ENDPOINT: &str = "/api/push-subscription";

    fn manager(
        push: Option<Arc<FakePush>>,
        network: &Arc<FakeNetwork>,
        store: &Arc<LocalStore>,
        config: SubscriptionConfig,
    ) -> SubscriptionManager {
        SubscriptionManager::new(
            push.map(|p| p as Arc<dyn PushManager>),
            network.clone(),
            store.clone(),
            &Url::parse(ORIGIN).unwrap(),
            &config,
        )
        .unwrap()
    }

    #[test]
    fn test_decode_application_server_key() {
        assert_eq!(decode_application_server_key("AQID").unwrap(), vec![1, 2, 3]);
        // Padded input and URL-safe alphabet.
        assert_eq!(decode_application_server_key("-_8=").unwrap(), vec![0xfb, 0xff]);
        assert!(matches!(
            decode_application_server_key("not base64!"),
            Err(SwError::Config(_))
        ));
    }

    #[test]
    fn test_subscription_json_is_camel_case() {
        let json = serde_json::to_value(subscription("https://push.example/x")).unwrap();
        assert_eq!(json["expirationTime"], serde_json::Value::Null);
        assert_eq!(json["keys"]["p256dh"], "BPub");
    }

    #[tokio::test]
    async fn test_ensure_subscribes_and_posts() {
        let network = FakeNetwork::new();
        network.respond(ENDPOINT, 201, "");
        let store = Arc::new(LocalStore::in_memory());
        let push = FakePush::new();
        let config = SubscriptionConfig {
            application_server_key: Some("AQID".into()),
            ..Default::default()
        };
        let manager = manager(Some(push.clone()), &network, &store, config);

        let (sub, persisted) = manager.ensure_subscription().await.unwrap();

        assert_eq!(persisted, PersistedTo::Remote);
        assert_eq!(sub.endpoint, "https://push.example/sub/1");
        assert_eq!(
            push.subscribe_calls(),
            vec![SubscribeOptions {
                user_visible_only: true,
                application_server_key: vec![1, 2, 3],
            }]
        );
        assert_eq!(
            network.calls(),
            vec![(Method::POST, url(ENDPOINT).to_string())]
        );
        assert!(manager.stored().await.is_none());
    }

    #[tokio::test]
    async fn test_existing_subscription_is_reused() {
        let network = FakeNetwork::new();
        network.respond(ENDPOINT, 200, "");
        let store = Arc::new(LocalStore::in_memory());
        let push = FakePush::with_existing(subscription("https://push.example/existing"));
        let manager = manager(Some(push.clone()), &network, &store, Default::default());

        let (sub, _) = manager.ensure_subscription().await.unwrap();

        assert_eq!(sub.endpoint, "https://push.example/existing");
        assert!(push.subscribe_calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_post_falls_back_to_local_store() {
        let network = FakeNetwork::new();
        network.set_online(false);
        let store = Arc::new(LocalStore::in_memory());
        let manager = manager(Some(FakePush::new()), &network, &store, Default::default());

        let (sub, persisted) = manager.ensure_subscription().await.unwrap();

        assert_eq!(persisted, PersistedTo::Local);
        assert_eq!(manager.stored().await, Some(sub));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let network = FakeNetwork::new();
        network.respond(ENDPOINT, 503, "");
        let store = Arc::new(LocalStore::in_memory());
        let config = SubscriptionConfig {
            attempts: 3,
            retry_delay_ms: 1,
            ..Default::default()
        };
        let manager = manager(Some(FakePush::new()), &network, &store, config);

        let persisted = manager
            .persist(&subscription("https://push.example/x"))
            .await
            .unwrap();

        assert_eq!(persisted, PersistedTo::Local);
        assert_eq!(network.call_count(ENDPOINT), 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let network = FakeNetwork::new();
        network.respond(ENDPOINT, 400, "");
        let store = Arc::new(LocalStore::in_memory());
        let config = SubscriptionConfig {
            attempts: 3,
            retry_delay_ms: 1,
            ..Default::default()
        };
        let manager = manager(Some(FakePush::new()), &network, &store, config);

        manager
            .persist(&subscription("https://push.example/x"))
            .await
            .unwrap();

        assert_eq!(network.call_count(ENDPOINT), 1);
    }

    #[tokio::test]
    async fn test_change_with_new_subscription_persists_it() {
        let network = FakeNetwork::new();
        network.respond(ENDPOINT, 200, "");
        let store = Arc::new(LocalStore::in_memory());
        let push = FakePush::new();
        let manager = manager(Some(push.clone()), &network, &store, Default::default());

        let old = subscription("https://push.example/old");
        let new = subscription("https://push.example/new");
        let (sub, _) = manager
            .on_subscription_change(Some(&old), Some(new.clone()))
            .await
            .unwrap();

        assert_eq!(sub, new);
        assert!(push.subscribe_calls().is_empty());
    }

    #[tokio::test]
    async fn test_change_without_new_subscription_resubscribes() {
        let network = FakeNetwork::new();
        network.respond(ENDPOINT, 200, "");
        let store = Arc::new(LocalStore::in_memory());
        let push = FakePush::new();
        let manager = manager(Some(push.clone()), &network, &store, Default::default());

        let old = subscription("https://push.example/old");
        let (sub, persisted) = manager.on_subscription_change(Some(&old), None).await.unwrap();

        assert_eq!(sub.endpoint, "https://push.example/sub/1");
        assert_eq!(persisted, PersistedTo::Remote);
        assert_eq!(push.subscribe_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_push_manager_is_unsupported() {
        let network = FakeNetwork::new();
        let store = Arc::new(LocalStore::in_memory());
        let manager = manager(None, &network, &store, Default::default());

        assert!(!manager.is_supported());
        assert!(matches!(
            manager.ensure_subscription().await,
            Err(SwError::Unsupported(_))
        ));
        assert!(matches!(
            manager.on_subscription_change(None, None).await,
            Err(SwError::Unsupported(_))
        ));
    }
}
