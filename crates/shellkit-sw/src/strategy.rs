//! Caching strategies.
//!
//! Each strategy resolves a request to a response from some mix of the
//! cache buckets and the network. Cache writes are housekeeping: a failed
//! write is logged and never turns a good response into an error.

use std::sync::Arc;

use shellkit_cache::{CacheStorage, RequestKey};
use shellkit_net::http::Method;
use shellkit_net::{Fetcher, NetError, Request, Response};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::router::Strategy;

/// A request that could not be answered from the network or the cache.
#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("{key} failed and has no cached fallback: {source}")]
    NoFallback {
        key: String,
        #[source]
        source: NetError,
    },
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
}

#[derive(Debug, Clone)]
pub struct StrategyResponse {
    pub response: Response,
    pub source: ResponseSource,
}

impl StrategyResponse {
    fn network(response: Response) -> Self {
        Self {
            response,
            source: ResponseSource::Network,
        }
    }

    fn cache(response: Response) -> Self {
        Self {
            response,
            source: ResponseSource::Cache,
        }
    }
}

/// Background work an event started. The host must settle it before it
/// may terminate the worker, or pending cache writes are lost.
#[derive(Debug, Default)]
pub struct WaitUntil {
    tasks: Vec<JoinHandle<()>>,
}

impl WaitUntil {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    pub fn extend(&mut self, other: WaitUntil) {
        self.tasks.extend(other.tasks);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every task. A panicked task is logged, not propagated.
    pub async fn settle(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task did not complete");
            }
        }
    }
}

/// Strategy executor bound to one cache generation.
#[derive(Clone)]
pub struct Strategies {
    caches: Arc<CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    current_cache: String,
    api_cache: String,
    cache_first_write_back: bool,
}

impl Strategies {
    pub fn new(
        caches: Arc<CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        current_cache: impl Into<String>,
        api_cache: impl Into<String>,
    ) -> Self {
        Self {
            caches,
            fetcher,
            current_cache: current_cache.into(),
            api_cache: api_cache.into(),
            cache_first_write_back: false,
        }
    }

    /// Store assets fetched on a Cache-First miss into the current
    /// generation. Off by default: assets are expected to be precached.
    pub fn with_cache_first_write_back(mut self, enabled: bool) -> Self {
        self.cache_first_write_back = enabled;
        self
    }

    pub async fn execute(
        &self,
        strategy: Strategy,
        request: &Request,
        wait_until: &mut WaitUntil,
    ) -> Result<StrategyResponse, StrategyError> {
        match strategy {
            Strategy::NetworkFirst => self.network_first(request).await,
            Strategy::CacheFirst => self.cache_first(request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request, wait_until).await,
        }
    }

    /// Network, then the API bucket, then any bucket. A successful network
    /// response is stored in the API bucket before it is returned.
    pub async fn network_first(&self, request: &Request) -> Result<StrategyResponse, StrategyError> {
        let key = RequestKey::from(request);

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.ok() {
                    store(&self.caches, &self.api_cache, request, &key, &response).await;
                }
                Ok(StrategyResponse::network(response))
            }
            Err(source) => {
                debug!(key = %key, error = %source, "Network failed, trying cache");
                let cached = match self.caches.match_in(&self.api_cache, &key).await {
                    Some(hit) => Some(hit),
                    None => self.caches.match_any(&key).await,
                };
                cached.map(StrategyResponse::cache).ok_or_else(|| {
                    warn!(key = %key, "No cached fallback for failed API request");
                    StrategyError::NoFallback {
                        key: key.to_string(),
                        source,
                    }
                })
            }
        }
    }

    /// Any cached match without touching the network, else the network.
    pub async fn cache_first(&self, request: &Request) -> Result<StrategyResponse, StrategyError> {
        let key = RequestKey::from(request);

        if let Some(hit) = self.caches.match_any(&key).await {
            debug!(key = %key, "Cache hit");
            return Ok(StrategyResponse::cache(hit));
        }

        let response = self
            .fetcher
            .fetch(request)
            .await
            .map_err(|source| StrategyError::NoFallback {
                key: key.to_string(),
                source,
            })?;

        if self.cache_first_write_back && response.ok() {
            store(&self.caches, &self.current_cache, request, &key, &response).await;
        }
        Ok(StrategyResponse::network(response))
    }

    /// Cached match immediately with a background refresh; without a match,
    /// wait for the network. Successful network responses go to the current
    /// generation.
    pub async fn stale_while_revalidate(
        &self,
        request: &Request,
        wait_until: &mut WaitUntil,
    ) -> Result<StrategyResponse, StrategyError> {
        let key = RequestKey::from(request);

        match self.caches.match_any(&key).await {
            Some(hit) => {
                debug!(key = %key, "Serving stale, revalidating");
                let this = self.clone();
                let request = request.clone();
                // The refresh writes into the current generation; keep it alive.
                let lease = self.caches.lease(&self.current_cache).await;
                wait_until.push(tokio::spawn(async move {
                    this.revalidate(request, key).await;
                    drop(lease);
                }));
                Ok(StrategyResponse::cache(hit))
            }
            None => {
                let response = self.fetcher.fetch(request).await.map_err(|source| {
                    StrategyError::NoFallback {
                        key: key.to_string(),
                        source,
                    }
                })?;
                if response.ok() {
                    store(&self.caches, &self.current_cache, request, &key, &response).await;
                }
                Ok(StrategyResponse::network(response))
            }
        }
    }

    async fn revalidate(&self, request: Request, key: RequestKey) {
        match self.fetcher.fetch(&request).await {
            Ok(response) if response.ok() => {
                store(&self.caches, &self.current_cache, &request, &key, &response).await;
            }
            Ok(response) => {
                debug!(key = %key, status = %response.status, "Revalidation returned an error status");
            }
            Err(e) => {
                debug!(key = %key, error = %e, "Revalidation failed");
            }
        }
    }
}

/// Best-effort write. Only GET responses are stored, matching the platform
/// Cache API.
async fn store(
    caches: &CacheStorage,
    bucket: &str,
    request: &Request,
    key: &RequestKey,
    response: &Response,
) {
    if request.method != Method::GET {
        return;
    }
    if let Err(e) = caches.put(bucket, key.clone(), response.clone()).await {
        warn!(cache = bucket, key = %key, error = %e, "Cache write failed");
    }
}
