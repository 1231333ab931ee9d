//! Install/activate state machine.
//!
//! ```text
//! Installing ──install ok──→ Waiting ──activate──→ Activating ──→ Active
//!      └──────install failed──→ Redundant
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use shellkit_cache::{CacheStorage, RequestKey};
use shellkit_net::{Fetcher, Request};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::host::ClientsHost;
use crate::SwError;

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkerState {
    /// Install event running.
    #[default]
    Installing,
    /// Installed, waiting to activate.
    Waiting,
    /// Activate event running.
    Activating,
    /// Controlling pages; fetches are intercepted.
    Active,
    /// Install failed.
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Installing => "installing",
            WorkerState::Waiting => "waiting",
            WorkerState::Activating => "activating",
            WorkerState::Active => "active",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// What activation cleaned up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// Old generations deleted.
    pub deleted: Vec<String>,
    /// Generations that could not be deleted; retried on the next activation.
    pub failed: Vec<String>,
    /// Whether open pages were claimed.
    pub claimed: bool,
}

pub struct Lifecycle {
    state: RwLock<WorkerState>,
    skip_waiting: AtomicBool,
    caches: Arc<CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    clients: Arc<dyn ClientsHost>,
    current_cache: String,
    api_cache: String,
    precache: Vec<Url>,
}

impl Lifecycle {
    pub fn new(
        caches: Arc<CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        clients: Arc<dyn ClientsHost>,
        current_cache: impl Into<String>,
        api_cache: impl Into<String>,
        precache: Vec<Url>,
    ) -> Self {
        Self {
            state: RwLock::new(WorkerState::Installing),
            skip_waiting: AtomicBool::new(false),
            caches,
            fetcher,
            clients,
            current_cache: current_cache.into(),
            api_cache: api_cache.into(),
            precache,
        }
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    pub async fn is_active(&self) -> bool {
        self.state().await == WorkerState::Active
    }

    /// Whether the worker asked to activate without waiting for old pages.
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    pub fn request_skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    /// Precache the manifest into the current generation. Any failed asset
    /// fails the whole install and nothing is stored.
    pub async fn install(&self) -> Result<(), SwError> {
        self.expect_state(WorkerState::Installing, "installing").await?;
        info!(cache = %self.current_cache, assets = self.precache.len(), "Installing");

        match self.precache_assets().await {
            Ok(()) => {
                *self.state.write().await = WorkerState::Waiting;
                self.request_skip_waiting();
                info!(cache = %self.current_cache, "Installed");
                Ok(())
            }
            Err(e) => {
                *self.state.write().await = WorkerState::Redundant;
                error!(cache = %self.current_cache, error = %e, "Install failed");
                Err(e)
            }
        }
    }

    async fn precache_assets(&self) -> Result<(), SwError> {
        let requests: Vec<Request> = self.precache.iter().cloned().map(Request::get).collect();
        let fetched = join_all(requests.iter().map(|r| self.fetcher.fetch(r))).await;

        let mut entries = Vec::with_capacity(requests.len());
        for (request, result) in requests.iter().zip(fetched) {
            let response = result.map_err(|e| {
                SwError::InstallFailed(format!("{}: {}", request.url, e))
            })?;
            if !response.ok() {
                return Err(SwError::InstallFailed(format!(
                    "{}: status {}",
                    request.url, response.status
                )));
            }
            entries.push((RequestKey::from(request), response));
        }

        self.caches.put_all(&self.current_cache, entries).await?;
        Ok(())
    }

    /// Delete every other generation, then claim open pages. Never rolls
    /// back: failures are logged and left for the next activation.
    pub async fn activate(&self) -> Result<ActivationReport, SwError> {
        self.transition(WorkerState::Waiting, WorkerState::Activating, "waiting")
            .await?;
        info!(cache = %self.current_cache, "Activating");

        let mut report = ActivationReport::default();
        for name in self.caches.keys().await {
            if name == self.current_cache || name == self.api_cache {
                continue;
            }
            match self.caches.delete(&name).await {
                Ok(true) => {
                    debug!(cache = %name, "Deleted old cache generation");
                    report.deleted.push(name);
                }
                Ok(false) => debug!(cache = %name, "Old cache generation already gone"),
                Err(e) => {
                    warn!(cache = %name, error = %e, "Could not delete old cache generation");
                    report.failed.push(name);
                }
            }
        }

        match self.clients.claim().await {
            Ok(()) => report.claimed = true,
            Err(e) => warn!(error = %e, "Failed to claim clients"),
        }

        *self.state.write().await = WorkerState::Active;
        info!(
            cache = %self.current_cache,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "Activated"
        );
        Ok(report)
    }

    /// Check-and-set under one lock so two activations cannot interleave.
    async fn transition(
        &self,
        from: WorkerState,
        to: WorkerState,
        name: &'static str,
    ) -> Result<(), SwError> {
        let mut state = self.state.write().await;
        if *state != from {
            return Err(SwError::InvalidState {
                expected: name,
                actual: *state,
            });
        }
        *state = to;
        Ok(())
    }

    async fn expect_state(&self, expected: WorkerState, name: &'static str) -> Result<(), SwError> {
        let actual = self.state().await;
        if actual != expected {
            return Err(SwError::InvalidState {
                expected: name,
                actual,
            });
        }
        Ok(())
    }
}
