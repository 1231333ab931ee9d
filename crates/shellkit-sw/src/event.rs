//! Events delivered by the host, and what handling them produced.

use bytes::Bytes;
use shellkit_net::Request;

use crate::lifecycle::ActivationReport;
use crate::message::{ClientMessage, MessageEvent};
use crate::notification::{ClickOutcome, DisplayOutcome, Notification};
use crate::strategy::{StrategyError, StrategyResponse, WaitUntil};
use crate::subscription::{PersistedTo, PushSubscription};
use crate::sync::SyncOutcome;

/// Every event a worker can receive.
#[derive(Debug)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    Push {
        data: Option<Bytes>,
    },
    NotificationClick {
        notification: Notification,
        action: Option<String>,
    },
    Sync {
        tag: String,
    },
    Message(MessageEvent),
    PushSubscriptionChange {
        old: Option<PushSubscription>,
        new: Option<PushSubscription>,
    },
    Error {
        message: String,
    },
    UnhandledRejection {
        reason: String,
    },
}

impl WorkerEvent {
    /// Event name as the platform spells it.
    pub fn name(&self) -> &'static str {
        match self {
            WorkerEvent::Install => "install",
            WorkerEvent::Activate => "activate",
            WorkerEvent::Fetch(_) => "fetch",
            WorkerEvent::Push { .. } => "push",
            WorkerEvent::NotificationClick { .. } => "notificationclick",
            WorkerEvent::Sync { .. } => "sync",
            WorkerEvent::Message(_) => "message",
            WorkerEvent::PushSubscriptionChange { .. } => "pushsubscriptionchange",
            WorkerEvent::Error { .. } => "error",
            WorkerEvent::UnhandledRejection { .. } => "unhandledrejection",
        }
    }
}

/// Result of a fetch event.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// `None`: not intercepted, the host handles the request itself.
    pub respond_with: Option<Result<StrategyResponse, StrategyError>>,
    /// Background work the host must settle before stopping the worker.
    pub wait_until: WaitUntil,
}

impl FetchOutcome {
    pub fn passthrough() -> Self {
        Self::default()
    }

    pub fn is_intercepted(&self) -> bool {
        self.respond_with.is_some()
    }
}

#[derive(Debug)]
pub enum EventOutcome {
    Installed,
    Activated(ActivationReport),
    Fetch(FetchOutcome),
    Displayed(DisplayOutcome),
    Clicked(ClickOutcome),
    Synced(SyncOutcome),
    /// The decoded message, or `None` when it was malformed.
    Message(Option<ClientMessage>),
    Subscribed {
        subscription: PushSubscription,
        persisted: PersistedTo,
    },
    /// Error and rejection events are only logged.
    Logged,
}
