//! Page ↔ worker message protocol.
//!
//! Messages are JSON objects discriminated by `type`:
//!
//! ```text
//! page → worker   { "type": "SKIP_WAITING" }
//!                 { "type": "SHOW_NOTIFICATION", "title": "...", "options": {...} }
//!                 { "type": "GET_CLIENT_ID" }            (reply on the port)
//! worker → page   { "type": "SYNC_DATA" }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tracing::debug;

use crate::notification::NotificationOptions;

/// A message sent by a page to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    SkipWaiting,
    ShowNotification {
        title: String,
        #[serde(default)]
        options: NotificationOptions,
    },
    GetClientId,
    /// Any other `type`.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Decode a posted value. Values that are not a tagged object, or whose
    /// known variant is malformed, yield `None`.
    pub fn decode(data: &JsonValue) -> Option<Self> {
        match ClientMessage::deserialize(data) {
            Ok(message) => Some(message),
            Err(e) => {
                debug!(error = %e, "Ignoring malformed message");
                None
            }
        }
    }
}

/// A message sent by the worker to its pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    SyncData,
}

/// Reply to `GET_CLIENT_ID`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientIdReply {
    pub client_id: String,
}

/// A `message` event: the posted value, its sender, and an optional reply
/// port.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub data: JsonValue,
    /// Sending client id, when the host knows it.
    pub source: Option<String>,
    pub reply_port: Option<mpsc::UnboundedSender<JsonValue>>,
}

impl MessageEvent {
    pub fn new(data: JsonValue) -> Self {
        Self {
            data,
            source: None,
            reply_port: None,
        }
    }

    pub fn from_client(mut self, client_id: impl Into<String>) -> Self {
        self.source = Some(client_id.into());
        self
    }

    /// Attach a reply port and return its receiving end.
    pub fn with_reply_port(mut self) -> (Self, mpsc::UnboundedReceiver<JsonValue>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.reply_port = Some(tx);
        (self, rx)
    }
}
