//! Push payload → notification translation and click routing.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::NotificationDefaults;
use crate::host::{ClientQuery, ClientsHost, NotificationSurface};
use crate::sync::PendingQueue;
use crate::SwError;

/// Action id that dismisses a notification without navigating.
pub const CLOSE_ACTION: &str = "close";

/// A button on a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl NotificationAction {
    pub fn new(action: &str, title: &str, icon: Option<&str>) -> Self {
        Self {
            action: action.to_string(),
            title: title.to_string(),
            icon: icon.map(str::to_string),
        }
    }
}

/// `NotificationOptions` as the platform understands them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NotificationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    /// Replace-vs-stack key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Alert again when replacing a notification with the same tag.
    pub renotify: bool,
    pub require_interaction: bool,
    pub silent: bool,
    pub vibrate: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    pub actions: Vec<NotificationAction>,
    pub data: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    #[serde(default)]
    pub options: NotificationOptions,
}

impl Notification {
    pub fn new(title: impl Into<String>, options: NotificationOptions) -> Self {
        Self {
            title: title.into(),
            options,
        }
    }

    /// `data.url`, or `/` when absent.
    pub fn target_url(&self) -> &str {
        self.options
            .data
            .get("url")
            .and_then(JsonValue::as_str)
            .unwrap_or("/")
    }
}

/// A decoded push message body.
#[derive(Debug, Clone, PartialEq)]
pub enum PushPayload {
    /// A JSON object.
    Structured(Map<String, JsonValue>),
    /// Anything else, as (lossy UTF-8) text.
    Text(String),
    /// No data attached.
    Empty,
}

impl PushPayload {
    pub fn parse(data: Option<&[u8]>) -> Self {
        let Some(data) = data else {
            return Self::Empty;
        };
        match serde_json::from_slice::<JsonValue>(data) {
            Ok(JsonValue::Object(fields)) => Self::Structured(fields),
            Ok(_) | Err(_) => {
                debug!("Push payload is not a JSON object, using it as text");
                Self::Text(String::from_utf8_lossy(data).into_owned())
            }
        }
    }
}

/// How a display request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayOutcome {
    Shown(Notification),
    /// Display failed; kept for the next notification sync.
    Queued(Notification),
}

/// What a notification click did.
#[derive(Debug, Clone, PartialEq)]
pub enum ClickOutcome {
    /// The close action: nothing else happens.
    Dismissed,
    /// An open window on our origin was focused and navigated.
    Focused { client_id: String, url: Url },
    /// A new window was opened.
    Opened { url: Url },
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

pub struct NotificationBridge {
    surface: Arc<dyn NotificationSurface>,
    clients: Arc<dyn ClientsHost>,
    queue: PendingQueue,
    defaults: NotificationDefaults,
    scope: Url,
}

impl NotificationBridge {
    pub fn new(
        surface: Arc<dyn NotificationSurface>,
        clients: Arc<dyn ClientsHost>,
        queue: PendingQueue,
        defaults: NotificationDefaults,
        scope: Url,
    ) -> Self {
        Self {
            surface,
            clients,
            queue,
            defaults,
            scope,
        }
    }

    /// Build the notification for a push payload: payload fields
    /// shallow-override the defaults, and `data` is merged over
    /// `{ url, timestamp }`. Interaction, sound and vibration are fixed and
    /// cannot be changed by the payload.
    pub fn notification_for_push(&self, payload: &PushPayload) -> Notification {
        let d = &self.defaults;
        let mut fields = Map::new();
        fields.insert("title".into(), d.title.clone().into());
        fields.insert("body".into(), d.body.clone().into());
        fields.insert("icon".into(), d.icon.clone().into());
        fields.insert("badge".into(), d.badge.clone().into());
        fields.insert("tag".into(), d.tag.clone().into());
        fields.insert("renotify".into(), d.renotify.into());

        match payload {
            PushPayload::Structured(parsed) => {
                fields.extend(parsed.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            PushPayload::Text(text) if !text.is_empty() => {
                fields.insert("body".into(), text.clone().into());
            }
            PushPayload::Text(_) | PushPayload::Empty => {}
        }

        let string = |key: &str, fallback: &str| {
            fields
                .get(key)
                .and_then(JsonValue::as_str)
                .unwrap_or(fallback)
                .to_string()
        };
        let flag = |key: &str, fallback: bool| {
            fields
                .get(key)
                .and_then(JsonValue::as_bool)
                .unwrap_or(fallback)
        };

        let timestamp = now_millis();
        let mut data = Map::new();
        data.insert("url".into(), string("url", "/").into());
        data.insert("timestamp".into(), timestamp.into());
        if let Some(JsonValue::Object(extra)) = fields.get("data") {
            data.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        let icon = string("icon", &d.icon);
        Notification::new(
            string("title", &d.title),
            NotificationOptions {
                body: Some(string("body", &d.body)),
                icon: Some(icon.clone()),
                badge: Some(string("badge", &d.badge)),
                tag: Some(string("tag", &d.tag)),
                renotify: flag("renotify", d.renotify),
                require_interaction: true,
                silent: false,
                vibrate: d.vibrate.clone(),
                timestamp: Some(timestamp),
                actions: vec![
                    NotificationAction::new("open", "Open", Some(&icon)),
                    NotificationAction::new(CLOSE_ACTION, "Close", Some(&icon)),
                ],
                data,
            },
        )
    }

    /// Handle a push event.
    pub async fn on_push(&self, data: Option<&[u8]>) -> Result<DisplayOutcome, SwError> {
        let notification = self.notification_for_push(&PushPayload::parse(data));
        info!(title = %notification.title, tag = ?notification.options.tag, "Push received");
        self.display(notification).await
    }

    /// Show a page-requested notification. Page options are kept, but the
    /// notification always requires interaction and vibrates.
    pub async fn show_requested(
        &self,
        title: String,
        mut options: NotificationOptions,
    ) -> Result<DisplayOutcome, SwError> {
        options.require_interaction = true;
        options.vibrate = self.defaults.vibrate.clone();
        self.display(Notification::new(title, options)).await
    }

    /// Tell the user a new version took over. Not queued on failure.
    pub async fn announce_update(&self) -> Result<(), SwError> {
        let options = NotificationOptions {
            body: Some("The app has been updated to the latest version".to_string()),
            icon: Some(self.defaults.icon.clone()),
            tag: Some("app-updated".to_string()),
            require_interaction: false,
            actions: vec![NotificationAction::new(
                "reload",
                "Reload",
                Some(&self.defaults.icon),
            )],
            ..Default::default()
        };
        self.show(&Notification::new("App updated", options)).await
    }

    /// Show directly, without queueing on failure.
    pub async fn show(&self, notification: &Notification) -> Result<(), SwError> {
        self.surface.show(notification).await?;
        Ok(())
    }

    async fn display(&self, notification: Notification) -> Result<DisplayOutcome, SwError> {
        match self.surface.show(&notification).await {
            Ok(()) => Ok(DisplayOutcome::Shown(notification)),
            Err(e) => {
                warn!(title = %notification.title, error = %e, "Display failed, queueing");
                self.queue.push(notification.clone()).await?;
                Ok(DisplayOutcome::Queued(notification))
            }
        }
    }

    /// Handle a notification click.
    pub async fn on_click(
        &self,
        notification: &Notification,
        action: Option<&str>,
    ) -> Result<ClickOutcome, SwError> {
        if let Err(e) = self.surface.close(notification).await {
            warn!(error = %e, "Failed to close notification");
        }

        if action == Some(CLOSE_ACTION) {
            debug!("Close action, nothing to open");
            return Ok(ClickOutcome::Dismissed);
        }

        let target = match self.scope.join(notification.target_url()) {
            Ok(target) => target,
            Err(e) => {
                warn!(url = notification.target_url(), error = %e, "Invalid notification url, using scope root");
                self.scope.clone()
            }
        };

        match self.clients.match_all(&ClientQuery::windows()).await {
            Ok(windows) => {
                let origin = self.scope.origin();
                if let Some(client) = windows.into_iter().find(|c| c.url.origin() == origin) {
                    match self.focus_and_navigate(&client.id, &target).await {
                        Ok(()) => {
                            info!(client_id = %client.id, url = %target, "Focused existing window");
                            return Ok(ClickOutcome::Focused {
                                client_id: client.id,
                                url: target,
                            });
                        }
                        Err(e) => {
                            warn!(client_id = %client.id, error = %e, "Could not reuse window, opening a new one");
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Client enumeration failed, opening a new window");
            }
        }

        self.clients.open_window(&target).await?;
        info!(url = %target, "Opened new window");
        Ok(ClickOutcome::Opened { url: target })
    }

    async fn focus_and_navigate(&self, client_id: &str, target: &Url) -> shellkit_common::Result<()> {
        self.clients.focus(client_id).await?;
        self.clients.navigate(client_id, target).await
    }
}
