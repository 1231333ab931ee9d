//! In-process stand-ins for the platform surfaces a headless run lacks.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use shellkit_common::{Result, ShellKitError};
use shellkit_sw::{Client, ClientQuery, ClientsHost, Notification, NotificationSurface};
use tracing::info;
use url::Url;

/// Writes notifications to the log. Tagged notifications replace each other.
#[derive(Default)]
pub struct LogNotifications {
    displayed: Mutex<Vec<Notification>>,
}

impl LogNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn displayed(&self) -> Vec<Notification> {
        self.displayed
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl NotificationSurface for LogNotifications {
    async fn show(&self, notification: &Notification) -> Result<()> {
        info!(
            title = %notification.title,
            body = notification.options.body.as_deref().unwrap_or(""),
            tag = notification.options.tag.as_deref().unwrap_or(""),
            "Notification"
        );

        let mut displayed = self
            .displayed
            .lock()
            .map_err(|_| ShellKitError::internal("notification list poisoned"))?;
        if let Some(tag) = &notification.options.tag {
            displayed.retain(|n| n.options.tag.as_ref() != Some(tag));
        }
        displayed.push(notification.clone());
        Ok(())
    }

    async fn close(&self, notification: &Notification) -> Result<()> {
        let mut displayed = self
            .displayed
            .lock()
            .map_err(|_| ShellKitError::internal("notification list poisoned"))?;
        displayed.retain(|n| n != notification);
        Ok(())
    }
}

/// A host with no open pages. Window requests are logged.
#[derive(Default)]
pub struct HeadlessClients;

#[async_trait]
impl ClientsHost for HeadlessClients {
    async fn match_all(&self, _query: &ClientQuery) -> Result<Vec<Client>> {
        Ok(Vec::new())
    }

    async fn open_window(&self, url: &Url) -> Result<Option<Client>> {
        info!(url = %url, "Would open window");
        Ok(None)
    }

    async fn focus(&self, client_id: &str) -> Result<()> {
        Err(ShellKitError::NotFound(format!("client {client_id}")))
    }

    async fn navigate(&self, client_id: &str, _url: &Url) -> Result<()> {
        Err(ShellKitError::NotFound(format!("client {client_id}")))
    }

    async fn post_message(&self, client_id: &str, _message: JsonValue) -> Result<()> {
        Err(ShellKitError::NotFound(format!("client {client_id}")))
    }

    async fn claim(&self) -> Result<()> {
        Ok(())
    }
}
