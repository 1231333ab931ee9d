//! Headless ShellKit host.
//!
//! Installs and activates a worker against a live origin, then replays
//! requests, push payloads, and sync tags through it:
//!
//! ```text
//! shellkit-host --scope https://app.example/ / /app.js /api/items
//! shellkit-host --push '{"title":"Hello","url":"/inbox"}'
//! shellkit-host --sync background-sync-notifications
//! ```
//!
//! One JSON line is printed per replayed request.

mod surfaces;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use serde::Serialize;
use shellkit_cache::LocalStore;
use shellkit_common::{init_logging, LogConfig, LogFormat};
use shellkit_net::{Destination, LoaderConfig, Request, ResourceLoader};
use shellkit_sw::{EventOutcome, Host, ResponseSource, ServiceWorker, WorkerConfig, WorkerEvent};
use tracing::{info, warn};
use url::Url;

use crate::surfaces::{HeadlessClients, LogNotifications};

#[derive(Parser, Debug)]
#[command(name = "shellkit-host")]
#[command(about = "Drive a ShellKit worker without a browser")]
struct Args {
    /// Worker config (JSON); missing fields take defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured scope
    #[arg(long)]
    scope: Option<String>,

    /// Local store file; defaults to the user data directory
    #[arg(long)]
    store: Option<PathBuf>,

    /// Keep the local store in memory only
    #[arg(long)]
    ephemeral: bool,

    /// Log format: pretty, compact, or json
    #[arg(long, default_value = "pretty")]
    log_format: String,

    /// Enable debug logging
    #[arg(long, short)]
    verbose: bool,

    /// Deliver a push event with this payload after activation
    #[arg(long)]
    push: Option<String>,

    /// Fire a sync event with this tag (repeatable)
    #[arg(long = "sync")]
    sync_tags: Vec<String>,

    /// Paths or URLs to fetch through the worker
    urls: Vec<String>,
}

#[derive(Serialize)]
struct FetchReport {
    url: String,
    intercepted: bool,
    status: Option<u16>,
    source: Option<&'static str>,
    bytes: Option<usize>,
    error: Option<String>,
}

/// Guess the request destination from the path extension.
fn guess_destination(url: &Url) -> Destination {
    let path = url.path();
    let extension = path
        .rsplit_once('/')
        .map(|(_, name)| name)
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match extension.as_deref() {
        None | Some("html") | Some("htm") => Destination::Document,
        Some("css") => Destination::Style,
        Some("js") | Some("mjs") => Destination::Script,
        Some("png") | Some("jpg") | Some("jpeg") | Some("gif") | Some("svg") | Some("webp")
        | Some("ico") => Destination::Image,
        Some("woff") | Some("woff2") | Some("ttf") | Some("otf") => Destination::Font,
        Some("webmanifest") => Destination::Manifest,
        Some(_) => Destination::Empty,
    }
}

fn default_store_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("shellkit").join("store.json"))
}

async fn open_store(args: &Args) -> Result<LocalStore> {
    let path = match (&args.store, args.ephemeral) {
        (_, true) => None,
        (Some(path), false) => Some(path.clone()),
        (None, false) => default_store_path(),
    };

    let Some(path) = path else {
        return Ok(LocalStore::in_memory());
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    LocalStore::open(&path)
        .await
        .with_context(|| format!("opening local store {}", path.display()))
}

fn load_config(args: &Args) -> Result<WorkerConfig> {
    let mut config = match &args.config {
        Some(path) => WorkerConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => WorkerConfig::default(),
    };
    if let Some(scope) = &args.scope {
        config.scope = scope.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn replay_fetch(worker: &ServiceWorker, scope: &Url, target: &str) -> Result<FetchReport> {
    let url = scope
        .join(target)
        .with_context(|| format!("invalid url '{target}'"))?;
    let request = Request::get(url.clone()).destination(guess_destination(&url));

    let EventOutcome::Fetch(outcome) = worker.handle(WorkerEvent::Fetch(request)).await? else {
        anyhow::bail!("fetch event produced an unexpected outcome");
    };

    let mut report = FetchReport {
        url: url.to_string(),
        intercepted: outcome.is_intercepted(),
        status: None,
        source: None,
        bytes: None,
        error: None,
    };
    match outcome.respond_with {
        Some(Ok(response)) => {
            report.status = Some(response.response.status.as_u16());
            report.bytes = Some(response.response.body.len());
            report.source = Some(match response.source {
                ResponseSource::Network => "network",
                ResponseSource::Cache => "cache",
            });
        }
        Some(Err(e)) => report.error = Some(e.to_string()),
        None => {}
    }

    outcome.wait_until.settle().await;
    Ok(report)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_config = if args.verbose {
        LogConfig::debug()
    } else {
        LogConfig::default()
    };
    init_logging(log_config.with_format(args.log_format.parse::<LogFormat>()?))?;

    let config = load_config(&args)?;
    let scope = config.scope_url()?;
    let store = Arc::new(open_store(&args).await?);
    let caches = Arc::new(config.cache_storage());
    let notifications = Arc::new(LogNotifications::new());

    let host = Host {
        fetcher: Arc::new(ResourceLoader::new(LoaderConfig::default())?),
        caches,
        notifications: notifications.clone(),
        clients: Arc::new(HeadlessClients),
        push: None,
        store,
    };
    let worker = ServiceWorker::new(config, host)?;

    worker.handle(WorkerEvent::Install).await?;
    if worker.skip_waiting_requested() {
        worker.handle(WorkerEvent::Activate).await?;
    } else {
        warn!("Worker is waiting; requests will not be intercepted");
    }
    info!(state = %worker.state().await, "Worker ready");

    for target in &args.urls {
        let report = replay_fetch(&worker, &scope, target).await?;
        println!("{}", serde_json::to_string(&report)?);
    }

    if let Some(payload) = &args.push {
        let data = Some(Bytes::from(payload.clone().into_bytes()));
        worker.handle(WorkerEvent::Push { data }).await?;
    }

    for tag in &args.sync_tags {
        worker
            .handle(WorkerEvent::Sync { tag: tag.clone() })
            .await?;
    }

    info!(
        notifications = notifications.displayed().len(),
        "Done"
    );
    Ok(())
}
