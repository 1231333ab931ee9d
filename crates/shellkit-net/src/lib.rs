//! # ShellKit Net
//!
//! Request/response model and network access for the ShellKit worker.
//!
//! ## Design Goals
//!
//! 1. **Host-neutral fetch**: strategies talk to the network through the
//!    [`Fetcher`] trait, so hosts and tests can swap the transport
//! 2. **Fully buffered responses**: a [`Response`] is cheap to clone, which
//!    is what "store a copy and return the live one" needs
//! 3. **reqwest backend**: [`ResourceLoader`] is the production fetcher

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, trace};
use url::Url;

pub use http;
pub use url;

/// Errors that can occur in networking.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Host is offline")]
    Offline,

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Unique identifier for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// What the page intends to do with the response (`Request.destination`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    /// `fetch()`/XHR and anything without a destination.
    #[default]
    Empty,
    /// Top-level navigation.
    Document,
    Style,
    Script,
    Image,
    Font,
    Manifest,
    Other,
}

impl Destination {
    /// Parse the platform's destination string.
    pub fn from_platform(value: &str) -> Self {
        match value {
            "" => Self::Empty,
            "document" => Self::Document,
            "style" => Self::Style,
            "script" => Self::Script,
            "image" => Self::Image,
            "font" => Self::Font,
            "manifest" => Self::Manifest,
            _ => Self::Other,
        }
    }
}

/// HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub destination: Destination,
    pub timeout: Option<Duration>,
}

impl Request {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            id: RequestId::new(),
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            destination: Destination::Empty,
            timeout: None,
        }
    }

    /// Create a POST request.
    pub fn post(url: Url, body: Bytes) -> Self {
        Self {
            id: RequestId::new(),
            url,
            method: Method::POST,
            headers: HeaderMap::new(),
            body: Some(body),
            destination: Destination::Empty,
            timeout: None,
        }
    }

    /// Create a POST request with a JSON body.
    pub fn post_json<T: serde::Serialize>(url: Url, value: &T) -> Result<Self, NetError> {
        let body = serde_json::to_vec(value).map_err(|e| NetError::RequestFailed(e.to_string()))?;
        Ok(Self::post(url, Bytes::from(body)).header(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        ))
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the destination.
    pub fn destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Set timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// HTTP response with a fully buffered body.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    /// Create a response.
    pub fn new(url: Url, status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            url,
            status,
            headers,
            body: body.into(),
        }
    }

    /// Check if request was successful (2xx).
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Get the body as text.
    pub fn text(&self) -> Result<String, NetError> {
        String::from_utf8(self.body.to_vec()).map_err(|e| NetError::RequestFailed(e.to_string()))
    }

    /// Get the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, NetError> {
        serde_json::from_slice(&self.body).map_err(|e| NetError::RequestFailed(e.to_string()))
    }
}

/// Something that can perform a network fetch.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform the request. A non-2xx status is a successful fetch; only
    /// transport failures are errors.
    async fn fetch(&self, request: &Request) -> Result<Response, NetError>;
}

/// Resource loader configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// User agent string.
    pub user_agent: String,
    /// Default timeout.
    pub default_timeout: Duration,
    /// Maximum redirects.
    pub max_redirects: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("ShellKit/{}", env!("CARGO_PKG_VERSION")),
            default_timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

/// reqwest-backed fetcher.
pub struct ResourceLoader {
    client: Client,
}

impl ResourceLoader {
    /// Create a new resource loader.
    pub fn new(config: LoaderConfig) -> Result<Self, NetError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.default_timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        info!(user_agent = %config.user_agent, "ResourceLoader initialized");

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for ResourceLoader {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        debug!(url = %request.url, method = %request.method, "Fetching resource");

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());

        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                NetError::Timeout(request.timeout.unwrap_or_default())
            } else {
                NetError::HttpError(e)
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;

        trace!(
            url = %url,
            status = %status,
            body_len = body.len(),
            "Response received"
        );

        Ok(Response {
            url,
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_destination_from_platform() {
        assert_eq!(Destination::from_platform("document"), Destination::Document);
        assert_eq!(Destination::from_platform("style"), Destination::Style);
        assert_eq!(Destination::from_platform(""), Destination::Empty);
        assert_eq!(Destination::from_platform("audioworklet"), Destination::Other);
    }

    #[test]
    fn test_request_builders() {
        let url = Url::parse("https://app.example/pwa-192x192.png").unwrap();
        let request = Request::get(url.clone()).destination(Destination::Image);
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.destination, Destination::Image);
        assert!(request.body.is_none());
        assert_ne!(request.id, Request::get(url).id);
    }

    #[test]
    fn test_post_json_sets_content_type() {
        let url = Url::parse("https://app.example/api/push-subscription").unwrap();
        let request = Request::post_json(url, &serde_json::json!({ "endpoint": "e" })).unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(
            request.headers.get(http::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(request.body.unwrap(), Bytes::from_static(b"{\"endpoint\":\"e\"}"));
    }

    #[test]
    fn test_response_ok() {
        let url = Url::parse("https://app.example/").unwrap();
        let ok = Response::new(url.clone(), StatusCode::OK, HeaderMap::new(), "hi");
        let missing = Response::new(url, StatusCode::NOT_FOUND, HeaderMap::new(), "");
        assert!(ok.ok());
        assert!(!missing.ok());
        assert_eq!(ok.text().unwrap(), "hi");
    }

    #[tokio::test]
    async fn test_loader_fetches_body_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/items"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[1,2,3]"))
            .mount(&server)
            .await;

        let loader = ResourceLoader::new(LoaderConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/api/items", server.uri())).unwrap();
        let response = loader.fetch(&Request::get(url)).await.unwrap();

        assert!(response.ok());
        assert_eq!(response.json::<Vec<u32>>().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_loader_returns_error_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let loader = ResourceLoader::new(LoaderConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/api/items", server.uri())).unwrap();
        let response = loader.fetch(&Request::get(url)).await.unwrap();

        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_loader_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/push-subscription"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({ "endpoint": "https://push.example/1" })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let loader = ResourceLoader::new(LoaderConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/api/push-subscription", server.uri())).unwrap();
        let request =
            Request::post_json(url, &serde_json::json!({ "endpoint": "https://push.example/1" }))
                .unwrap();
        let response = loader.fetch(&request).await.unwrap();

        assert_eq!(response.status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_loader_connection_refused_is_error() {
        let loader = ResourceLoader::new(LoaderConfig::default()).unwrap();
        let url = Url::parse("http://127.0.0.1:9/unreachable").unwrap();
        assert!(loader.fetch(&Request::get(url)).await.is_err());
    }
}
