//! Request classification.

use shellkit_net::{Destination, Request};
use tracing::trace;

/// How an intercepted request is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// API calls: network, falling back to the last good response.
    NetworkFirst,
    /// Static assets: cache, falling back to the network.
    CacheFirst,
    /// Documents: cache now, refresh in the background.
    StaleWhileRevalidate,
}

/// Picks a strategy per request. Performs no I/O.
#[derive(Debug, Clone)]
pub struct Router {
    api_marker: String,
}

impl Router {
    pub fn new(api_marker: impl Into<String>) -> Self {
        Self {
            api_marker: api_marker.into(),
        }
    }

    /// First match wins; `None` leaves the request to the host.
    pub fn route(&self, request: &Request) -> Option<Strategy> {
        let strategy = if request.url.path().contains(&self.api_marker) {
            Some(Strategy::NetworkFirst)
        } else {
            match request.destination {
                Destination::Style | Destination::Script | Destination::Image => {
                    Some(Strategy::CacheFirst)
                }
                Destination::Document => Some(Strategy::StaleWhileRevalidate),
                _ => None,
            }
        };

        trace!(url = %request.url, destination = ?request.destination, ?strategy, "Routed request");
        strategy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn request(path: &str, destination: Destination) -> Request {
        let url = Url::parse("https://app.example/").unwrap().join(path).unwrap();
        Request::get(url).destination(destination)
    }

    #[test]
    fn test_api_marker_wins_over_destination() {
        let router = Router::new("/api/");
        assert_eq!(
            router.route(&request("/api/items", Destination::Empty)),
            Some(Strategy::NetworkFirst)
        );
        assert_eq!(
            router.route(&request("/api/logo.png", Destination::Image)),
            Some(Strategy::NetworkFirst)
        );
        assert_eq!(
            router.route(&request("/v2/api/items", Destination::Document)),
            Some(Strategy::NetworkFirst)
        );
    }

    #[test]
    fn test_marker_matches_path_not_query() {
        let router = Router::new("/api/");
        assert_eq!(
            router.route(&request("/search?next=/api/items", Destination::Empty)),
            None
        );
    }

    #[test]
    fn test_static_assets_are_cache_first() {
        let router = Router::new("/api/");
        for destination in [Destination::Style, Destination::Script, Destination::Image] {
            assert_eq!(
                router.route(&request("/assets/app.bin", destination)),
                Some(Strategy::CacheFirst)
            );
        }
    }

    #[test]
    fn test_documents_are_stale_while_revalidate() {
        let router = Router::new("/api/");
        assert_eq!(
            router.route(&request("/", Destination::Document)),
            Some(Strategy::StaleWhileRevalidate)
        );
    }

    #[test]
    fn test_everything_else_passes_through() {
        let router = Router::new("/api/");
        for destination in [
            Destination::Empty,
            Destination::Font,
            Destination::Manifest,
            Destination::Other,
        ] {
            assert_eq!(router.route(&request("/thing", destination)), None);
        }
    }

    #[test]
    fn test_custom_marker() {
        let router = Router::new("/rpc/");
        assert_eq!(router.route(&request("/api/items", Destination::Empty)), None);
        assert_eq!(
            router.route(&request("/rpc/items", Destination::Empty)),
            Some(Strategy::NetworkFirst)
        );
    }
}
