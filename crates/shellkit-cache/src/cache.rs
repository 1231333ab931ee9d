//! Named response caches.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use hashbrown::HashMap;
use lru::LruCache;
use shellkit_net::http::Method;
use shellkit_net::url::Url;
use shellkit_net::{Request, Response};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::CacheError;

/// Normalized request identity: method plus URL without the fragment.
/// Request bodies never take part in matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    method: Method,
    url: Url,
}

impl RequestKey {
    pub fn new(method: Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self { method, url }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl From<&Request> for RequestKey {
    fn from(request: &Request) -> Self {
        Self::new(request.method.clone(), &request.url)
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// A single named bucket.
pub struct Cache {
    name: String,
    entries: LruCache<RequestKey, Response>,
}

impl Cache {
    /// Create an unbounded cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: LruCache::unbounded(),
        }
    }

    /// Create a cache that drops its least recently used entry when full.
    pub fn bounded(name: &str, capacity: NonZeroUsize) -> Self {
        Self {
            name: name.to_string(),
            entries: LruCache::new(capacity),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a response, marking it recently used.
    pub fn match_request(&mut self, key: &RequestKey) -> Option<&Response> {
        self.entries.get(key)
    }

    /// Store a response. Only successful statuses are accepted.
    pub fn put(&mut self, key: RequestKey, response: Response) -> Result<(), CacheError> {
        if !response.ok() {
            return Err(CacheError::NotCacheable {
                key: key.to_string(),
                status: response.status.as_u16(),
            });
        }
        if let Some((evicted, _)) = self.entries.push(key.clone(), response) {
            if evicted != key {
                debug!(cache = %self.name, evicted = %evicted, "Evicted least recently used entry");
            }
        }
        Ok(())
    }

    pub fn delete(&mut self, key: &RequestKey) -> bool {
        self.entries.pop(key).is_some()
    }

    pub fn keys(&self) -> Vec<RequestKey> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.name)
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Keeps a bucket from being deleted while held.
#[derive(Debug)]
pub struct CacheLease {
    bucket: String,
    _token: Arc<()>,
}

impl CacheLease {
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

/// All buckets of one origin (the `caches` global). Outlives any single
/// worker version; hosts share one instance between versions.
///
/// Buckets are searched in creation order by [`CacheStorage::match_any`].
/// Concurrent writes to the same key are last-write-wins.
#[derive(Debug, Default)]
pub struct CacheStorage {
    buckets: RwLock<Vec<Cache>>,
    leases: RwLock<HashMap<String, Arc<()>>>,
    capacities: HashMap<String, NonZeroUsize>,
    max_entry_bytes: Option<usize>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap a bucket at `capacity` entries; applies when the bucket is created.
    pub fn with_capacity(mut self, name: &str, capacity: NonZeroUsize) -> Self {
        self.capacities.insert(name.to_string(), capacity);
        self
    }

    /// Reject bodies larger than `limit` bytes.
    pub fn with_max_entry_bytes(mut self, limit: usize) -> Self {
        self.max_entry_bytes = Some(limit);
        self
    }

    fn create(&self, name: &str) -> Cache {
        match self.capacities.get(name) {
            Some(capacity) => Cache::bounded(name, *capacity),
            None => Cache::new(name),
        }
    }

    fn check_quota(&self, key: &RequestKey, response: &Response) -> Result<(), CacheError> {
        match self.max_entry_bytes {
            Some(limit) if response.body.len() > limit => Err(CacheError::QuotaExceeded {
                key: key.to_string(),
                size: response.body.len(),
                limit,
            }),
            _ => Ok(()),
        }
    }

    fn bucket_mut<'a>(&self, buckets: &'a mut Vec<Cache>, name: &str) -> &'a mut Cache {
        match buckets.iter().position(|c| c.name == name) {
            Some(index) => &mut buckets[index],
            None => {
                buckets.push(self.create(name));
                let last = buckets.len() - 1;
                &mut buckets[last]
            }
        }
    }

    /// Open a bucket, creating it if missing.
    pub async fn open(&self, name: &str) {
        let mut buckets = self.buckets.write().await;
        self.bucket_mut(&mut buckets, name);
    }

    pub async fn has(&self, name: &str) -> bool {
        self.buckets.read().await.iter().any(|c| c.name == name)
    }

    /// Bucket names in creation order.
    pub async fn keys(&self) -> Vec<String> {
        self.buckets
            .read()
            .await
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    /// Pin a bucket for the lifetime of the returned lease.
    pub async fn lease(&self, name: &str) -> CacheLease {
        let mut leases = self.leases.write().await;
        let token = leases.entry(name.to_string()).or_default().clone();
        CacheLease {
            bucket: name.to_string(),
            _token: token,
        }
    }

    /// Delete a whole bucket. Fails while the bucket is leased; `Ok(false)`
    /// if it does not exist.
    pub async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        // Held across the removal so no lease can be taken in between.
        let leases = self.leases.read().await;
        if let Some(token) = leases.get(name) {
            let holders = Arc::strong_count(token) - 1;
            if holders > 0 {
                return Err(CacheError::InUse {
                    bucket: name.to_string(),
                    holders,
                });
            }
        }

        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        buckets.retain(|c| c.name != name);
        Ok(before != buckets.len())
    }

    /// Store a response in `bucket`, creating the bucket if needed.
    pub async fn put(
        &self,
        bucket: &str,
        key: RequestKey,
        response: Response,
    ) -> Result<(), CacheError> {
        self.check_quota(&key, &response)?;
        let mut buckets = self.buckets.write().await;
        trace!(cache = bucket, key = %key, "Storing response");
        self.bucket_mut(&mut buckets, bucket).put(key, response)
    }

    /// Store every entry or none of them.
    pub async fn put_all(
        &self,
        bucket: &str,
        entries: Vec<(RequestKey, Response)>,
    ) -> Result<(), CacheError> {
        for (key, response) in &entries {
            self.check_quota(key, response)?;
            if !response.ok() {
                return Err(CacheError::NotCacheable {
                    key: key.to_string(),
                    status: response.status.as_u16(),
                });
            }
        }

        let mut buckets = self.buckets.write().await;
        let cache = self.bucket_mut(&mut buckets, bucket);
        for (key, response) in entries {
            cache.put(key, response)?;
        }
        Ok(())
    }

    /// Look up a key in one bucket.
    pub async fn match_in(&self, bucket: &str, key: &RequestKey) -> Option<Response> {
        let mut buckets = self.buckets.write().await;
        buckets
            .iter_mut()
            .find(|c| c.name == bucket)
            .and_then(|c| c.match_request(key).cloned())
    }

    /// Look up a key across all buckets, oldest bucket first.
    pub async fn match_any(&self, key: &RequestKey) -> Option<Response> {
        let mut buckets = self.buckets.write().await;
        buckets
            .iter_mut()
            .find_map(|c| c.match_request(key).cloned())
    }

    /// Delete a single entry from a bucket.
    pub async fn delete_entry(&self, bucket: &str, key: &RequestKey) -> bool {
        let mut buckets = self.buckets.write().await;
        buckets
            .iter_mut()
            .find(|c| c.name == bucket)
            .map(|c| c.delete(key))
            .unwrap_or(false)
    }

    /// Number of entries in a bucket (0 if missing).
    pub async fn len(&self, bucket: &str) -> usize {
        self.buckets
            .read()
            .await
            .iter()
            .find(|c| c.name == bucket)
            .map(Cache::len)
            .unwrap_or(0)
    }
}
