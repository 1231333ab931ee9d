//! # ShellKit Cache
//!
//! Storage primitives for the ShellKit worker.
//!
//! ## Features
//!
//! - **CacheStorage**: named buckets of captured responses, the `caches`
//!   global of a service worker
//! - **Generations**: one bucket per app version; old ones are deleted on
//!   activation
//! - **Bounded buckets**: LRU-capped buckets for unversioned data
//! - **LocalStore**: flat key-value blob storage, optionally file-backed
//!
//! ## Architecture
//!
//! ```text
//! CacheStorage
//!     ├── "app-v2"    (current generation, unbounded)
//!     │       └── RequestKey → Response
//!     └── "api-cache" (unversioned, LRU-bounded)
//!             └── RequestKey → Response
//!
//! LocalStore
//!     └── key → JSON blob
//! ```

use thiserror::Error;

pub mod cache;
pub mod store;

pub use cache::{Cache, CacheLease, CacheStorage, RequestKey};
pub use store::LocalStore;

/// Errors from cache and local storage operations.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Refusing to cache {key}: status {status}")]
    NotCacheable { key: String, status: u16 },

    #[error("Quota exceeded for {key}: {size} bytes over the {limit} byte limit")]
    QuotaExceeded { key: String, size: usize, limit: usize },

    #[error("Cache {bucket} is in use by {holders} pending operation(s)")]
    InUse { bucket: String, holders: usize },

    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
