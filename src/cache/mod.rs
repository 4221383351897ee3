//! HTTP response cache for offline support.
//!
//! This module provides a read-through cache for GET requests that:
//! - Stores responses on disk in a byte-bounded SQLite database with LRU eviction
//! - Treats every network response as fresh for a fixed window (`max-age` rewrite)
//! - Honors request `only-if-cached` / `max-stale` so stale entries can be served offline
//! - Revalidates stale entries with `If-None-Match` / `If-Modified-Since`

mod layer;
pub mod policy;
mod storage;
mod types;

pub use layer::{CacheError, CacheLayer};
pub use storage::{CacheStorage, NoopStorage, SqliteStorage};
pub use types::{CacheResult, CacheSource, HttpResponse};
