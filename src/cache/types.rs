//! Core types for the HTTP response cache.

use std::time::Duration;

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ETAG, LAST_MODIFIED};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};

use super::policy::CacheControl;

/// Stable, fixed-length cache key for a request URL.
pub fn cache_key(url: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  hex::encode(hasher.finalize())
}

/// An HTTP response as stored on disk.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub url: String,
  pub status: u16,
  pub headers: HeaderMap,
  pub body: Vec<u8>,
  /// When the response was received (or last revalidated)
  pub stored_at: DateTime<Utc>,
}

impl CachedResponse {
  pub fn new(url: impl Into<String>, status: u16, headers: HeaderMap, body: Vec<u8>) -> Self {
    Self {
      url: url.into(),
      status,
      headers,
      body,
      stored_at: Utc::now(),
    }
  }

  pub fn key(&self) -> String {
    cache_key(&self.url)
  }

  /// Bytes this entry accounts for against the cache budget.
  pub fn size(&self) -> u64 {
    let header_bytes: usize = self
      .headers
      .iter()
      .map(|(name, value)| name.as_str().len() + value.len())
      .sum();
    (self.body.len() + header_bytes + self.url.len()) as u64
  }

  pub fn control(&self) -> CacheControl {
    CacheControl::from_headers(&self.headers)
  }

  /// Time since the response was stored. Clock skew into the future counts as zero.
  pub fn age(&self, now: DateTime<Utc>) -> Duration {
    now
      .signed_duration_since(self.stored_at)
      .to_std()
      .unwrap_or(Duration::ZERO)
  }

  /// How long the response is fresh without revalidation.
  pub fn freshness_lifetime(&self) -> Duration {
    let control = self.control();
    if control.no_cache {
      return Duration::ZERO;
    }
    control.max_age.unwrap_or(Duration::ZERO)
  }

  pub fn etag(&self) -> Option<&HeaderValue> {
    self.headers.get(ETAG)
  }

  pub fn last_modified(&self) -> Option<&HeaderValue> {
    self.headers.get(LAST_MODIFIED)
  }

  pub fn into_response(self) -> HttpResponse {
    HttpResponse {
      status: StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK),
      headers: self.headers,
      body: self.body,
    }
  }
}

/// A response handed back to callers, whether it came from the network or the cache.
#[derive(Debug, Clone)]
pub struct HttpResponse {
  pub status: StatusCode,
  pub headers: HeaderMap,
  pub body: Vec<u8>,
}

/// Serialize headers for storage as a JSON list of name/value pairs.
pub fn encode_headers(headers: &HeaderMap) -> Result<Vec<u8>> {
  let pairs: Vec<(&str, &str)> = headers
    .iter()
    .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
    .collect();
  serde_json::to_vec(&pairs).map_err(|e| eyre!("Failed to serialize headers: {}", e))
}

/// Inverse of [`encode_headers`].
pub fn decode_headers(data: &[u8]) -> Result<HeaderMap> {
  let pairs: Vec<(String, String)> =
    serde_json::from_slice(data).map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;

  let mut headers = HeaderMap::new();
  for (name, value) in pairs {
    let name = HeaderName::from_bytes(name.as_bytes())
      .map_err(|e| eyre!("Invalid stored header name '{}': {}", name, e))?;
    let value = HeaderValue::from_str(&value)
      .map_err(|e| eyre!("Invalid stored header value for {}: {}", name, e))?;
    headers.append(name, value);
  }
  Ok(headers)
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>, source: CacheSource) -> Self {
    Self {
      data,
      source,
      cached_at: Some(cached_at),
    }
  }

  /// Swap the payload, keeping the source metadata.
  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
    CacheResult {
      data: f(self.data),
      source: self.source,
      cached_at: self.cached_at,
    }
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still within its freshness window
  CacheFresh,
  /// Data from cache past freshness but within the request's max-stale
  CacheStale,
  /// Stale cache entry confirmed unchanged by a 304 from the server
  Revalidated,
  /// Offline mode - network unavailable, serving cached data
  Offline,
}

impl CacheSource {
  pub fn label(&self) -> &'static str {
    match self {
      CacheSource::Network => "network",
      CacheSource::CacheFresh => "cache",
      CacheSource::CacheStale => "cache (stale)",
      CacheSource::Revalidated => "cache (revalidated)",
      CacheSource::Offline => "offline cache",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::header::CACHE_CONTROL;

  #[test]
  fn test_cache_key_is_stable_hex() {
    let key = cache_key("https://example.com/a?b=c");
    assert_eq!(key.len(), 64);
    assert_eq!(key, cache_key("https://example.com/a?b=c"));
    assert_ne!(key, cache_key("https://example.com/a?b=d"));
  }

  #[test]
  fn test_headers_survive_storage_encoding() {
    let mut headers = HeaderMap::new();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("public, max-age=60"));
    headers.append("set-cookie", HeaderValue::from_static("a=1"));
    headers.append("set-cookie", HeaderValue::from_static("b=2"));

    let decoded = decode_headers(&encode_headers(&headers).unwrap()).unwrap();
    assert_eq!(decoded.get(CACHE_CONTROL).unwrap(), "public, max-age=60");
    assert_eq!(decoded.get_all("set-cookie").iter().count(), 2);
  }

  #[test]
  fn test_freshness_and_age() {
    let mut headers = HeaderMap::new();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("public, max-age=60"));
    let mut entry = CachedResponse::new("https://example.com", 200, headers, b"{}".to_vec());
    entry.stored_at = Utc::now() - chrono::Duration::seconds(30);

    assert_eq!(entry.freshness_lifetime(), Duration::from_secs(60));
    let age = entry.age(Utc::now());
    assert!(age >= Duration::from_secs(30) && age < Duration::from_secs(60));
  }

  #[test]
  fn test_no_cache_response_is_never_fresh() {
    let mut headers = HeaderMap::new();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache, max-age=60"));
    let entry = CachedResponse::new("https://example.com", 200, headers, Vec::new());
    assert_eq!(entry.freshness_lifetime(), Duration::ZERO);
  }
}
