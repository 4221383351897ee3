//! Cache layer that sits between the fetch client and the network.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, IF_MODIFIED_SINCE, IF_NONE_MATCH};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use super::policy::{is_cacheable_status, rewrite_network_response, CacheControl};
use super::storage::CacheStorage;
use super::types::{cache_key, CacheResult, CacheSource, CachedResponse, HttpResponse};

/// Errors surfaced by the cache layer itself.
#[derive(Debug, Error)]
pub enum CacheError {
  /// The request demanded `only-if-cached` and no acceptable entry exists.
  #[error("no cached response for {url} and request is only-if-cached")]
  Unsatisfiable { url: String },

  /// The server answered 304 but there is no stored response to serve.
  #[error("304 Not Modified for {url} with nothing cached")]
  NotModifiedWithoutEntry { url: String },

  #[error("network request failed: {0}")]
  Network(#[from] reqwest::Error),
}

/// Read-through HTTP cache over a storage backend.
///
/// Every response that comes off the network has its `Cache-Control` rewritten
/// to `public, max-age=<max_age>` before it is stored or returned, so repeated
/// requests inside that window never reach the network.
pub struct CacheLayer {
  http: Client,
  storage: Arc<dyn CacheStorage>,
  /// Freshness granted to every network response
  max_age: Duration,
}

impl CacheLayer {
  /// Create a new cache layer with the given storage backend.
  pub fn new(http: Client, storage: Arc<dyn CacheStorage>) -> Self {
    Self {
      http,
      storage,
      max_age: Duration::from_secs(60),
    }
  }

  /// Set the freshness window applied to network responses.
  pub fn with_max_age(mut self, max_age: Duration) -> Self {
    self.max_age = max_age;
    self
  }

  /// Execute a GET through the cache.
  ///
  /// 1. If a stored response is within freshness plus the request's max-stale, serve it
  /// 2. If the request is only-if-cached, fail without touching the network
  /// 3. Otherwise go to the network, revalidating conditionally when possible
  /// 4. Store cacheable network responses
  pub async fn get(
    &self,
    url: &Url,
    headers: HeaderMap,
  ) -> Result<CacheResult<HttpResponse>, CacheError> {
    let request_cc = CacheControl::from_headers(&headers);
    let key = cache_key(url.as_str());
    let now = Utc::now();

    let cached = if request_cc.no_cache || request_cc.no_store {
      None
    } else {
      self.lookup(&key)
    };

    if let Some(entry) = &cached {
      let age = entry.age(now);
      let fresh = entry.freshness_lifetime();
      let limit = fresh.saturating_add(request_cc.stale_tolerance());

      if age < limit {
        let source = if age < fresh {
          CacheSource::CacheFresh
        } else if request_cc.only_if_cached {
          CacheSource::Offline
        } else {
          CacheSource::CacheStale
        };
        debug!(%url, age_secs = age.as_secs(), source = source.label(), "cache hit");
        let stored_at = entry.stored_at;
        return Ok(CacheResult::from_cache(
          entry.clone().into_response(),
          stored_at,
          source,
        ));
      }

      debug!(%url, age_secs = age.as_secs(), "cached response too old");
    }

    if request_cc.only_if_cached {
      warn!(%url, "only-if-cached request with no usable cache entry");
      return Err(CacheError::Unsatisfiable {
        url: url.to_string(),
      });
    }

    self.fetch_network(url, headers, &request_cc, cached).await
  }

  async fn fetch_network(
    &self,
    url: &Url,
    mut headers: HeaderMap,
    request_cc: &CacheControl,
    cached: Option<CachedResponse>,
  ) -> Result<CacheResult<HttpResponse>, CacheError> {
    // Conditional request if we hold validators for a stale copy
    if let Some(entry) = &cached {
      if let Some(etag) = entry.etag() {
        headers.insert(IF_NONE_MATCH, etag.clone());
      }
      if let Some(last_modified) = entry.last_modified() {
        headers.insert(IF_MODIFIED_SINCE, last_modified.clone());
      }
    }

    debug!(%url, "network request");
    let response = self.http.get(url.clone()).headers(headers).send().await?;
    let status = response.status();
    let mut response_headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();
    info!(%url, status = status.as_u16(), bytes = body.len(), "network response");

    rewrite_network_response(&mut response_headers, self.max_age);

    if status == StatusCode::NOT_MODIFIED {
      let Some(mut entry) = cached else {
        warn!(%url, "304 Not Modified with no cached response to revalidate");
        return Err(CacheError::NotModifiedWithoutEntry {
          url: url.to_string(),
        });
      };

      for (name, value) in response_headers.iter() {
        if name != CONTENT_LENGTH {
          entry.headers.insert(name.clone(), value.clone());
        }
      }
      entry.stored_at = Utc::now();
      self.store(&entry);

      let stored_at = entry.stored_at;
      return Ok(CacheResult::from_cache(
        entry.into_response(),
        stored_at,
        CacheSource::Revalidated,
      ));
    }

    let response_cc = CacheControl::from_headers(&response_headers);
    if is_cacheable_status(status.as_u16()) && !request_cc.no_store && !response_cc.no_store {
      let entry = CachedResponse::new(
        url.as_str(),
        status.as_u16(),
        response_headers.clone(),
        body.clone(),
      );
      self.store(&entry);
    }

    Ok(CacheResult::from_network(HttpResponse {
      status,
      headers: response_headers,
      body,
    }))
  }

  /// Storage read; failures count as a miss.
  fn lookup(&self, key: &str) -> Option<CachedResponse> {
    match self.storage.get(key) {
      Ok(entry) => entry,
      Err(e) => {
        warn!(error = %e, "cache read failed, treating as miss");
        None
      }
    }
  }

  /// Storage write; failures are logged and otherwise ignored.
  fn store(&self, entry: &CachedResponse) {
    match self.storage.put(entry) {
      Ok(true) => debug!(url = %entry.url, "stored response in cache"),
      Ok(false) => debug!(url = %entry.url, "response not stored"),
      Err(e) => warn!(url = %entry.url, error = %e, "cache write failed"),
    }
  }
}

impl Clone for CacheLayer {
  fn clone(&self) -> Self {
    Self {
      http: self.http.clone(),
      storage: Arc::clone(&self.storage),
      max_age: self.max_age,
    }
  }
}
