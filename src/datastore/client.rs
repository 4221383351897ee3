use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use reqwest::header::HeaderMap;
use reqwest::Client;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::policy::rewrite_offline_request;
use crate::cache::{CacheLayer, CacheResult, CacheStorage, NoopStorage, SqliteStorage};
use crate::config::{ApiConfig, CacheConfig, Config};
use crate::connectivity::Connectivity;

use super::api_types::DatastoreResponse;
use super::error::{ErrorCategory, FetchError};

/// Path of the search action, relative to the API base URL
pub const DATASTORE_SEARCH_PATH: &str = "api/action/datastore_search";

/// Datastore API client with transparent HTTP caching.
///
/// Requests go through a [`CacheLayer`]. When the connectivity check says
/// we're offline, requests are rewritten to `only-if-cached` with a long
/// `max-stale`, so cached data keeps being served instead of waiting on a
/// network that isn't there.
#[derive(Clone)]
pub struct DatastoreClient {
  cache: CacheLayer,
  connectivity: Arc<dyn Connectivity>,
  endpoint: Url,
  max_stale: Duration,
}

impl DatastoreClient {
  /// Create a client with the on-disk cache described by `config`.
  pub fn new(config: &Config, connectivity: Arc<dyn Connectivity>) -> Result<Self> {
    let storage: Arc<dyn CacheStorage> = if config.cache.enabled {
      Arc::new(SqliteStorage::open(&cache_dir(&config.cache)?, config.cache.max_size_bytes)?)
    } else {
      Arc::new(NoopStorage)
    };

    Self::with_storage(config, connectivity, storage)
  }

  /// Create a client over an explicit storage backend.
  pub fn with_storage(
    config: &Config,
    connectivity: Arc<dyn Connectivity>,
    storage: Arc<dyn CacheStorage>,
  ) -> Result<Self> {
    let mut builder =
      Client::builder().user_agent(concat!("datausage/", env!("CARGO_PKG_VERSION")));
    if let Some(secs) = config.http.timeout_secs {
      builder = builder.timeout(Duration::from_secs(secs));
    }
    let http = builder
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    let cache = CacheLayer::new(http, storage).with_max_age(config.cache.max_age());
    let endpoint = build_endpoint(&config.api)?;

    Ok(Self {
      cache,
      connectivity,
      endpoint,
      max_stale: config.cache.max_stale(),
    })
  }

  pub fn endpoint(&self) -> &Url {
    &self.endpoint
  }

  /// Fetch the mobile data usage dataset.
  ///
  /// Exactly one result per call; nothing is retried.
  pub async fn fetch_usage_data(&self) -> Result<CacheResult<DatastoreResponse>, FetchError> {
    let mut headers = HeaderMap::new();
    if !self.connectivity.is_online().await {
      info!("offline, restricting request to cached responses");
      rewrite_offline_request(&mut headers, self.max_stale);
    }

    let result = self
      .cache
      .get(&self.endpoint, headers)
      .await
      .map_err(|e| {
        let err = FetchError::from(e);
        error!(category = ?err.category, detail = ?err.detail, "fetch failed");
        err
      })?;

    let status = result.data.status;
    if !status.is_success() {
      let err = FetchError::from_error_response(status, &result.data.body);
      error!(
        status = status.as_u16(),
        category = ?err.category,
        detail = ?err.detail,
        "error response"
      );
      return Err(err);
    }

    let response: DatastoreResponse = serde_json::from_slice(&result.data.body).map_err(|e| {
      error!(error = %e, "failed to decode datastore response");
      FetchError::new(ErrorCategory::GeneralError)
        .with_status(status)
        .with_source(e)
    })?;

    if !response.success {
      warn!("datastore response not successful");
      return Err(FetchError::new(ErrorCategory::DatastoreUnsuccessful).with_status(status));
    }

    debug!(
      records = response.records().len(),
      source = result.source.label(),
      "datastore response ok"
    );
    Ok(result.map(|_| response))
  }
}

fn cache_dir(cache: &CacheConfig) -> Result<PathBuf> {
  match &cache.dir {
    Some(dir) => Ok(dir.clone()),
    None => SqliteStorage::default_dir(),
  }
}

/// Delete every response in the on-disk cache, returning the bytes freed.
///
/// Opens the SQLite store even when caching is disabled, so a cache left
/// behind by an earlier run is still cleared.
pub fn clear_disk_cache(cache: &CacheConfig) -> Result<u64> {
  let storage = SqliteStorage::open(&cache_dir(cache)?, cache.max_size_bytes)?;
  let freed = storage.size()?;
  storage.clear()?;
  info!(bytes = freed, "cleared response cache");
  Ok(freed)
}

/// `{base_url}/api/action/datastore_search?resource_id=...[&limit=...]`
fn build_endpoint(api: &ApiConfig) -> Result<Url> {
  let mut base = api.base_url.clone();
  if !base.ends_with('/') {
    base.push('/');
  }

  let mut url = Url::parse(&base)
    .and_then(|u| u.join(DATASTORE_SEARCH_PATH))
    .map_err(|e| eyre!("Invalid base URL '{}': {}", api.base_url, e))?;

  {
    let mut query = url.query_pairs_mut();
    query.append_pair("resource_id", &api.resource_id);
    if let Some(limit) = api.limit {
      query.append_pair("limit", &limit.to_string());
    }
  }

  Ok(url)
}
