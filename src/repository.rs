//! Repository that publishes the latest fetched dataset to subscribers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::info;

use crate::cache::CacheSource;
use crate::datastore::{DatastoreClient, DatastoreResponse, FetchError, YearlyUsage};

/// A successfully fetched dataset together with its yearly view.
#[derive(Debug, Clone)]
pub struct MobileDataUsage {
  pub response: DatastoreResponse,
  pub yearly: YearlyUsage,
  pub source: CacheSource,
  pub cached_at: Option<DateTime<Utc>>,
}

/// Wraps [`DatastoreClient`] in an observable value.
///
/// Subscribers see a new value exactly when a fetch succeeds. Failures are
/// returned to whoever called [`UsageRepository::refresh`] and leave the
/// published value alone.
#[derive(Clone)]
pub struct UsageRepository {
  client: DatastoreClient,
  latest: Arc<watch::Sender<Option<Arc<MobileDataUsage>>>>,
}

impl UsageRepository {
  pub fn new(client: DatastoreClient) -> Self {
    let (tx, _rx) = watch::channel(None);
    Self {
      client,
      latest: Arc::new(tx),
    }
  }

  /// Read-only stream of the latest successful fetch.
  pub fn subscribe(&self) -> watch::Receiver<Option<Arc<MobileDataUsage>>> {
    self.latest.subscribe()
  }

  /// Latest published value, if any.
  pub fn latest(&self) -> Option<Arc<MobileDataUsage>> {
    self.latest.borrow().clone()
  }

  /// Yearly view of the latest published value.
  pub fn yearly_usage(&self) -> Option<YearlyUsage> {
    self.latest.borrow().as_ref().map(|usage| usage.yearly.clone())
  }

  /// Fetch and, on success, publish.
  pub async fn refresh(&self) -> Result<Arc<MobileDataUsage>, FetchError> {
    let result = self.client.fetch_usage_data().await?;

    let yearly = YearlyUsage::from_records(result.data.records());
    let usage = Arc::new(MobileDataUsage {
      response: result.data,
      yearly,
      source: result.source,
      cached_at: result.cached_at,
    });

    info!(
      years = usage.yearly.len(),
      source = usage.source.label(),
      "published mobile data usage"
    );
    self.latest.send_replace(Some(Arc::clone(&usage)));

    Ok(usage)
  }
}
