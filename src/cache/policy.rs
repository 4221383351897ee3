//! Cache-Control parsing and the header rewrite rules applied around the network.

use std::fmt;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, PRAGMA};

/// Parsed `Cache-Control` directives we care about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
  pub public: bool,
  pub no_cache: bool,
  pub no_store: bool,
  pub only_if_cached: bool,
  pub max_age: Option<Duration>,
  /// `Some(None)` means `max-stale` without a value (any staleness accepted)
  pub max_stale: Option<Option<Duration>>,
}

impl CacheControl {
  /// Parse every `Cache-Control` header in the map. Unknown directives are ignored.
  pub fn from_headers(headers: &HeaderMap) -> Self {
    let mut cc = Self::default();

    for value in headers.get_all(CACHE_CONTROL) {
      let Ok(value) = value.to_str() else {
        continue;
      };
      for directive in value.split(',') {
        let directive = directive.trim();
        let (name, arg) = match directive.split_once('=') {
          Some((n, a)) => (n.trim(), Some(a.trim().trim_matches('"'))),
          None => (directive, None),
        };

        match name.to_ascii_lowercase().as_str() {
          "public" => cc.public = true,
          "no-cache" => cc.no_cache = true,
          "no-store" => cc.no_store = true,
          "only-if-cached" => cc.only_if_cached = true,
          "max-age" => cc.max_age = arg.and_then(parse_seconds),
          "max-stale" => cc.max_stale = Some(arg.and_then(parse_seconds)),
          _ => {}
        }
      }
    }

    // HTTP/1.0 fallback
    if headers
      .get(PRAGMA)
      .and_then(|v| v.to_str().ok())
      .is_some_and(|v| v.eq_ignore_ascii_case("no-cache"))
    {
      cc.no_cache = true;
    }

    cc
  }

  /// Directive for responses coming off the network: fresh for `max_age`.
  pub fn fresh_for(max_age: Duration) -> Self {
    Self {
      public: true,
      max_age: Some(max_age),
      ..Self::default()
    }
  }

  /// Directive for requests made while offline: cache only, tolerate `max_stale`.
  pub fn offline(max_stale: Duration) -> Self {
    Self {
      public: true,
      only_if_cached: true,
      max_stale: Some(Some(max_stale)),
      ..Self::default()
    }
  }

  /// How far past freshness a cached response may be served.
  pub fn stale_tolerance(&self) -> Duration {
    match self.max_stale {
      Some(Some(d)) => d,
      Some(None) => Duration::MAX,
      None => Duration::ZERO,
    }
  }

  fn header_value(&self) -> Option<HeaderValue> {
    HeaderValue::from_str(&self.to_string()).ok()
  }
}

impl fmt::Display for CacheControl {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut parts: Vec<String> = Vec::new();
    if self.public {
      parts.push("public".into());
    }
    if self.no_cache {
      parts.push("no-cache".into());
    }
    if self.no_store {
      parts.push("no-store".into());
    }
    if self.only_if_cached {
      parts.push("only-if-cached".into());
    }
    if let Some(age) = self.max_age {
      parts.push(format!("max-age={}", age.as_secs()));
    }
    match self.max_stale {
      Some(Some(d)) => parts.push(format!("max-stale={}", d.as_secs())),
      Some(None) => parts.push("max-stale".into()),
      None => {}
    }
    write!(f, "{}", parts.join(", "))
  }
}

fn parse_seconds(s: &str) -> Option<Duration> {
  s.parse::<u64>().ok().map(Duration::from_secs)
}

/// Rewrite headers of a response received from the network so the cache
/// treats it as fresh for `max_age`, regardless of what the server said.
pub fn rewrite_network_response(headers: &mut HeaderMap, max_age: Duration) {
  if let Some(value) = CacheControl::fresh_for(max_age).header_value() {
    headers.insert(CACHE_CONTROL, value);
  }
  headers.remove(PRAGMA);
}

/// Rewrite an outgoing request to be served from cache only, accepting
/// responses up to `max_stale` past their freshness.
pub fn rewrite_offline_request(headers: &mut HeaderMap, max_stale: Duration) {
  if let Some(value) = CacheControl::offline(max_stale).header_value() {
    headers.insert(CACHE_CONTROL, value);
  }
  headers.remove(PRAGMA);
}

/// Status codes a shared HTTP cache may store without explicit expiration.
pub fn is_cacheable_status(status: u16) -> bool {
  matches!(
    status,
    200 | 203 | 204 | 300 | 301 | 308 | 404 | 405 | 410 | 414 | 501
  )
}
