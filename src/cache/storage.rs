//! Cache storage trait and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::types::{decode_headers, encode_headers, CachedResponse};

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Look up a response by cache key, marking it as recently used.
  fn get(&self, key: &str) -> Result<Option<CachedResponse>>;

  /// Store a response, evicting least-recently-used entries to stay within budget.
  ///
  /// Returns `false` if the response was too large to store at all.
  fn put(&self, response: &CachedResponse) -> Result<bool>;

  /// Remove every entry.
  fn clear(&self) -> Result<()>;

  /// Total bytes currently accounted for.
  fn size(&self) -> Result<u64>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn get(&self, _key: &str) -> Result<Option<CachedResponse>> {
    Ok(None) // Always miss
  }

  fn put(&self, _response: &CachedResponse) -> Result<bool> {
    Ok(false) // Discard
  }

  fn clear(&self) -> Result<()> {
    Ok(())
  }

  fn size(&self) -> Result<u64> {
    Ok(0)
  }
}

/// SQLite-based cache storage, bounded to `max_size` bytes.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
  max_size: u64,
}

impl SqliteStorage {
  /// Open (or create) the cache database inside `dir`.
  pub fn open(dir: &Path, max_size: u64) -> Result<Self> {
    std::fs::create_dir_all(dir)
      .map_err(|e| eyre!("Failed to create cache directory {}: {}", dir.display(), e))?;

    let path = dir.join("cache.db");
    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let storage = Self {
      conn: Mutex::new(conn),
      max_size,
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Default cache directory (`$XDG_CACHE_HOME/datausage/responses`).
  pub fn default_dir() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".cache")))
      .ok_or_else(|| eyre!("Could not determine cache directory"))?;

    Ok(cache_dir.join("datausage").join("responses"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Schema for the response cache.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS http_cache (
    cache_key TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers BLOB NOT NULL,
    body BLOB NOT NULL,
    size INTEGER NOT NULL,
    stored_at TEXT NOT NULL,
    -- Monotonic access counter used for LRU eviction
    access_seq INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_http_cache_access ON http_cache(access_seq);
"#;

const NEXT_SEQ: &str = "(SELECT COALESCE(MAX(access_seq), 0) + 1 FROM http_cache)";

impl CacheStorage for SqliteStorage {
  fn get(&self, key: &str) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;

    let row: Option<(String, i64, Vec<u8>, Vec<u8>, String)> = conn
      .query_row(
        "SELECT url, status, headers, body, stored_at FROM http_cache WHERE cache_key = ?",
        params![key],
        |row| {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
          ))
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache entry: {}", e))?;

    let Some((url, status, headers, body, stored_at)) = row else {
      return Ok(None);
    };

    conn
      .execute(
        &format!(
          "UPDATE http_cache SET access_seq = {} WHERE cache_key = ?",
          NEXT_SEQ
        ),
        params![key],
      )
      .map_err(|e| eyre!("Failed to touch cache entry: {}", e))?;

    let status = u16::try_from(status).map_err(|_| eyre!("Invalid stored status {}", status))?;

    Ok(Some(CachedResponse {
      url,
      status,
      headers: decode_headers(&headers)?,
      body,
      stored_at: parse_datetime(&stored_at)?,
    }))
  }

  fn put(&self, response: &CachedResponse) -> Result<bool> {
    let key = response.key();
    let size = response.size();
    let mut conn = self.lock()?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    // Whatever was there is superseded, even if the new response doesn't fit
    tx.execute("DELETE FROM http_cache WHERE cache_key = ?", params![key])
      .map_err(|e| eyre!("Failed to delete old cache entry: {}", e))?;

    if size > self.max_size {
      tx.commit()
        .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
      debug!(url = %response.url, size, max = self.max_size, "response exceeds cache budget");
      return Ok(false);
    }

    let headers = encode_headers(&response.headers)?;
    tx.execute(
      &format!(
        "INSERT INTO http_cache (cache_key, url, status, headers, body, size, stored_at, access_seq)
         VALUES (?, ?, ?, ?, ?, ?, ?, {})",
        NEXT_SEQ
      ),
      params![
        key,
        response.url,
        i64::from(response.status),
        headers,
        response.body,
        size as i64,
        format_datetime(response.stored_at),
      ],
    )
    .map_err(|e| eyre!("Failed to store cache entry: {}", e))?;

    // Evict least recently used until within budget
    let mut evicted = 0usize;
    loop {
      let total: i64 = tx
        .query_row("SELECT COALESCE(SUM(size), 0) FROM http_cache", [], |row| {
          row.get(0)
        })
        .map_err(|e| eyre!("Failed to compute cache size: {}", e))?;

      if total as u64 <= self.max_size {
        break;
      }

      let removed = tx
        .execute(
          "DELETE FROM http_cache WHERE cache_key = (
             SELECT cache_key FROM http_cache WHERE cache_key != ? ORDER BY access_seq LIMIT 1
           )",
          params![key],
        )
        .map_err(|e| eyre!("Failed to evict cache entry: {}", e))?;

      if removed == 0 {
        break;
      }
      evicted += removed;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    if evicted > 0 {
      debug!(evicted, "evicted least recently used cache entries");
    }

    Ok(true)
  }

  fn clear(&self) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute("DELETE FROM http_cache", [])
      .map_err(|e| eyre!("Failed to clear cache: {}", e))?;
    Ok(())
  }

  fn size(&self) -> Result<u64> {
    let conn = self.lock()?;
    let total: i64 = conn
      .query_row("SELECT COALESCE(SUM(size), 0) FROM http_cache", [], |row| {
        row.get(0)
      })
      .map_err(|e| eyre!("Failed to compute cache size: {}", e))?;
    Ok(total as u64)
  }
}

fn format_datetime(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL};
  use tempfile::TempDir;

  fn response(url: &str, body_len: usize) -> CachedResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("public, max-age=60"));
    CachedResponse::new(url, 200, headers, vec![b'x'; body_len])
  }

  #[test]
  fn test_put_and_get() {
    let dir = TempDir::new().unwrap();
    let storage = SqliteStorage::open(dir.path(), 10 * 1024 * 1024).unwrap();

    let entry = response("https://example.com/a", 16);
    assert!(storage.put(&entry).unwrap());

    let cached = storage.get(&entry.key()).unwrap().unwrap();
    assert_eq!(cached.url, "https://example.com/a");
    assert_eq!(cached.status, 200);
    assert_eq!(cached.body, entry.body);
    assert_eq!(cached.headers.get(CACHE_CONTROL).unwrap(), "public, max-age=60");
    assert_eq!(
      format_datetime(cached.stored_at),
      format_datetime(entry.stored_at)
    );
  }

  #[test]
  fn test_get_missing() {
    let dir = TempDir::new().unwrap();
    let storage = SqliteStorage::open(dir.path(), 1024).unwrap();
    assert!(storage.get("nope").unwrap().is_none());
  }

  #[test]
  fn test_put_replaces_existing() {
    let dir = TempDir::new().unwrap();
    let storage = SqliteStorage::open(dir.path(), 1024 * 1024).unwrap();

    storage.put(&response("https://example.com/a", 10)).unwrap();
    let newer = response("https://example.com/a", 20);
    storage.put(&newer).unwrap();

    assert_eq!(storage.get(&newer.key()).unwrap().unwrap().body.len(), 20);
    assert_eq!(storage.size().unwrap(), newer.size());
  }

  #[test]
  fn test_evicts_least_recently_used() {
    let dir = TempDir::new().unwrap();
    let a = response("https://example.com/a", 400);
    let b = response("https://example.com/b", 400);
    let c = response("https://example.com/c", 400);
    // Room for two entries, not three
    let budget = a.size() + b.size() + 10;
    let storage = SqliteStorage::open(dir.path(), budget).unwrap();

    storage.put(&a).unwrap();
    storage.put(&b).unwrap();
    // Touch a so b becomes the eviction candidate
    assert!(storage.get(&a.key()).unwrap().is_some());
    storage.put(&c).unwrap();

    assert!(storage.get(&a.key()).unwrap().is_some());
    assert!(storage.get(&b.key()).unwrap().is_none());
    assert!(storage.get(&c.key()).unwrap().is_some());
    assert!(storage.size().unwrap() <= budget);
  }

  #[test]
  fn test_oversized_response_is_not_stored() {
    let dir = TempDir::new().unwrap();
    let storage = SqliteStorage::open(dir.path(), 100).unwrap();

    let big = response("https://example.com/big", 500);
    assert!(!storage.put(&big).unwrap());
    assert!(storage.get(&big.key()).unwrap().is_none());
    assert_eq!(storage.size().unwrap(), 0);
  }

  #[test]
  fn test_clear() {
    let dir = TempDir::new().unwrap();
    let storage = SqliteStorage::open(dir.path(), 1024 * 1024).unwrap();

    let a = response("https://example.com/a", 1);
    let b = response("https://example.com/b", 1);
    storage.put(&a).unwrap();
    storage.put(&b).unwrap();

    assert_eq!(storage.size().unwrap(), a.size() + b.size());

    storage.clear().unwrap();
    assert!(storage.get(&a.key()).unwrap().is_none());
    assert!(storage.get(&b.key()).unwrap().is_none());
    assert_eq!(storage.size().unwrap(), 0);
  }

  #[test]
  fn test_reopen_keeps_entries() {
    let dir = TempDir::new().unwrap();
    let entry = response("https://example.com/a", 8);
    {
      let storage = SqliteStorage::open(dir.path(), 1024).unwrap();
      storage.put(&entry).unwrap();
    }
    let storage = SqliteStorage::open(dir.path(), 1024).unwrap();
    assert!(storage.get(&entry.key()).unwrap().is_some());
  }

  #[test]
  fn test_noop_storage_always_misses() {
    let entry = response("https://example.com/a", 8);
    assert!(!NoopStorage.put(&entry).unwrap());
    assert!(NoopStorage.get(&entry.key()).unwrap().is_none());
  }
}
