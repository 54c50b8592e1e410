//! Bucket storage trait and SQLite implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::net::Response;

#[derive(Debug, Error)]
pub enum CacheError {
  #[error("cache database error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("failed to encode cached headers: {0}")]
  Encoding(#[from] serde_json::Error),

  #[error("failed to parse cached timestamp '{0}'")]
  Timestamp(String),

  #[error("failed to create cache directory: {0}")]
  Io(#[from] std::io::Error),

  #[error("cache lock poisoned")]
  LockPoisoned,
}

/// A response replayed from a bucket.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache bucket backends.
pub trait BucketStorage: Send + Sync {
  /// Look up an entry, regardless of its age.
  fn lookup(&self, bucket: &str, key: &str) -> Result<Option<CachedResponse>, CacheError>;

  /// Insert or replace an entry. Replacing counts as a fresh insertion.
  fn store(
    &self,
    bucket: &str,
    key: &str,
    url: &str,
    response: &Response,
    cached_at: DateTime<Utc>,
  ) -> Result<(), CacheError>;

  fn remove(&self, bucket: &str, key: &str) -> Result<bool, CacheError>;

  /// Evict the oldest insertions until at most `max_entries` remain.
  fn trim(&self, bucket: &str, max_entries: usize) -> Result<usize, CacheError>;

  /// Drop every entry inserted before `cutoff`.
  fn purge_older_than(&self, bucket: &str, cutoff: DateTime<Utc>) -> Result<usize, CacheError>;

  fn len(&self, bucket: &str) -> Result<usize, CacheError>;

  fn bucket_names(&self) -> Result<Vec<String>, CacheError>;

  /// Remove a bucket and everything in it.
  fn delete_bucket(&self, bucket: &str) -> Result<bool, CacheError>;
}

impl<S: BucketStorage + ?Sized> BucketStorage for Box<S> {
  fn lookup(&self, bucket: &str, key: &str) -> Result<Option<CachedResponse>, CacheError> {
    (**self).lookup(bucket, key)
  }

  fn store(
    &self,
    bucket: &str,
    key: &str,
    url: &str,
    response: &Response,
    cached_at: DateTime<Utc>,
  ) -> Result<(), CacheError> {
    (**self).store(bucket, key, url, response, cached_at)
  }

  fn remove(&self, bucket: &str, key: &str) -> Result<bool, CacheError> {
    (**self).remove(bucket, key)
  }

  fn trim(&self, bucket: &str, max_entries: usize) -> Result<usize, CacheError> {
    (**self).trim(bucket, max_entries)
  }

  fn purge_older_than(&self, bucket: &str, cutoff: DateTime<Utc>) -> Result<usize, CacheError> {
    (**self).purge_older_than(bucket, cutoff)
  }

  fn len(&self, bucket: &str) -> Result<usize, CacheError> {
    (**self).len(bucket)
  }

  fn bucket_names(&self) -> Result<Vec<String>, CacheError> {
    (**self).bucket_names()
  }

  fn delete_bucket(&self, bucket: &str) -> Result<bool, CacheError> {
    (**self).delete_bucket(bucket)
  }
}

/// Storage used when caching is disabled - every lookup misses.
pub struct NoopStorage;

impl BucketStorage for NoopStorage {
  fn lookup(&self, _bucket: &str, _key: &str) -> Result<Option<CachedResponse>, CacheError> {
    Ok(None) // Always miss
  }

  fn store(
    &self,
    _bucket: &str,
    _key: &str,
    _url: &str,
    _response: &Response,
    _cached_at: DateTime<Utc>,
  ) -> Result<(), CacheError> {
    Ok(()) // Discard
  }

  fn remove(&self, _bucket: &str, _key: &str) -> Result<bool, CacheError> {
    Ok(false)
  }

  fn trim(&self, _bucket: &str, _max_entries: usize) -> Result<usize, CacheError> {
    Ok(0)
  }

  fn purge_older_than(&self, _bucket: &str, _cutoff: DateTime<Utc>) -> Result<usize, CacheError> {
    Ok(0)
  }

  fn len(&self, _bucket: &str) -> Result<usize, CacheError> {
    Ok(0)
  }

  fn bucket_names(&self) -> Result<Vec<String>, CacheError> {
    Ok(Vec::new())
  }

  fn delete_bucket(&self, _bucket: &str) -> Result<bool, CacheError> {
    Ok(false)
  }
}

/// SQLite-based bucket storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

/// Schema for bucket tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_buckets (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

-- seq is the insertion order used for FIFO eviction
CREATE TABLE IF NOT EXISTS cache_entries (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    bucket TEXT NOT NULL REFERENCES cache_buckets(name) ON DELETE CASCADE,
    request_key TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    opaque INTEGER NOT NULL DEFAULT 0,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL,
    UNIQUE (bucket, request_key)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_bucket_seq
    ON cache_entries(bucket, seq);
"#;

impl SqliteStorage {
  /// Open (or create) the bucket database at `path`.
  pub fn open(path: &Path) -> Result<Self, CacheError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    Self::init(Connection::open(path)?)
  }

  /// Bucket storage that lives only as long as the process.
  pub fn in_memory() -> Result<Self, CacheError> {
    Self::init(Connection::open_in_memory()?)
  }

  fn init(conn: Connection) -> Result<Self, CacheError> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(CACHE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CacheError> {
    self.conn.lock().map_err(|_| CacheError::LockPoisoned)
  }
}

impl BucketStorage for SqliteStorage {
  fn lookup(&self, bucket: &str, key: &str) -> Result<Option<CachedResponse>, CacheError> {
    let conn = self.conn()?;

    let row: Option<(u16, bool, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, opaque, headers, body, cached_at FROM cache_entries
         WHERE bucket = ? AND request_key = ?",
        params![bucket, key],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
      )
      .optional()?;

    match row {
      Some((status, opaque, headers, body, cached_at)) => Ok(Some(CachedResponse {
        response: Response {
          status,
          headers: serde_json::from_str(&headers)?,
          body,
          opaque,
          synthesized: false,
          fallback: false,
        },
        cached_at: parse_datetime(&cached_at)?,
      })),
      None => Ok(None),
    }
  }

  fn store(
    &self,
    bucket: &str,
    key: &str,
    url: &str,
    response: &Response,
    cached_at: DateTime<Utc>,
  ) -> Result<(), CacheError> {
    let mut conn = self.conn()?;
    let headers = serde_json::to_string(&response.headers)?;
    let cached_at = cached_at.to_rfc3339();

    let tx = conn.transaction()?;
    tx.execute(
      "INSERT OR IGNORE INTO cache_buckets (name, created_at) VALUES (?, ?)",
      params![bucket, cached_at],
    )?;
    // Delete then insert so a replaced entry moves to the back of the queue
    tx.execute(
      "DELETE FROM cache_entries WHERE bucket = ? AND request_key = ?",
      params![bucket, key],
    )?;
    tx.execute(
      "INSERT INTO cache_entries (bucket, request_key, url, status, opaque, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
      params![
        bucket,
        key,
        url,
        response.status,
        response.opaque,
        headers,
        response.body,
        cached_at
      ],
    )?;
    tx.commit()?;

    Ok(())
  }

  fn remove(&self, bucket: &str, key: &str) -> Result<bool, CacheError> {
    let conn = self.conn()?;
    let removed = conn.execute(
      "DELETE FROM cache_entries WHERE bucket = ? AND request_key = ?",
      params![bucket, key],
    )?;
    Ok(removed > 0)
  }

  fn trim(&self, bucket: &str, max_entries: usize) -> Result<usize, CacheError> {
    let conn = self.conn()?;
    let evicted = conn.execute(
      "DELETE FROM cache_entries WHERE bucket = ?1 AND seq NOT IN (
         SELECT seq FROM cache_entries WHERE bucket = ?1 ORDER BY seq DESC LIMIT ?2
       )",
      params![bucket, max_entries as i64],
    )?;
    Ok(evicted)
  }

  fn purge_older_than(&self, bucket: &str, cutoff: DateTime<Utc>) -> Result<usize, CacheError> {
    let conn = self.conn()?;

    // Timestamps are compared after parsing; RFC 3339 strings with offsets
    // do not sort reliably as text.
    let mut stmt =
      conn.prepare("SELECT seq, cached_at FROM cache_entries WHERE bucket = ? ORDER BY seq")?;
    let rows: Vec<(i64, String)> = stmt
      .query_map(params![bucket], |row| Ok((row.get(0)?, row.get(1)?)))?
      .collect::<Result<_, _>>()?;
    drop(stmt);

    let mut purged = 0;
    for (seq, cached_at) in rows {
      if parse_datetime(&cached_at)? < cutoff {
        purged += conn.execute("DELETE FROM cache_entries WHERE seq = ?", params![seq])?;
      }
    }
    Ok(purged)
  }

  fn len(&self, bucket: &str) -> Result<usize, CacheError> {
    let conn = self.conn()?;
    let count: i64 = conn.query_row(
      "SELECT COUNT(*) FROM cache_entries WHERE bucket = ?",
      params![bucket],
      |row| row.get(0),
    )?;
    Ok(count as usize)
  }

  fn bucket_names(&self) -> Result<Vec<String>, CacheError> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare("SELECT name FROM cache_buckets ORDER BY name")?;
    let names = stmt
      .query_map([], |row| row.get(0))?
      .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
  }

  fn delete_bucket(&self, bucket: &str) -> Result<bool, CacheError> {
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM cache_entries WHERE bucket = ?", params![bucket])?;
    let removed = tx.execute("DELETE FROM cache_buckets WHERE name = ?", params![bucket])?;
    tx.commit()?;
    Ok(removed > 0)
  }
}

/// Parse a timestamp written by `store`.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|_| CacheError::Timestamp(s.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  fn store(storage: &SqliteStorage, bucket: &str, key: &str, at: DateTime<Utc>) {
    storage
      .store(bucket, key, &format!("https://example.com/{}", key), &Response::ok(key), at)
      .unwrap();
  }

  #[test]
  fn test_store_and_lookup() {
    let storage = SqliteStorage::in_memory().unwrap();
    let now = Utc::now();
    let response = Response::ok("hello").with_header("content-type", "text/plain");
    storage
      .store("b", "k", "https://example.com/k", &response, now)
      .unwrap();

    let cached = storage.lookup("b", "k").unwrap().unwrap();
    assert_eq!(cached.response, response);
    assert_eq!(cached.cached_at.timestamp(), now.timestamp());
    assert!(storage.lookup("other", "k").unwrap().is_none());
  }

  #[test]
  fn test_trim_evicts_oldest_insertions() {
    let storage = SqliteStorage::in_memory().unwrap();
    let now = Utc::now();
    for key in ["a", "b", "c", "d"] {
      store(&storage, "b1", key, now);
    }

    assert_eq!(storage.trim("b1", 3).unwrap(), 1);
    assert_eq!(storage.len("b1").unwrap(), 3);
    assert!(storage.lookup("b1", "a").unwrap().is_none());
    assert!(storage.lookup("b1", "d").unwrap().is_some());
  }

  #[test]
  fn test_replacing_entry_counts_as_new_insertion() {
    let storage = SqliteStorage::in_memory().unwrap();
    let now = Utc::now();
    store(&storage, "b1", "a", now);
    store(&storage, "b1", "b", now);
    store(&storage, "b1", "a", now);

    storage.trim("b1", 1).unwrap();
    assert!(storage.lookup("b1", "a").unwrap().is_some());
    assert!(storage.lookup("b1", "b").unwrap().is_none());
  }

  #[test]
  fn test_purge_older_than() {
    let storage = SqliteStorage::in_memory().unwrap();
    let now = Utc::now();
    store(&storage, "b1", "old", now - Duration::days(10));
    store(&storage, "b1", "new", now);

    assert_eq!(storage.purge_older_than("b1", now - Duration::days(7)).unwrap(), 1);
    assert!(storage.lookup("b1", "old").unwrap().is_none());
    assert!(storage.lookup("b1", "new").unwrap().is_some());
  }

  #[test]
  fn test_delete_bucket_removes_entries() {
    let storage = SqliteStorage::in_memory().unwrap();
    let now = Utc::now();
    store(&storage, "keep", "a", now);
    store(&storage, "drop", "a", now);

    assert!(storage.delete_bucket("drop").unwrap());
    assert_eq!(storage.bucket_names().unwrap(), vec!["keep".to_string()]);
    assert_eq!(storage.len("drop").unwrap(), 0);
    assert!(!storage.delete_bucket("drop").unwrap());
  }

  #[test]
  fn test_open_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");
    {
      let storage = SqliteStorage::open(&path).unwrap();
      store(&storage, "b1", "a", Utc::now());
    }
    let reopened = SqliteStorage::open(&path).unwrap();
    assert!(reopened.lookup("b1", "a").unwrap().is_some());
  }
}
