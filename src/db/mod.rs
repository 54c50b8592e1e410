//! Durable local story store.
//!
//! One SQLite database holds two collections keyed by story id: the mirror
//! of the last fetch and the user's saved stories. The database is opened
//! lazily on first access; a schema version mismatch upgrades it in place
//! without touching existing rows.

mod collection;
pub mod schema;

use std::path::PathBuf;
use std::sync::Mutex;

use rusqlite::{Connection, ErrorCode};
use thiserror::Error;
use tracing::info;

pub use collection::{Collection, Mirror, Saved};

/// Database file name inside the data directory.
pub const DB_FILE: &str = "story-app-db.sqlite";

#[derive(Debug, Error)]
pub enum StorageError {
  #[error("story database error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("failed to encode story: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("a story id is required")]
  MissingId,

  #[error("failed to create database directory: {0}")]
  Io(#[from] std::io::Error),

  #[error("story database lock poisoned")]
  LockPoisoned,
}

impl StorageError {
  /// Whether the failure was the disk (or quota) running out.
  pub fn is_quota_exceeded(&self) -> bool {
    matches!(
      self,
      StorageError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::DiskFull
    )
  }
}

/// Database connection wrapper for stories.
pub struct StoryStore {
  /// `None` keeps the database in memory
  path: Option<PathBuf>,
  conn: Mutex<Option<Connection>>,
}

impl StoryStore {
  /// A store at `path`. Nothing touches the disk until first access.
  pub fn new(path: PathBuf) -> Self {
    Self {
      path: Some(path),
      conn: Mutex::new(None),
    }
  }

  /// A store that lives only as long as the process.
  pub fn in_memory() -> Self {
    Self {
      path: None,
      conn: Mutex::new(None),
    }
  }

  pub fn mirror(&self) -> Collection<'_, Mirror> {
    Collection::new(self)
  }

  pub fn saved(&self) -> Collection<'_, Saved> {
    Collection::new(self)
  }

  #[cfg(test)]
  pub fn schema_version(&self) -> Result<i64, StorageError> {
    self.with_conn(|conn| Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?))
  }

  /// Run `f` against the open connection, opening it first if needed.
  fn with_conn<R>(
    &self,
    f: impl FnOnce(&mut Connection) -> Result<R, StorageError>,
  ) -> Result<R, StorageError> {
    let mut guard = self.conn.lock().map_err(|_| StorageError::LockPoisoned)?;
    if guard.is_none() {
      *guard = Some(self.open()?);
    }
    match guard.as_mut() {
      Some(conn) => f(conn),
      None => Err(StorageError::LockPoisoned),
    }
  }

  fn open(&self) -> Result<Connection, StorageError> {
    let mut conn = match &self.path {
      Some(path) => {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
          std::fs::create_dir_all(parent)?;
        }
        Connection::open(path)?
      }
      None => Connection::open_in_memory()?,
    };

    Self::upgrade(&mut conn)?;
    Ok(conn)
  }

  /// Bring the schema up to date. Never drops or rewrites existing data.
  fn upgrade(conn: &mut Connection) -> Result<(), StorageError> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version == schema::SCHEMA_VERSION {
      return Ok(());
    }

    let tx = conn.transaction()?;
    tx.execute_batch(schema::SCHEMA)?;
    // A newer version on disk keeps its number; missing tables are still created
    let target = version.max(schema::SCHEMA_VERSION);
    tx.execute_batch(&format!("PRAGMA user_version = {}", target))?;
    tx.commit()?;

    info!(from = version, to = target, "Upgraded story database schema");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::story::{GeoPoint, Story};
  use chrono::{TimeZone, Utc};

  fn story(id: &str) -> Story {
    Story {
      id: id.to_string(),
      author_name: "Dimas".to_string(),
      description: format!("story {}", id),
      photo_url: format!("https://story-api.dicoding.dev/images/stories/{}.png", id),
      created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
      location: Some(GeoPoint {
        lat: -6.2,
        lon: 106.8,
      }),
    }
  }

  fn ids(stories: &[Story]) -> Vec<&str> {
    stories.iter().map(|s| s.id.as_str()).collect()
  }

  #[test]
  fn test_mirror_put_all_then_get() {
    let store = StoryStore::in_memory();
    let s = story("a");
    store.mirror().put_all(&[s.clone()]).unwrap();
    assert_eq!(store.mirror().get("a").unwrap(), Some(s));
    assert_eq!(store.mirror().get("missing").unwrap(), None);
  }

  #[test]
  fn test_mirror_put_all_replaces_previous_batch() {
    let store = StoryStore::in_memory();
    store.mirror().put_all(&[story("a"), story("b")]).unwrap();
    store.mirror().replace_all(&[story("c")]).unwrap();

    let all = store.mirror().get_all().unwrap();
    assert_eq!(ids(&all), vec!["c"]);
  }

  #[test]
  fn test_saved_put_all_is_additive() {
    let store = StoryStore::in_memory();
    store.saved().put_all(&[story("a")]).unwrap();
    store.saved().put_all(&[story("b")]).unwrap();
    assert_eq!(store.saved().len().unwrap(), 2);
  }

  #[test]
  fn test_save_twice_keeps_one_entry() {
    let store = StoryStore::in_memory();
    store.saved().save(&story("a")).unwrap();
    store.saved().save(&story("a")).unwrap();
    assert_eq!(ids(&store.saved().get_all().unwrap()), vec!["a"]);
  }

  #[test]
  fn test_save_then_remove() {
    let store = StoryStore::in_memory();
    store.saved().save(&story("a")).unwrap();
    store.saved().save(&story("b")).unwrap();

    assert!(store.saved().remove("a").unwrap());
    assert!(!store.saved().remove("a").unwrap());
    assert_eq!(ids(&store.saved().get_all().unwrap()), vec!["b"]);
    assert!(!store.saved().contains("a").unwrap());
  }

  #[test]
  fn test_collections_are_independent() {
    let store = StoryStore::in_memory();
    store.saved().save(&story("kept")).unwrap();
    store.mirror().replace_all(&[story("x")]).unwrap();
    store.mirror().clear().unwrap();

    assert!(store.mirror().is_empty().unwrap());
    assert!(store.saved().contains("kept").unwrap());
    assert!(store.mirror().get("kept").unwrap().is_none());
  }

  #[test]
  fn test_failed_batch_leaves_prior_state() {
    let store = StoryStore::in_memory();
    store.mirror().put_all(&[story("a"), story("b")]).unwrap();

    let err = store
      .mirror()
      .put_all(&[story("c"), story(""), story("d")])
      .unwrap_err();
    assert!(matches!(err, StorageError::MissingId));

    assert_eq!(ids(&store.mirror().get_all().unwrap()), vec!["a", "b"]);
  }

  #[test]
  fn test_put_requires_id() {
    let store = StoryStore::in_memory();
    assert!(matches!(
      store.saved().save(&story("  ")),
      Err(StorageError::MissingId)
    ));
  }

  #[test]
  fn test_lazy_open_creates_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("stories.sqlite");
    let store = StoryStore::new(path.clone());
    assert!(!path.exists());

    assert_eq!(store.schema_version().unwrap(), schema::SCHEMA_VERSION);
    assert!(path.exists());
  }

  #[test]
  fn test_reopen_keeps_saved_stories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stories.sqlite");
    StoryStore::new(path.clone()).saved().save(&story("a")).unwrap();

    let reopened = StoryStore::new(path);
    assert!(reopened.saved().contains("a").unwrap());
  }

  #[test]
  fn test_upgrade_from_v1_preserves_saved_stories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stories.sqlite");
    let data = serde_json::to_string(&story("old")).unwrap();
    {
      let conn = Connection::open(&path).unwrap();
      conn
        .execute_batch(
          "CREATE TABLE saved_stories (id TEXT PRIMARY KEY, data TEXT NOT NULL, stored_at TEXT NOT NULL);
           PRAGMA user_version = 1;",
        )
        .unwrap();
      conn
        .execute(
          "INSERT INTO saved_stories (id, data, stored_at) VALUES ('old', ?, '2024-01-01T00:00:00Z')",
          [&data],
        )
        .unwrap();
    }

    let store = StoryStore::new(path);
    assert_eq!(store.schema_version().unwrap(), 2);
    assert!(store.saved().contains("old").unwrap());
    assert!(store.mirror().is_empty().unwrap());
  }

  #[test]
  fn test_newer_version_is_not_downgraded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stories.sqlite");
    {
      let conn = Connection::open(&path).unwrap();
      conn.execute_batch("PRAGMA user_version = 5;").unwrap();
    }

    let store = StoryStore::new(path);
    assert_eq!(store.schema_version().unwrap(), 5);
    store.mirror().replace_all(&[story("a")]).unwrap();
    assert_eq!(store.mirror().len().unwrap(), 1);
  }
}
