//! Typed handles onto the two story collections.
//!
//! `Mirror` and `Saved` share a storage shape but not a role: the mirror is a
//! disposable copy of the last fetch, the saved collection records user
//! intent. The kind is part of the handle's type, so code that was only given
//! a mirror handle cannot write to the saved collection.

use std::marker::PhantomData;

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Transaction};
use tracing::debug;

use super::schema::{MIRROR_TABLE, SAVED_TABLE};
use super::{StorageError, StoryStore};
use crate::story::Story;

mod sealed {
  pub trait Sealed {}
}

/// One of the two story collections.
pub trait CollectionKind: sealed::Sealed {
  const TABLE: &'static str;
  /// Whether `put_all` replaces the whole collection or upserts into it
  const REPLACE_ON_PUT_ALL: bool;
}

/// Transient mirror of the most recent network fetch.
#[derive(Debug)]
pub enum Mirror {}

/// Stories the user explicitly saved.
#[derive(Debug)]
pub enum Saved {}

impl sealed::Sealed for Mirror {}
impl sealed::Sealed for Saved {}

impl CollectionKind for Mirror {
  const TABLE: &'static str = MIRROR_TABLE;
  const REPLACE_ON_PUT_ALL: bool = true;
}

impl CollectionKind for Saved {
  const TABLE: &'static str = SAVED_TABLE;
  const REPLACE_ON_PUT_ALL: bool = false;
}

/// Handle onto one collection of a [`StoryStore`].
pub struct Collection<'a, K: CollectionKind> {
  store: &'a StoryStore,
  _kind: PhantomData<K>,
}

impl<'a, K: CollectionKind> Collection<'a, K> {
  pub(super) fn new(store: &'a StoryStore) -> Self {
    Self {
      store,
      _kind: PhantomData,
    }
  }

  pub fn get(&self, id: &str) -> Result<Option<Story>, StorageError> {
    self.store.with_conn(|conn| {
      let data: Option<String> = conn
        .query_row(
          &format!("SELECT data FROM {} WHERE id = ?", K::TABLE),
          params![id],
          |row| row.get(0),
        )
        .optional()?;

      match data {
        Some(data) => Ok(Some(serde_json::from_str(&data)?)),
        None => Ok(None),
      }
    })
  }

  /// Every story in the collection, in insertion order.
  pub fn get_all(&self) -> Result<Vec<Story>, StorageError> {
    self.store.with_conn(|conn| {
      let mut stmt = conn.prepare(&format!("SELECT data FROM {} ORDER BY rowid", K::TABLE))?;
      let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

      rows
        .iter()
        .map(|data| serde_json::from_str(data).map_err(StorageError::from))
        .collect()
    })
  }

  /// Insert or replace one story.
  pub fn put(&self, story: &Story) -> Result<(), StorageError> {
    self.store.with_conn(|conn| {
      let tx = conn.transaction()?;
      upsert::<K>(&tx, story)?;
      tx.commit()?;
      Ok(())
    })
  }

  /// Write a batch atomically: either every story is visible afterwards or
  /// the collection is left exactly as it was.
  ///
  /// The mirror is replaced wholesale; the saved collection is upserted into.
  pub fn put_all(&self, stories: &[Story]) -> Result<(), StorageError> {
    self.store.with_conn(|conn| {
      let tx = conn.transaction()?;
      if K::REPLACE_ON_PUT_ALL {
        tx.execute(&format!("DELETE FROM {}", K::TABLE), [])?;
      }
      for story in stories {
        upsert::<K>(&tx, story)?;
      }
      tx.commit()?;
      debug!(table = K::TABLE, count = stories.len(), "Stored story batch");
      Ok(())
    })
  }

  /// Remove one story. Returns whether it was present.
  pub fn delete(&self, id: &str) -> Result<bool, StorageError> {
    self.store.with_conn(|conn| {
      let removed = conn.execute(&format!("DELETE FROM {} WHERE id = ?", K::TABLE), params![id])?;
      Ok(removed > 0)
    })
  }

  #[cfg(test)]
  pub fn clear(&self) -> Result<usize, StorageError> {
    self
      .store
      .with_conn(|conn| Ok(conn.execute(&format!("DELETE FROM {}", K::TABLE), [])?))
  }

  #[cfg(test)]
  pub fn len(&self) -> Result<usize, StorageError> {
    self.store.with_conn(|conn| {
      let count: i64 =
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", K::TABLE), [], |row| row.get(0))?;
      Ok(count as usize)
    })
  }

  #[cfg(test)]
  pub fn is_empty(&self) -> Result<bool, StorageError> {
    Ok(self.len()? == 0)
  }
}

impl Collection<'_, Mirror> {
  /// Swap in the result of a fresh list fetch.
  pub fn replace_all(&self, stories: &[Story]) -> Result<(), StorageError> {
    self.put_all(stories)
  }
}

impl Collection<'_, Saved> {
  /// Saving twice leaves a single entry.
  pub fn save(&self, story: &Story) -> Result<(), StorageError> {
    self.put(story)
  }

  pub fn remove(&self, id: &str) -> Result<bool, StorageError> {
    self.delete(id)
  }

  #[cfg(test)]
  pub fn contains(&self, id: &str) -> Result<bool, StorageError> {
    Ok(self.get(id)?.is_some())
  }
}

fn upsert<K: CollectionKind>(tx: &Transaction<'_>, story: &Story) -> Result<(), StorageError> {
  if story.id.trim().is_empty() {
    return Err(StorageError::MissingId);
  }
  let data = serde_json::to_string(story)?;
  // Delete then insert so a replaced story moves to the end of the order
  tx.execute(&format!("DELETE FROM {} WHERE id = ?", K::TABLE), params![story.id])?;
  tx.execute(
    &format!("INSERT INTO {} (id, data, stored_at) VALUES (?, ?, ?)", K::TABLE),
    params![story.id, data, Utc::now().to_rfc3339()],
  )?;
  Ok(())
}
