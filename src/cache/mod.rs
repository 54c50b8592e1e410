//! Transport-level caching for offline support.
//!
//! Every outbound request is classified by a fixed rule table and served by
//! one of three strategies, each backed by a named, bounded bucket:
//! - Cache-first for the app shell and third-party assets
//! - Stale-while-revalidate for images served by the story API
//! - Network-first for story API data and everything else
//!
//! Buckets carry a version tag in their name; activation deletes buckets
//! from any other version.

mod layer;
mod router;
mod rules;
mod storage;

pub use layer::OFFLINE_MESSAGE;
pub use router::{CacheRouter, InstallReport};
pub use rules::{RouteTable, RouterSettings};
pub use storage::{BucketStorage, CacheError, NoopStorage, SqliteStorage};

#[cfg(test)]
pub(crate) use rules::test_settings;
