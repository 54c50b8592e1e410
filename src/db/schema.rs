//! Story database schema and its version history.

/// Current schema version, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 2;

/// User-curated stories. Only explicit save/remove touches this table.
pub const SAVED_TABLE: &str = "saved_stories";

/// Mirror of the last successful fetch.
pub const MIRROR_TABLE: &str = "fetched_stories";

/// Every statement is idempotent, so the full schema can be replayed over a
/// database of any older version without touching existing rows.
pub const SCHEMA: &str = r#"
-- v1: saved stories
CREATE TABLE IF NOT EXISTS saved_stories (
    id TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    stored_at TEXT NOT NULL
);

-- v2: mirror of fetched stories
CREATE TABLE IF NOT EXISTS fetched_stories (
    id TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    stored_at TEXT NOT NULL
);
"#;
