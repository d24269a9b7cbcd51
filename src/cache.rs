//! Durable local cache for canonical documents.
//!
//! One SQLite file, one logical handle, serialized internally. Rows expire
//! lazily: an expired row is treated as absent on read and deleted in
//! place. The schema is versioned through `PRAGMA user_version`; additive
//! migrations preserve existing rows, anything backward-incompatible drops
//! and recreates the table.

use std::collections::VecDeque;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::document::{Document, Source};

/// Bump when the schema changes; see [`migrate`].
const SCHEMA_VERSION: i32 = 2;

/// Sliding window over recent lookups backing `stats().hit_rate`.
const HIT_WINDOW: usize = 512;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = CacheError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub entries: u64,
    pub total_bytes: u64,
    /// Hit rate over the recent lookup window, in `[0, 1]`.
    pub hit_rate: f64,
}

#[derive(Debug)]
pub struct CacheStore {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    conn: Connection,
    window: VecDeque<bool>,
}

impl CacheStore {
    /// Opens (or creates) the store at `path`, running migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        migrate(&conn)?;
        debug!(path = %path.display(), "cache store open");

        Ok(Self {
            inner: Mutex::new(Inner {
                conn,
                window: VecDeque::with_capacity(HIT_WINDOW),
            }),
        })
    }

    /// In-memory store, used when the durable file cannot be opened and in
    /// tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrate(&conn)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                conn,
                window: VecDeque::with_capacity(HIT_WINDOW),
            }),
        })
    }

    /// Returns the cached document for `key`, or `None` if absent or
    /// expired. Expired rows are deleted on the way out.
    pub fn get(&self, key: &str, now_ms: i64) -> Result<Option<Document>> {
        let mut inner = self.inner.lock();

        let row = inner
            .conn
            .query_row(
                "SELECT content, tokens, url, fetched_at, ttl_ms FROM documents WHERE key = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((content, tokens, url, fetched_at, ttl_ms)) = row else {
            record_lookup(&mut inner, false);
            return Ok(None);
        };

        if fetched_at + ttl_ms < now_ms {
            inner
                .conn
                .execute("DELETE FROM documents WHERE key = ?1", params![key])?;
            debug!(key, "evicted expired cache row");
            record_lookup(&mut inner, false);
            return Ok(None);
        }

        record_lookup(&mut inner, true);
        Ok(Some(Document {
            canonical_id: key.to_owned(),
            content,
            token_count: tokens as usize,
            source: Source::Cache,
            source_url: url,
            fetched_at_ms: fetched_at,
            ttl_ms,
        }))
    }

    /// Atomically replaces the row for the document's canonical id.
    pub fn put(&self, document: &Document) -> Result<()> {
        let version = document
            .canonical_id
            .rsplit_once('@')
            .map(|(_, v)| v.to_owned());

        let inner = self.inner.lock();
        inner.conn.execute(
            "INSERT OR REPLACE INTO documents \
             (key, content, tokens, url, fetched_at, ttl_ms, version) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                document.canonical_id,
                document.content,
                document.token_count as i64,
                document.source_url,
                document.fetched_at_ms,
                document.ttl_ms,
                version,
            ],
        )?;
        Ok(())
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let inner = self.inner.lock();
        let (entries, total_bytes): (i64, i64) = inner.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(LENGTH(content)), 0) FROM documents",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let (entries, total_bytes) = (entries.max(0) as u64, total_bytes.max(0) as u64);

        let hits = inner.window.iter().filter(|hit| **hit).count();
        let hit_rate = if inner.window.is_empty() {
            0.0
        } else {
            hits as f64 / inner.window.len() as f64
        };

        Ok(CacheStats {
            entries,
            total_bytes,
            hit_rate,
        })
    }

    /// Deletes every row whose key matches `predicate`; returns the count.
    pub fn purge<F>(&self, predicate: F) -> Result<usize>
    where
        F: Fn(&str) -> bool,
    {
        let inner = self.inner.lock();

        let keys: Vec<String> = {
            let mut stmt = inner.conn.prepare("SELECT key FROM documents")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.filter_map(|k| k.ok()).filter(|k| predicate(k)).collect()
        };

        for key in &keys {
            inner
                .conn
                .execute("DELETE FROM documents WHERE key = ?1", params![key])?;
        }
        Ok(keys.len())
    }

    /// Sweeps all expired rows at once.
    pub fn purge_expired(&self, now_ms: i64) -> Result<usize> {
        let inner = self.inner.lock();
        let n = inner.conn.execute(
            "DELETE FROM documents WHERE fetched_at + ttl_ms < ?1",
            params![now_ms],
        )?;
        Ok(n)
    }
}

fn record_lookup(inner: &mut Inner, hit: bool) {
    if inner.window.len() == HIT_WINDOW {
        inner.window.pop_front();
    }
    inner.window.push_back(hit);
}

fn schema_version(conn: &Connection) -> Result<i32> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS documents (
            key        TEXT PRIMARY KEY,
            content    TEXT NOT NULL,
            tokens     INTEGER NOT NULL,
            url        TEXT NOT NULL,
            fetched_at INTEGER NOT NULL,
            ttl_ms     INTEGER NOT NULL,
            version    TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_documents_fetched_at
            ON documents(fetched_at);",
    )?;
    Ok(())
}

/// Ordered migrations from any historical version up to
/// [`SCHEMA_VERSION`]. Version 1 lacked the `tokens` column; adding it is
/// additive, so rows are preserved. A stored version newer than ours is
/// backward-incompatible and drops the table.
fn migrate(conn: &Connection) -> Result<()> {
    let stored = schema_version(conn)?;

    if stored > SCHEMA_VERSION {
        warn!(
            stored,
            current = SCHEMA_VERSION,
            "cache schema from the future, dropping"
        );
        conn.execute_batch("DROP TABLE IF EXISTS documents;")?;
        create_schema(conn)?;
    } else if stored == 0 {
        create_schema(conn)?;
    } else if stored < 2 {
        info!(from = stored, "migrating cache schema: adding token counts");
        conn.execute_batch("ALTER TABLE documents ADD COLUMN tokens INTEGER NOT NULL DEFAULT 0;")?;
    }

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(key: &str, content: &str, fetched_at_ms: i64, ttl_ms: i64) -> Document {
        Document {
            canonical_id: key.to_owned(),
            content: content.to_owned(),
            token_count: 42,
            source: Source::Live,
            source_url: "https://api.flutter.dev/flutter/widgets/Container-class.html".into(),
            fetched_at_ms,
            ttl_ms,
        }
    }

    #[test]
    fn put_then_get_within_ttl() {
        let store = CacheStore::open_in_memory().unwrap();
        let d = doc("flutter_class:widgets.Container", "# Container", 1_000, 60_000);
        store.put(&d).unwrap();

        let got = store.get(&d.canonical_id, 2_000).unwrap().unwrap();
        assert_eq!(got.content, d.content);
        assert_eq!(got.token_count, d.token_count);
        assert_eq!(got.source, Source::Cache);
    }

    #[test]
    fn expired_rows_read_as_absent_and_are_evicted() {
        let store = CacheStore::open_in_memory().unwrap();
        let d = doc("flutter_class:widgets.Container", "# Container", 1_000, 1_000);
        store.put(&d).unwrap();

        assert!(store.get(&d.canonical_id, 3_000).unwrap().is_none());
        // the row is gone, not just filtered
        assert_eq!(store.stats().unwrap().entries, 0);
    }

    #[test]
    fn put_replaces_atomically() {
        let store = CacheStore::open_in_memory().unwrap();
        store
            .put(&doc("pub_package:provider@6.1.2", "old", 1_000, 60_000))
            .unwrap();
        store
            .put(&doc("pub_package:provider@6.1.2", "new", 2_000, 60_000))
            .unwrap();

        let got = store.get("pub_package:provider@6.1.2", 2_500).unwrap().unwrap();
        assert_eq!(got.content, "new");
        assert_eq!(store.stats().unwrap().entries, 1);
    }

    #[test]
    fn stats_track_hit_rate() {
        let store = CacheStore::open_in_memory().unwrap();
        let d = doc("k", "v", 0, 60_000);
        store.put(&d).unwrap();

        store.get("k", 1).unwrap();
        store.get("k", 1).unwrap();
        store.get("missing", 1).unwrap();

        let stats = store.stats().unwrap();
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!(stats.total_bytes >= 1);
    }

    #[test]
    fn purge_by_predicate() {
        let store = CacheStore::open_in_memory().unwrap();
        store.put(&doc("pub_package:a@1.0.0", "a", 0, 60_000)).unwrap();
        store.put(&doc("pub_package:b@1.0.0", "b", 0, 60_000)).unwrap();
        store.put(&doc("flutter_class:widgets.Row", "r", 0, 60_000)).unwrap();

        let purged = store.purge(|k| k.starts_with("pub_package:")).unwrap();
        assert_eq!(purged, 2);
        assert_eq!(store.stats().unwrap().entries, 1);
    }

    #[test]
    fn migration_from_v1_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE documents (
                    key        TEXT PRIMARY KEY,
                    content    TEXT NOT NULL,
                    url        TEXT NOT NULL,
                    fetched_at INTEGER NOT NULL,
                    ttl_ms     INTEGER NOT NULL,
                    version    TEXT
                );
                INSERT INTO documents VALUES
                    ('flutter_class:widgets.Row', '# Row', 'https://x', 0, 9999999, NULL);
                PRAGMA user_version = 1;",
            )
            .unwrap();
        }

        let store = CacheStore::open(&path).unwrap();
        let got = store.get("flutter_class:widgets.Row", 1_000).unwrap().unwrap();
        assert_eq!(got.content, "# Row");
        assert_eq!(got.token_count, 0);
    }

    #[test]
    fn future_schema_drops_and_recreates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE documents (key TEXT PRIMARY KEY, whatever BLOB);
                PRAGMA user_version = 99;",
            )
            .unwrap();
        }

        let store = CacheStore::open(&path).unwrap();
        assert_eq!(store.stats().unwrap().entries, 0);
        store.put(&doc("k", "v", 0, 1_000)).unwrap();
    }
}
