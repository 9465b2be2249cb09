//! SQLite-backed persistence collaborator.
//!
//! One connection behind a mutex. Every public method takes the lock for its
//! whole duration, which is what makes the get-or-create upserts atomic for
//! all tasks sharing the store.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::schema::SCHEMA_SQL;
use crate::types::*;
use chatscribe_core::{normalize_handle, Error, Identity, Persistence, Platform, Result, Target};

pub const IN_MEMORY: &str = ":memory:";

/// SQLite store for targets, identities, chat messages and viewer appearances.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: String,
}

impl SqliteStore {
    /// Open or create the store at `db_path` (`:memory:` for a private in-memory database).
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = if db_path == IN_MEMORY {
            Connection::open_in_memory()
        } else {
            if let Some(parent) = Path::new(db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| Error::Storage(e.to_string()))?;
                }
            }
            Connection::open(db_path)
        }
        .map_err(|e| Error::Database(e.to_string()))?;

        Self::configure(&conn, db_path == IN_MEMORY)?;
        Self::init_schema(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: db_path.to_string(),
        };

        let stats = store.stats()?;
        info!(
            "SqliteStore initialized: {} targets, {} identities, {} messages, path={}",
            stats.targets, stats.identities, stats.chat_messages, store.db_path
        );
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(IN_MEMORY)
    }

    fn configure(conn: &Connection, in_memory: bool) -> Result<()> {
        let pragmas = if in_memory {
            "PRAGMA foreign_keys = ON;"
        } else {
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = NORMAL;"
        };
        conn.execute_batch(pragmas)
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;
        Ok(())
    }

    /// Close the underlying connection, surfacing any error.
    pub fn close(self) -> Result<()> {
        debug!("Closing store at {}", self.db_path);
        self.conn
            .into_inner()
            .close()
            .map_err(|(_, e)| Error::Database(e.to_string()))
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    // ---------------------------------------------------------------
    // Upserts
    // ---------------------------------------------------------------

    fn upsert_identity_locked(conn: &Connection, handle: &str) -> Result<Identity> {
        let handle = normalize_handle(handle);
        if handle.is_empty() {
            return Err(Error::Storage("identity handle is empty".into()));
        }
        conn.prepare_cached(
            "INSERT INTO identities (handle, first_seen) VALUES (?1, ?2)
             ON CONFLICT(handle) DO NOTHING",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![handle, Utc::now().timestamp_millis()])
        .map_err(|e| Error::Database(e.to_string()))?;

        conn.prepare_cached("SELECT id, handle FROM identities WHERE handle = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![handle], |row| {
                Ok(Identity {
                    id: row.get(0)?,
                    handle: row.get(1)?,
                })
            })
            .map_err(|e| Error::Database(e.to_string()))
    }

    // ---------------------------------------------------------------
    // Read paths
    // ---------------------------------------------------------------

    /// Look up a target by handle, on any platform.
    pub fn find_target(&self, handle: &str) -> Result<Option<Target>> {
        let handle = normalize_handle(handle);
        let conn = self.conn.lock();
        let row = conn
            .prepare_cached(
                "SELECT t.id, i.id, i.handle, t.platform
                 FROM targets t JOIN identities i ON i.id = t.identity_id
                 WHERE i.handle = ?1
                 ORDER BY t.id LIMIT 1",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![handle], |row| {
                let platform: String = row.get(3)?;
                Ok(Target {
                    id: row.get(0)?,
                    identity: Identity {
                        id: row.get(1)?,
                        handle: row.get(2)?,
                    },
                    platform: Platform::from_name(&platform).unwrap_or_default(),
                })
            })
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row)
    }

    /// All stored targets, in creation order.
    pub fn list_targets(&self) -> Result<Vec<TargetRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT t.id, i.handle, t.platform
                 FROM targets t JOIN identities i ON i.id = t.identity_id
                 ORDER BY t.id",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(TargetRow {
                    id: row.get(0)?,
                    handle: row.get(1)?,
                    platform: row.get(2)?,
                })
            })
            .map_err(|e| Error::Database(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Chat of one target, in insertion order.
    pub fn chat_for_target(&self, handle: &str) -> Result<Vec<ChatEntry>> {
        let target = self
            .find_target(handle)?
            .ok_or_else(|| Error::NotFound(format!("target {}", normalize_handle(handle))))?;
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT m.id, ti.handle, a.handle, m.body, m.observed_at
                 FROM chat_messages m
                 JOIN targets t ON t.id = m.target_id
                 JOIN identities ti ON ti.id = t.identity_id
                 JOIN identities a ON a.id = m.identity_id
                 WHERE m.target_id = ?1
                 ORDER BY m.id",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![target.id], Self::row_to_chat_entry)
            .map_err(|e| Error::Database(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Every stored chat message across all targets, in insertion order.
    pub fn all_chat(&self) -> Result<Vec<ChatEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT m.id, ti.handle, a.handle, m.body, m.observed_at
                 FROM chat_messages m
                 JOIN targets t ON t.id = m.target_id
                 JOIN identities ti ON ti.id = t.identity_id
                 JOIN identities a ON a.id = m.identity_id
                 ORDER BY m.id",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], Self::row_to_chat_entry)
            .map_err(|e| Error::Database(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Distinct snapshot timestamps of a target, oldest first.
    pub fn snapshot_times(&self, target: &Target) -> Result<Vec<DateTime<Utc>>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT DISTINCT observed_at FROM viewer_appearances
                 WHERE target_id = ?1 ORDER BY observed_at",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![target.id], |row| row.get::<_, i64>(0))
            .map_err(|e| Error::Database(e.to_string()))?;
        let millis = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(millis.into_iter().map(from_millis).collect())
    }

    /// Handles seen in one snapshot, in the order they were recorded.
    pub fn snapshot_members(&self, target: &Target, at: DateTime<Utc>) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT i.handle FROM viewer_appearances v
                 JOIN identities i ON i.id = v.identity_id
                 WHERE v.target_id = ?1 AND v.observed_at = ?2
                 ORDER BY v.id",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![target.id, at.timestamp_millis()], |row| row.get(0))
            .map_err(|e| Error::Database(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<String>>>()
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock();
        let count = |table: &str| -> Result<i64> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                .map_err(|e| Error::Database(e.to_string()))
        };
        Ok(StoreStats {
            identities: count("identities")?,
            targets: count("targets")?,
            chat_messages: count("chat_messages")?,
            viewer_appearances: count("viewer_appearances")?,
            db_path: self.db_path.clone(),
        })
    }

    // ---------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------

    fn row_to_chat_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatEntry> {
        Ok(ChatEntry {
            id: row.get(0)?,
            target: row.get(1)?,
            author: row.get(2)?,
            body: row.get(3)?,
            observed_at: from_millis(row.get(4)?),
        })
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

impl Persistence for SqliteStore {
    fn upsert_identity(&self, handle: &str) -> Result<Identity> {
        let conn = self.conn.lock();
        Self::upsert_identity_locked(&conn, handle)
    }

    fn upsert_target(&self, handle: &str, platform: Platform) -> Result<Target> {
        let conn = self.conn.lock();
        let identity = Self::upsert_identity_locked(&conn, handle)?;
        conn.prepare_cached(
            "INSERT INTO targets (identity_id, platform, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(identity_id, platform) DO NOTHING",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![
            identity.id,
            platform.name(),
            Utc::now().timestamp_millis()
        ])
        .map_err(|e| Error::Database(e.to_string()))?;

        let id: i64 = conn
            .prepare_cached("SELECT id FROM targets WHERE identity_id = ?1 AND platform = ?2")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![identity.id, platform.name()], |row| row.get(0))
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(Target {
            id,
            identity,
            platform,
        })
    }

    fn append_chat_record(
        &self,
        target: &Target,
        identity: &Identity,
        body: &str,
        at: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn.lock();
        let id = conn.prepare_cached(
            "INSERT INTO chat_messages (target_id, identity_id, body, observed_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .insert(params![target.id, identity.id, body, at.timestamp_millis()])
        .map_err(|e| Error::Storage(e.to_string()));
        id
    }

    fn append_viewer_snapshot(
        &self,
        identity: &Identity,
        target: &Target,
        at: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn.lock();
        let id = conn.prepare_cached(
            "INSERT INTO viewer_appearances (target_id, identity_id, observed_at)
             VALUES (?1, ?2, ?3)",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .insert(params![target.id, identity.id, at.timestamp_millis()])
        .map_err(|e| Error::Storage(e.to_string()));
        id
    }
}
