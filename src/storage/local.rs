//! Device-local durable queue over rusqlite.
//!
//! Records are created here while offline and only leave the `unsynced`
//! state when the server confirms a batch. The store owns exactly one
//! connection; if that connection is invalidated mid-operation (an external
//! upgrade or version change can force-close it), the whole operation is
//! retried exactly once against a fresh open.

use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::records::{MatchRecord, PitRecord, RecordKind};
use crate::storage::schema::{CURRENT_VERSION, SCHEMA, SCHEMA_VERSION_TABLE};

/// Local store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Connection invalidated concurrently. Recovered by a single automatic
    /// retry; surfaces only when the retry fails the same way.
    #[error("Storage connection invalidated: {0}")]
    TransientClosed(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Record not found: {0}")]
    NotFound(i64),
}

/// A record together with its local store id.
#[derive(Debug, Clone)]
pub struct Stored<T> {
    pub id: i64,
    pub record: T,
}

/// Counts of records still awaiting sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnsyncedCounts {
    pub pit: usize,
    pub matches: usize,
}

/// Device-local persistent record queue.
pub struct LocalStore {
    path: Option<PathBuf>,
    conn: Option<Connection>,
    #[cfg(test)]
    fail_next: std::cell::Cell<u32>,
}

/// Error sentinels that identify a force-closed or invalidated connection.
/// Anything else propagates unmodified.
fn is_transient_close(err: &rusqlite::Error) -> bool {
    if let rusqlite::Error::SqliteFailure(e, _) = err {
        if matches!(
            e.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ) {
            return true;
        }
    }
    let msg = err.to_string().to_lowercase();
    msg.contains("closing")
        || msg.contains("invalid state")
        || msg.contains("transaction inactive")
        || msg.contains("aborted")
        || msg.contains("version change")
}

impl LocalStore {
    /// Open or create the queue database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let mut store = Self {
            path: Some(path.to_path_buf()),
            conn: None,
            #[cfg(test)]
            fail_next: std::cell::Cell::new(0),
        };
        store.connection()?;
        Ok(store)
    }

    /// Open an in-memory queue (for testing). Transient-close recovery is
    /// only meaningful for file-backed stores; an in-memory reopen starts
    /// empty.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut store = Self {
            path: None,
            conn: None,
            #[cfg(test)]
            fail_next: std::cell::Cell::new(0),
        };
        store.connection()?;
        Ok(store)
    }

    fn connection(&mut self) -> Result<&Connection, StoreError> {
        if self.conn.is_none() {
            let conn = match &self.path {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)
                            .map_err(|e| StoreError::IoError(e.to_string()))?;
                    }
                    Connection::open(path)
                        .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?
                }
                None => Connection::open_in_memory()
                    .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?,
            };
            Self::initialize(&conn)?;
            self.conn = Some(conn);
        }
        self.conn
            .as_ref()
            .ok_or_else(|| StoreError::ConnectionFailed("connection unavailable".to_string()))
    }

    fn initialize(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;
        conn.execute_batch(SCHEMA_VERSION_TABLE)
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        let version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if version < CURRENT_VERSION {
            conn.execute_batch(SCHEMA)
                .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;
            conn.execute(
                "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
                [CURRENT_VERSION],
            )
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;
            tracing::info!("Local store migrated to version {}", CURRENT_VERSION);
        }

        Ok(())
    }

    fn close(&mut self) {
        self.conn = None;
    }

    /// Run one operation, retrying exactly once on a transient connection
    /// loss against a freshly reopened connection.
    fn run<T, F>(&mut self, op: F) -> Result<T, StoreError>
    where
        F: Fn(&Connection) -> Result<T, rusqlite::Error>,
    {
        match self.attempt(&op) {
            Err(StoreError::TransientClosed(msg)) => {
                tracing::warn!("local store connection invalidated ({msg}); retrying once");
                self.close();
                self.attempt(&op)
            }
            other => other,
        }
    }

    fn attempt<T>(
        &mut self,
        op: &dyn Fn(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, StoreError> {
        #[cfg(test)]
        if self.fail_next.get() > 0 {
            self.fail_next.set(self.fail_next.get() - 1);
            self.close();
            return Err(StoreError::TransientClosed(
                "injected: database connection is closing".to_string(),
            ));
        }

        let conn = self.connection()?;
        op(conn).map_err(|e| {
            if is_transient_close(&e) {
                StoreError::TransientClosed(e.to_string())
            } else {
                StoreError::QueryFailed(e.to_string())
            }
        })
    }

    #[cfg(test)]
    fn inject_transient_failures(&self, count: u32) {
        self.fail_next.set(count);
    }

    // ========== Pit queue ==========

    /// Insert a pit record; returns its local id once durably committed.
    pub fn put_pit(&mut self, record: &PitRecord) -> Result<i64, StoreError> {
        let payload = serde_json::to_string(record)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        let pending: Vec<(String, Vec<u8>)> = record
            .pending_photos
            .iter()
            .map(|p| (p.name.clone(), p.bytes.clone()))
            .collect();
        let synced = record.synced;
        let created = record.created_at_ms;

        self.run(move |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO pit_queue (payload, synced, created_at_ms) VALUES (?1, ?2, ?3)",
                params![payload, synced, created],
            )?;
            let id = tx.last_insert_rowid();
            for (name, bytes) in &pending {
                tx.execute(
                    "INSERT INTO pit_photo_queue (pit_id, name, bytes) VALUES (?1, ?2, ?3)",
                    params![id, name, bytes],
                )?;
            }
            tx.commit()?;
            Ok(id)
        })
    }

    /// Overwrite an existing pit record (payload and pending photos) in place.
    pub fn update_pit(&mut self, id: i64, record: &PitRecord) -> Result<(), StoreError> {
        let payload = serde_json::to_string(record)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        let pending: Vec<(String, Vec<u8>)> = record
            .pending_photos
            .iter()
            .map(|p| (p.name.clone(), p.bytes.clone()))
            .collect();
        let synced = record.synced;
        let created = record.created_at_ms;

        let changed = self.run(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let changed = tx.execute(
                "UPDATE pit_queue SET payload = ?2, synced = ?3, created_at_ms = ?4 WHERE id = ?1",
                params![id, payload, synced, created],
            )?;
            tx.execute("DELETE FROM pit_photo_queue WHERE pit_id = ?1", params![id])?;
            for (name, bytes) in &pending {
                tx.execute(
                    "INSERT INTO pit_photo_queue (pit_id, name, bytes) VALUES (?1, ?2, ?3)",
                    params![id, name, bytes],
                )?;
            }
            tx.commit()?;
            Ok(changed)
        })?;

        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// Every pit record in the queue, with pending photo payloads attached.
    pub fn get_all_pit(&mut self) -> Result<Vec<Stored<PitRecord>>, StoreError> {
        let rows = self.run(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, payload, synced FROM pit_queue ORDER BY id")?;
            let mut rows: Vec<(i64, String, bool, Vec<(String, Vec<u8>)>)> = Vec::new();
            let base = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut photo_stmt = conn.prepare(
                "SELECT name, bytes FROM pit_photo_queue WHERE pit_id = ?1 ORDER BY id",
            )?;
            for (id, payload, synced) in base {
                let photos = photo_stmt
                    .query_map([id], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                rows.push((id, payload, synced, photos));
            }
            Ok(rows)
        })?;

        let mut out = Vec::with_capacity(rows.len());
        for (id, payload, synced, photos) in rows {
            let mut record: PitRecord = serde_json::from_str(&payload)
                .map_err(|e| StoreError::SerializationError(e.to_string()))?;
            // The synced column is authoritative; mark_synced never rewrites
            // the payload.
            record.synced = synced;
            record.pending_photos = photos
                .into_iter()
                .map(|(name, bytes)| crate::records::PendingPhoto { name, bytes })
                .collect();
            out.push(Stored { id, record });
        }
        Ok(out)
    }

    // ========== Match queue ==========

    /// Insert a match record; returns its local id once durably committed.
    pub fn put_match(&mut self, record: &MatchRecord) -> Result<i64, StoreError> {
        let payload = serde_json::to_string(record)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        let synced = record.synced;
        let created = record.created_at_ms;

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO match_queue (payload, synced, created_at_ms) VALUES (?1, ?2, ?3)",
                params![payload, synced, created],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Overwrite an existing match record in place.
    pub fn update_match(&mut self, id: i64, record: &MatchRecord) -> Result<(), StoreError> {
        let payload = serde_json::to_string(record)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        let synced = record.synced;
        let created = record.created_at_ms;

        let changed = self.run(move |conn| {
            conn.execute(
                "UPDATE match_queue SET payload = ?2, synced = ?3, created_at_ms = ?4 WHERE id = ?1",
                params![id, payload, synced, created],
            )
        })?;

        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// Every match record in the queue.
    pub fn get_all_match(&mut self) -> Result<Vec<Stored<MatchRecord>>, StoreError> {
        let rows = self.run(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, payload, synced FROM match_queue ORDER BY id")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let mut out = Vec::with_capacity(rows.len());
        for (id, payload, synced) in rows {
            let mut record: MatchRecord = serde_json::from_str(&payload)
                .map_err(|e| StoreError::SerializationError(e.to_string()))?;
            record.synced = synced;
            out.push(Stored { id, record });
        }
        Ok(out)
    }

    // ========== Shared ==========

    /// Pending (unsynced) record tallies for both kinds.
    pub fn unsynced_counts(&mut self) -> Result<UnsyncedCounts, StoreError> {
        self.run(|conn| {
            let pit: usize = conn.query_row(
                "SELECT COUNT(*) FROM pit_queue WHERE synced = 0",
                [],
                |row| row.get(0),
            )?;
            let matches: usize = conn.query_row(
                "SELECT COUNT(*) FROM match_queue WHERE synced = 0",
                [],
                |row| row.get(0),
            )?;
            Ok(UnsyncedCounts { pit, matches })
        })
    }

    /// Flip the synced flag for the given local ids, durably, touching no
    /// other field. Synced is terminal: sync never resurrects or deletes.
    pub fn mark_synced(&mut self, kind: RecordKind, ids: &[i64]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let table = match kind {
            RecordKind::Pit => "pit_queue",
            RecordKind::Match => "match_queue",
        };
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("UPDATE {table} SET synced = 1 WHERE id IN ({placeholders})");
        let ids = ids.to_vec();

        self.run(move |conn| {
            conn.execute(&sql, rusqlite::params_from_iter(ids.iter()))?;
            Ok(())
        })
    }
}
