//! Local store schema definitions.

/// SQL schema for the device-local durable queue.
pub const SCHEMA: &str = r#"
-- Pit records queued for sync
CREATE TABLE IF NOT EXISTS pit_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payload TEXT NOT NULL,
    synced INTEGER NOT NULL DEFAULT 0,
    created_at_ms INTEGER NOT NULL
);

-- Captured photo payloads awaiting upload, owned by a queued pit record
CREATE TABLE IF NOT EXISTS pit_photo_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pit_id INTEGER NOT NULL REFERENCES pit_queue(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    bytes BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pit_photo_queue_pit_id ON pit_photo_queue(pit_id);

-- Match records queued for sync
CREATE TABLE IF NOT EXISTS match_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payload TEXT NOT NULL,
    synced INTEGER NOT NULL DEFAULT 0,
    created_at_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pit_queue_synced ON pit_queue(synced);
CREATE INDEX IF NOT EXISTS idx_match_queue_synced ON match_queue(synced);
"#;

/// SQL for schema version tracking (migrations)
pub const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

/// Current schema version
pub const CURRENT_VERSION: i32 = 1;
