//! Aggregation server database schema.

/// Current schema version.
pub const CURRENT_VERSION: i32 = 1;

/// Schema version tracking table.
pub const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

/// Full schema. Record payloads stay as submitted JSON; the natural keys
/// are lifted into columns so replacement and lookup never parse payloads.
pub const SCHEMA: &str = r#"
-- One robot profile per (event, team); resubmission replaces the row.
CREATE TABLE IF NOT EXISTS pit_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_key TEXT NOT NULL,
    team_number INTEGER NOT NULL,
    payload TEXT NOT NULL,
    created_at_ms INTEGER NOT NULL,
    received_at_ms INTEGER NOT NULL,
    UNIQUE(event_key, team_number)
);

-- One performance entry per (match, team); resubmission overwrites.
CREATE TABLE IF NOT EXISTS match_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_key TEXT NOT NULL,
    match_key TEXT NOT NULL,
    team_number INTEGER NOT NULL,
    payload TEXT NOT NULL,
    created_at_ms INTEGER NOT NULL,
    received_at_ms INTEGER NOT NULL,
    UNIQUE(match_key, team_number)
);

CREATE INDEX IF NOT EXISTS idx_match_records_event ON match_records(event_key);

-- Event rosters.
CREATE TABLE IF NOT EXISTS teams (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_key TEXT NOT NULL,
    team_number INTEGER NOT NULL,
    nickname TEXT,
    name TEXT,
    UNIQUE(event_key, team_number)
);

-- Event schedules, replaced wholesale on import.
CREATE TABLE IF NOT EXISTS matches_schedule (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_key TEXT NOT NULL,
    match_key TEXT NOT NULL,
    comp_level TEXT NOT NULL,
    set_number INTEGER NOT NULL DEFAULT 1,
    match_number INTEGER NOT NULL,
    time_utc TEXT,
    red1 INTEGER, red2 INTEGER, red3 INTEGER,
    blue1 INTEGER, blue2 INTEGER, blue3 INTEGER,
    field TEXT,
    UNIQUE(match_key)
);

CREATE INDEX IF NOT EXISTS idx_schedule_event ON matches_schedule(event_key);
"#;
