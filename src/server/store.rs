//! Aggregation server database over rusqlite.
//!
//! Record payloads are stored as submitted; the natural keys live in
//! columns so last-write-wins replacement never has to parse JSON. Batches
//! apply inside one transaction: either every record in the batch lands or
//! none do.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

use crate::records::{CompLevel, MatchRecord, PitRecord, ScheduleEntry, TeamMeta};
use crate::server::schema::{CURRENT_VERSION, SCHEMA, SCHEMA_VERSION_TABLE};
use crate::sync::wire::SyncBatch;

/// Server database errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(String),
}

/// Counts of records a batch applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedCounts {
    pub pit: usize,
    pub matches: usize,
}

/// Event database wrapper.
pub struct EventDb {
    conn: Connection,
}

impl EventDb {
    /// Open or create the event database at the given path.
    pub fn open(path: &Path) -> Result<Self, ServerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ServerError::IoError(e.to_string()))?;
        }
        let conn =
            Connection::open(path).map_err(|e| ServerError::ConnectionFailed(e.to_string()))?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Open an in-memory event database (for testing).
    pub fn open_in_memory() -> Result<Self, ServerError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ServerError::ConnectionFailed(e.to_string()))?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    fn initialize(&self) -> Result<(), ServerError> {
        self.conn
            .execute_batch(SCHEMA_VERSION_TABLE)
            .map_err(|e| ServerError::ConnectionFailed(e.to_string()))?;

        let version: i32 = self
            .conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if version < CURRENT_VERSION {
            self.conn
                .execute_batch(SCHEMA)
                .map_err(|e| ServerError::ConnectionFailed(e.to_string()))?;
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
                    [CURRENT_VERSION],
                )
                .map_err(|e| ServerError::ConnectionFailed(e.to_string()))?;
            tracing::info!("Event database migrated to version {}", CURRENT_VERSION);
        }

        Ok(())
    }

    /// Apply one batch atomically. Records with a blank event key, match
    /// key, or zero team number are skipped without failing the batch. A
    /// later submission for the same natural key replaces the stored row
    /// whatever its capture timestamp says; arrival order wins.
    pub fn apply_batch(
        &self,
        batch: &SyncBatch,
        received_at_ms: i64,
    ) -> Result<AppliedCounts, ServerError> {
        let mut counts = AppliedCounts::default();

        let mut pit_rows = Vec::with_capacity(batch.pit.len());
        for rec in &batch.pit {
            if rec.event_key.trim().is_empty() || rec.team_number == 0 {
                tracing::warn!("skipping pit record with blank natural key");
                continue;
            }
            let payload = serde_json::to_string(rec)
                .map_err(|e| ServerError::SerializationError(e.to_string()))?;
            pit_rows.push((rec, payload));
        }

        let mut match_rows = Vec::with_capacity(batch.match_records.len());
        for rec in &batch.match_records {
            if rec.match_key.trim().is_empty() || rec.team_number == 0 {
                tracing::warn!("skipping match record with blank natural key");
                continue;
            }
            let mut rec = rec.clone();
            rec.sanitize_metrics();
            let payload = serde_json::to_string(&rec)
                .map_err(|e| ServerError::SerializationError(e.to_string()))?;
            match_rows.push((rec, payload));
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| ServerError::QueryFailed(e.to_string()))?;

        for (rec, payload) in &pit_rows {
            tx.execute(
                "DELETE FROM pit_records WHERE event_key = ?1 AND team_number = ?2",
                params![rec.event_key, rec.team_number],
            )
            .map_err(|e| ServerError::QueryFailed(e.to_string()))?;
            tx.execute(
                "INSERT INTO pit_records (event_key, team_number, payload, created_at_ms, received_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    rec.event_key,
                    rec.team_number,
                    payload,
                    rec.created_at_ms,
                    received_at_ms
                ],
            )
            .map_err(|e| ServerError::QueryFailed(e.to_string()))?;
            counts.pit += 1;
        }

        for (rec, payload) in &match_rows {
            tx.execute(
                "INSERT INTO match_records (event_key, match_key, team_number, payload, created_at_ms, received_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(match_key, team_number) DO UPDATE SET
                     event_key = excluded.event_key,
                     payload = excluded.payload,
                     created_at_ms = excluded.created_at_ms,
                     received_at_ms = excluded.received_at_ms",
                params![
                    rec.event_key,
                    rec.match_key,
                    rec.team_number,
                    payload,
                    rec.created_at_ms,
                    received_at_ms
                ],
            )
            .map_err(|e| ServerError::QueryFailed(e.to_string()))?;
            counts.matches += 1;
        }

        tx.commit()
            .map_err(|e| ServerError::QueryFailed(e.to_string()))?;
        Ok(counts)
    }

    /// All match records for an event, matched by key prefix so playoff
    /// keys like `2025gaalb_sf1m2` are included. Rows whose metrics no
    /// longer parse keep their record with an empty metrics map; a fully
    /// unreadable payload drops the row with a warning.
    pub fn match_records_for_event(
        &self,
        event_key: &str,
    ) -> Result<Vec<MatchRecord>, ServerError> {
        let prefix = format!("{event_key}_");
        let mut stmt = self
            .conn
            .prepare(
                "SELECT payload FROM match_records
                 WHERE substr(match_key, 1, length(?1)) = ?1
                 ORDER BY match_key, team_number",
            )
            .map_err(|e| ServerError::QueryFailed(e.to_string()))?;
        let payloads: Vec<String> = stmt
            .query_map([&prefix], |row| row.get(0))
            .map_err(|e| ServerError::QueryFailed(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ServerError::QueryFailed(e.to_string()))?;

        let mut out = Vec::with_capacity(payloads.len());
        for payload in payloads {
            match decode_match_payload(&payload) {
                Some(rec) => out.push(rec),
                None => tracing::warn!("dropping unreadable match payload"),
            }
        }
        Ok(out)
    }

    /// The stored pit record for an event and team, if any.
    pub fn pit_record(
        &self,
        event_key: &str,
        team_number: u32,
    ) -> Result<Option<PitRecord>, ServerError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM pit_records WHERE event_key = ?1 AND team_number = ?2",
                params![event_key, team_number],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| ServerError::QueryFailed(e.to_string()))?;
        match payload {
            Some(p) => serde_json::from_str(&p)
                .map(Some)
                .map_err(|e| ServerError::SerializationError(e.to_string())),
            None => Ok(None),
        }
    }

    /// Roster metadata for an event, keyed by team number.
    pub fn team_metas(&self, event_key: &str) -> Result<BTreeMap<u32, TeamMeta>, ServerError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT team_number, nickname, name FROM teams
                 WHERE event_key = ?1 ORDER BY team_number",
            )
            .map_err(|e| ServerError::QueryFailed(e.to_string()))?;
        let rows = stmt
            .query_map([event_key], |row| {
                Ok(TeamMeta {
                    team_number: row.get(0)?,
                    nickname: row.get(1)?,
                    name: row.get(2)?,
                })
            })
            .map_err(|e| ServerError::QueryFailed(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ServerError::QueryFailed(e.to_string()))?;
        Ok(rows.into_iter().map(|m| (m.team_number, m)).collect())
    }

    /// Teams competing at an event: the distinct station assignments from
    /// the schedule, falling back to the full roster when no schedule has
    /// been imported yet.
    pub fn teams_for_event(&self, event_key: &str) -> Result<Vec<u32>, ServerError> {
        let schedule = self.schedule_for_event(event_key)?;
        let mut numbers: BTreeSet<u32> = BTreeSet::new();
        for entry in &schedule {
            for team in [
                entry.red1, entry.red2, entry.red3, entry.blue1, entry.blue2, entry.blue3,
            ]
            .into_iter()
            .flatten()
            {
                if team > 0 {
                    numbers.insert(team);
                }
            }
        }
        if !numbers.is_empty() {
            return Ok(numbers.into_iter().collect());
        }
        Ok(self.team_metas(event_key)?.into_keys().collect())
    }

    /// Schedule for an event in play order: comp level, then set, then
    /// match number.
    pub fn schedule_for_event(&self, event_key: &str) -> Result<Vec<ScheduleEntry>, ServerError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT match_key, comp_level, set_number, match_number, time_utc,
                        red1, red2, red3, blue1, blue2, blue3, field
                 FROM matches_schedule
                 WHERE event_key = ?1
                 ORDER BY CASE comp_level
                     WHEN 'qm' THEN 1 WHEN 'qf' THEN 2 WHEN 'sf' THEN 3 WHEN 'f' THEN 4
                     ELSE 5 END,
                     set_number, match_number",
            )
            .map_err(|e| ServerError::QueryFailed(e.to_string()))?;
        let event = event_key.to_string();
        let rows = stmt
            .query_map([event_key], move |row| {
                Ok(ScheduleEntry {
                    match_key: row.get(0)?,
                    event_key: event.clone(),
                    comp_level: CompLevel::parse(&row.get::<_, String>(1)?),
                    set_number: row.get(2)?,
                    match_number: row.get(3)?,
                    time_utc: row.get(4)?,
                    red1: row.get(5)?,
                    red2: row.get(6)?,
                    red3: row.get(7)?,
                    blue1: row.get(8)?,
                    blue2: row.get(9)?,
                    blue3: row.get(10)?,
                    field: row.get(11)?,
                })
            })
            .map_err(|e| ServerError::QueryFailed(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ServerError::QueryFailed(e.to_string()))?;
        Ok(rows)
    }

    /// Replace an event's schedule wholesale.
    pub fn replace_schedule(
        &self,
        event_key: &str,
        entries: &[ScheduleEntry],
    ) -> Result<(), ServerError> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| ServerError::QueryFailed(e.to_string()))?;
        tx.execute(
            "DELETE FROM matches_schedule WHERE event_key = ?1",
            [event_key],
        )
        .map_err(|e| ServerError::QueryFailed(e.to_string()))?;
        for entry in entries {
            tx.execute(
                "INSERT OR REPLACE INTO matches_schedule
                 (event_key, match_key, comp_level, set_number, match_number, time_utc,
                  red1, red2, red3, blue1, blue2, blue3, field)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    event_key,
                    entry.match_key,
                    entry.comp_level.as_str(),
                    entry.set_number,
                    entry.match_number,
                    entry.time_utc,
                    entry.red1,
                    entry.red2,
                    entry.red3,
                    entry.blue1,
                    entry.blue2,
                    entry.blue3,
                    entry.field,
                ],
            )
            .map_err(|e| ServerError::QueryFailed(e.to_string()))?;
        }
        tx.commit()
            .map_err(|e| ServerError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    /// Insert or update roster entries for an event.
    pub fn upsert_teams(&self, event_key: &str, teams: &[TeamMeta]) -> Result<(), ServerError> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| ServerError::QueryFailed(e.to_string()))?;
        for team in teams {
            tx.execute(
                "INSERT INTO teams (event_key, team_number, nickname, name)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(event_key, team_number) DO UPDATE SET
                     nickname = excluded.nickname,
                     name = excluded.name",
                params![event_key, team.team_number, team.nickname, team.name],
            )
            .map_err(|e| ServerError::QueryFailed(e.to_string()))?;
        }
        tx.commit()
            .map_err(|e| ServerError::QueryFailed(e.to_string()))?;
        Ok(())
    }
}

/// Decode a stored match payload. A record whose metrics have become
/// unreadable still counts as played, just with no metrics.
fn decode_match_payload(payload: &str) -> Option<MatchRecord> {
    if let Ok(rec) = serde_json::from_str::<MatchRecord>(payload) {
        return Some(rec);
    }
    let mut value: serde_json::Value = serde_json::from_str(payload).ok()?;
    if let Some(obj) = value.as_object_mut() {
        obj.insert("metrics".to_string(), serde_json::json!({}));
    }
    serde_json::from_value(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{make_qual_match_key, Alliance, Card, Drivetrain, MetricValue, Station};
    use std::collections::BTreeMap as Map;

    fn pit_record(event: &str, team: u32, created: i64) -> PitRecord {
        PitRecord {
            event_key: event.to_string(),
            team_number: team,
            drivetrain: Drivetrain::Swerve,
            weight_lb: Some(created as f64),
            dims: None,
            autos: None,
            mechanisms: None,
            notes: None,
            photos: Vec::new(),
            pending_photos: Vec::new(),
            scout_name: "casey".to_string(),
            device_id: "dev_abc".to_string(),
            schema_version: Some(2),
            created_at_ms: created,
            synced: false,
        }
    }

    fn match_record(event: &str, team: u32, n: u32, created: i64) -> MatchRecord {
        MatchRecord {
            event_key: event.to_string(),
            match_key: make_qual_match_key(event, n),
            team_number: team,
            alliance: Alliance::Red,
            station: Station::Red1,
            metrics: Map::from([(
                "teleop_coral_L1".to_string(),
                MetricValue::Number(created as f64),
            )]),
            penalties: 0,
            broke_down: false,
            defense_played: 0,
            defense_resilience: 0,
            driver_skill: 3,
            card: Card::None,
            comments: None,
            scout_name: "casey".to_string(),
            device_id: "dev_abc".to_string(),
            schema_version: Some(2),
            created_at_ms: created,
            synced: false,
        }
    }

    fn batch(pit: Vec<PitRecord>, matches: Vec<MatchRecord>) -> SyncBatch {
        SyncBatch {
            pit,
            match_records: matches,
            key: None,
        }
    }

    #[test]
    fn test_pit_resubmission_replaces_row() {
        let db = EventDb::open_in_memory().unwrap();
        db.apply_batch(&batch(vec![pit_record("2025gaalb", 1795, 100)], vec![]), 1)
            .unwrap();
        db.apply_batch(&batch(vec![pit_record("2025gaalb", 1795, 50)], vec![]), 2)
            .unwrap();

        // arrival order wins even with an older capture timestamp
        let rec = db.pit_record("2025gaalb", 1795).unwrap().unwrap();
        assert_eq!(rec.created_at_ms, 50);

        let count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM pit_records", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_match_upsert_never_duplicates() {
        let db = EventDb::open_in_memory().unwrap();
        db.apply_batch(
            &batch(vec![], vec![match_record("2025gaalb", 118, 1, 100)]),
            1,
        )
        .unwrap();
        db.apply_batch(
            &batch(vec![], vec![match_record("2025gaalb", 118, 1, 200)]),
            2,
        )
        .unwrap();

        let records = db.match_records_for_event("2025gaalb").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].created_at_ms, 200);
    }

    #[test]
    fn test_blank_natural_keys_skipped_not_fatal() {
        let db = EventDb::open_in_memory().unwrap();
        let counts = db
            .apply_batch(
                &batch(
                    vec![pit_record("", 118, 1), pit_record("2025gaalb", 0, 1)],
                    vec![match_record("2025gaalb", 254, 1, 1)],
                ),
                1,
            )
            .unwrap();
        assert_eq!(counts.pit, 0);
        assert_eq!(counts.matches, 1);
    }

    #[test]
    fn test_event_prefix_does_not_leak_other_events() {
        let db = EventDb::open_in_memory().unwrap();
        db.apply_batch(
            &batch(
                vec![],
                vec![
                    match_record("2025gaalb", 118, 1, 1),
                    match_record("2025gacar", 118, 1, 1),
                ],
            ),
            1,
        )
        .unwrap();

        let records = db.match_records_for_event("2025gaalb").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_key, "2025gaalb");
    }

    #[test]
    fn test_unreadable_metrics_still_count_as_played() {
        let db = EventDb::open_in_memory().unwrap();
        db.apply_batch(
            &batch(vec![], vec![match_record("2025gaalb", 118, 1, 1)]),
            1,
        )
        .unwrap();
        db.conn
            .execute(
                "UPDATE match_records SET payload = json_set(payload, '$.metrics', 'garbage')",
                [],
            )
            .unwrap();

        let records = db.match_records_for_event("2025gaalb").unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].metrics.is_empty());
    }

    #[test]
    fn test_schedule_replace_and_order() {
        let db = EventDb::open_in_memory().unwrap();
        let entry = |key: &str, level: CompLevel, n: u32| ScheduleEntry {
            match_key: key.to_string(),
            event_key: "2025gaalb".to_string(),
            comp_level: level,
            set_number: 1,
            match_number: n,
            time_utc: None,
            red1: Some(118),
            red2: None,
            red3: None,
            blue1: Some(1795),
            blue2: None,
            blue3: None,
            field: None,
        };

        db.replace_schedule(
            "2025gaalb",
            &[
                entry("2025gaalb_f1m1", CompLevel::F, 1),
                entry("2025gaalb_qm2", CompLevel::Qm, 2),
                entry("2025gaalb_qm1", CompLevel::Qm, 1),
                entry("2025gaalb_sf1m1", CompLevel::Sf, 1),
            ],
        )
        .unwrap();

        let schedule = db.schedule_for_event("2025gaalb").unwrap();
        let keys: Vec<&str> = schedule.iter().map(|e| e.match_key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "2025gaalb_qm1",
                "2025gaalb_qm2",
                "2025gaalb_sf1m1",
                "2025gaalb_f1m1"
            ]
        );

        // wholesale replacement
        db.replace_schedule("2025gaalb", &[entry("2025gaalb_qm9", CompLevel::Qm, 9)])
            .unwrap();
        assert_eq!(db.schedule_for_event("2025gaalb").unwrap().len(), 1);
    }

    #[test]
    fn test_teams_from_schedule_with_roster_fallback() {
        let db = EventDb::open_in_memory().unwrap();
        db.upsert_teams(
            "2025gaalb",
            &[
                TeamMeta {
                    team_number: 9999,
                    nickname: None,
                    name: None,
                },
                TeamMeta {
                    team_number: 118,
                    nickname: Some("Everybot".to_string()),
                    name: None,
                },
            ],
        )
        .unwrap();

        // no schedule yet: full roster
        assert_eq!(db.teams_for_event("2025gaalb").unwrap(), vec![118, 9999]);

        db.replace_schedule(
            "2025gaalb",
            &[ScheduleEntry {
                match_key: "2025gaalb_qm1".to_string(),
                event_key: "2025gaalb".to_string(),
                comp_level: CompLevel::Qm,
                set_number: 1,
                match_number: 1,
                time_utc: None,
                red1: Some(118),
                red2: Some(254),
                red3: None,
                blue1: None,
                blue2: None,
                blue3: None,
                field: None,
            }],
        )
        .unwrap();

        // schedule present: only scheduled teams
        assert_eq!(db.teams_for_event("2025gaalb").unwrap(), vec![118, 254]);
    }
}
