//! Reference cache for rosters and schedules.
//!
//! Holds the last-fetched team roster and match schedule keyed by event.
//! There is no TTL; callers decide when to refresh. A refresh replaces the
//! cache for that event only, atomically (write-temp-then-rename), so a
//! stale-but-present cache is always readable offline.

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::records::{ScheduleEntry, TeamMeta};

/// Reference cache errors. Reads never fail: absent or corrupt cache files
/// yield empty results.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}

/// Per-event reference cache rooted at a data directory.
pub struct ReferenceCache {
    dir: PathBuf,
}

impl ReferenceCache {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// Cache rooted at the default application data directory.
    pub fn default_location() -> Self {
        Self::new(&crate::settings::data_dir().join("cache"))
    }

    fn teams_path(&self, event_key: &str) -> PathBuf {
        self.dir.join(format!("teams_{}.json", safe_key(event_key)))
    }

    fn schedule_path(&self, event_key: &str) -> PathBuf {
        self.dir
            .join(format!("schedule_{}.json", safe_key(event_key)))
    }

    /// Last cached roster for the event, or empty when absent or unreadable.
    pub fn load_teams(&self, event_key: &str) -> BTreeMap<u32, TeamMeta> {
        read_json(&self.teams_path(event_key)).unwrap_or_default()
    }

    /// Last cached schedule for the event, or empty when absent or
    /// unreadable.
    pub fn load_schedule(&self, event_key: &str) -> Vec<ScheduleEntry> {
        read_json(&self.schedule_path(event_key)).unwrap_or_default()
    }

    /// Replace the roster cache for this event only.
    pub fn store_teams(
        &self,
        event_key: &str,
        teams: &BTreeMap<u32, TeamMeta>,
    ) -> Result<(), CacheError> {
        write_json_atomic(&self.teams_path(event_key), teams)
    }

    /// Replace the schedule cache for this event only.
    pub fn store_schedule(
        &self,
        event_key: &str,
        schedule: &[ScheduleEntry],
    ) -> Result<(), CacheError> {
        write_json_atomic(&self.schedule_path(event_key), &schedule)
    }
}

fn safe_key(event_key: &str) -> String {
    event_key
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CacheError::IoError(e.to_string()))?;
    }
    let content =
        serde_json::to_string(value).map_err(|e| CacheError::SerializeError(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content).map_err(|e| CacheError::IoError(e.to_string()))?;
    std::fs::rename(&tmp, path).map_err(|e| CacheError::IoError(e.to_string()))?;
    Ok(())
}

/// Build a canonical roster map from any of the shapes the server has
/// historically produced:
///
/// - `{teams: [...], meta: {"118": {nickname, name}, ...}}` (current)
/// - `{teams: [118, 254, ...]}` (bare number list)
/// - `{"118": {nickname, name}, ...}` (map keyed by team number)
/// - `[{team_number, nickname, name}, ...]` (list of team objects)
///
/// Missing nickname/name fields are null-filled. Junk yields an empty map,
/// never an error.
pub fn teams_meta_from_value(raw: &Value) -> BTreeMap<u32, TeamMeta> {
    let mut dict = BTreeMap::new();

    if let Some(meta) = raw.get("meta").and_then(Value::as_object) {
        if !meta.is_empty() {
            for (k, v) in meta {
                if let Ok(num) = k.parse::<u32>() {
                    if num > 0 {
                        dict.insert(num, meta_entry(num, v));
                    }
                }
            }
            return dict;
        }
    }

    if let Some(teams) = raw.get("teams").and_then(Value::as_array) {
        for n in teams {
            if let Some(num) = as_team_number(n) {
                dict.insert(
                    num,
                    TeamMeta {
                        team_number: num,
                        nickname: None,
                        name: None,
                    },
                );
            }
        }
        return dict;
    }

    if let Some(obj) = raw.as_object() {
        if !obj.is_empty() && obj.keys().all(|k| k.chars().all(|c| c.is_ascii_digit())) {
            for (k, v) in obj {
                if let Ok(num) = k.parse::<u32>() {
                    if num > 0 {
                        dict.insert(num, meta_entry(num, v));
                    }
                }
            }
            return dict;
        }
    }

    if let Some(arr) = raw.as_array() {
        for item in arr {
            let num = item
                .get("team_number")
                .or_else(|| item.get("teamNumber"))
                .and_then(as_team_number);
            if let Some(num) = num {
                dict.insert(num, meta_entry(num, item));
            }
        }
        return dict;
    }

    dict
}

fn as_team_number(v: &Value) -> Option<u32> {
    match v {
        Value::Number(n) => n.as_u64().filter(|n| *n > 0).map(|n| n as u32),
        Value::String(s) => s.parse::<u32>().ok().filter(|n| *n > 0),
        _ => None,
    }
}

fn meta_entry(num: u32, v: &Value) -> TeamMeta {
    TeamMeta {
        team_number: num,
        nickname: v
            .get("nickname")
            .and_then(Value::as_str)
            .map(str::to_string),
        name: v.get("name").and_then(Value::as_str).map(str::to_string),
    }
}
