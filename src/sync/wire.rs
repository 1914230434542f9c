//! Wire types for the sync protocol.
//!
//! The server speaks camelCase JSON for record payloads and flat `ok` /
//! `error` envelopes for every response. Unknown fields are ignored on the
//! way in so older clients survive server additions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::records::{MatchRecord, PitRecord, ScheduleEntry};

/// One sync upload: every unsynced record of both kinds, shipped in a
/// single request so the server can accept or reject them atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncBatch {
    #[serde(default)]
    pub pit: Vec<PitRecord>,
    #[serde(rename = "match", default)]
    pub match_records: Vec<MatchRecord>,
    /// API key fallback for transports that cannot set headers.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub key: Option<String>,
}

/// Server verdict for a batch. `ok: false` means nothing was applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncResponse {
    pub ok: bool,
    #[serde(rename = "pitSynced", default)]
    pub pit_synced: usize,
    #[serde(rename = "matchSynced", default)]
    pub match_synced: usize,
    #[serde(default)]
    pub error: Option<String>,
}

/// Server verdict for a single photo upload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadResponse {
    pub ok: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Roster metadata as the server sends it, keyed by team number string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMetaEntry {
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Event roster response: number list plus a metadata map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamsResponse {
    pub ok: bool,
    #[serde(default)]
    pub teams: Vec<u32>,
    #[serde(default)]
    pub meta: BTreeMap<String, TeamMetaEntry>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Event schedule response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleResponse {
    pub ok: bool,
    #[serde(default)]
    pub matches: Vec<ScheduleEntry>,
    #[serde(default)]
    pub error: Option<String>,
}
