//! Pit and match record types.
//!
//! These are the two record kinds the local store queues and the sync
//! engine ships to the aggregation server. Field names on the wire follow
//! the server's camelCase JSON schema.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Maximum photos per pit record, uploaded URLs and pending payloads combined.
pub const MAX_PIT_PHOTOS: usize = 3;

/// Record kinds held by the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Pit,
    Match,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Pit => "pit",
            RecordKind::Match => "match",
        }
    }
}

/// Robot drivetrain classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Drivetrain {
    Swerve,
    Tank,
    Mecanum,
    WestCoast,
    Other,
}

/// Alliance color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alliance {
    Red,
    Blue,
}

/// One of the six robot stations in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Station {
    Red1,
    Red2,
    Red3,
    Blue1,
    Blue2,
    Blue3,
}

impl Station {
    pub fn alliance(&self) -> Alliance {
        match self {
            Station::Red1 | Station::Red2 | Station::Red3 => Alliance::Red,
            Station::Blue1 | Station::Blue2 | Station::Blue3 => Alliance::Blue,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Station::Red1 => "red1",
            Station::Red2 => "red2",
            Station::Red3 => "red3",
            Station::Blue1 => "blue1",
            Station::Blue2 => "blue2",
            Station::Blue3 => "blue3",
        }
    }
}

/// Card status assessed during a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Card {
    #[default]
    None,
    Yellow,
    Red,
}

/// Robot dimensions in inches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub h: f64,
    pub w: f64,
    pub l: f64,
}

/// A season-specific metric value. Metrics maps carry arbitrary keys whose
/// value kind is declared by the active game config, so the container is a
/// tagged union rather than a fixed struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl MetricValue {
    /// Numeric view: numbers as-is, booleans coerced to 0/1.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            MetricValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            MetricValue::Text(_) => None,
        }
    }

    /// Categorical view: non-empty strings only.
    pub fn as_category(&self) -> Option<&str> {
        match self {
            MetricValue::Text(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }
}

/// A captured photo waiting to be compressed and uploaded. Never serialized
/// onto the wire; the local store keeps payloads in a separate blob table.
#[derive(Debug, Clone, Default)]
pub struct PendingPhoto {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Errors from record-level validation.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("photo limit reached ({0} per pit record)")]
    PhotoLimit(usize),
}

/// One robot profile per (event, team), captured during a pit visit.
///
/// A later submission for the same event and team fully replaces the prior
/// row server-side; pit records are superseded, never merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitRecord {
    pub event_key: String,
    pub team_number: u32,
    pub drivetrain: Drivetrain,
    #[serde(default)]
    pub weight_lb: Option<f64>,
    #[serde(default)]
    pub dims: Option<Dimensions>,
    #[serde(default)]
    pub autos: Option<String>,
    #[serde(default)]
    pub mechanisms: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Uploaded photo reference URLs, capped at [`MAX_PIT_PHOTOS`].
    #[serde(default)]
    pub photos: Vec<String>,
    /// Captured payloads not yet uploaded. Local-only.
    #[serde(skip)]
    pub pending_photos: Vec<PendingPhoto>,
    pub scout_name: String,
    pub device_id: String,
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(rename = "createdAt")]
    pub created_at_ms: i64,
    #[serde(default)]
    pub synced: bool,
}

impl PitRecord {
    /// Queue a captured photo. Rejected once uploaded URLs plus pending
    /// payloads reach the cap; this is the single authoritative counting
    /// rule, enforced at capture time.
    pub fn queue_photo(&mut self, name: String, bytes: Vec<u8>) -> Result<(), RecordError> {
        if self.photos.len() + self.pending_photos.len() >= MAX_PIT_PHOTOS {
            return Err(RecordError::PhotoLimit(MAX_PIT_PHOTOS));
        }
        self.pending_photos.push(PendingPhoto { name, bytes });
        Ok(())
    }

    /// Remaining photo slots under the cap.
    pub fn photo_slots_left(&self) -> usize {
        MAX_PIT_PHOTOS.saturating_sub(self.photos.len() + self.pending_photos.len())
    }
}

/// One performance entry per (match, team).
///
/// Resubmission for the same natural key overwrites the existing server row
/// entirely; it never duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub event_key: String,
    pub match_key: String,
    pub team_number: u32,
    pub alliance: Alliance,
    pub station: Station,
    /// Season-specific metrics. Must never carry a duplicate of the
    /// comments field; see [`MatchRecord::sanitize_metrics`].
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricValue>,
    #[serde(default)]
    pub penalties: i32,
    #[serde(default)]
    pub broke_down: bool,
    /// Defense played, 0-5.
    #[serde(default)]
    pub defense_played: i32,
    /// How well the robot held up against defense, 0-5.
    #[serde(default)]
    pub defense_resilience: i32,
    /// Driver skill, 1-5.
    #[serde(default)]
    pub driver_skill: i32,
    #[serde(default)]
    pub card: Card,
    #[serde(default)]
    pub comments: Option<String>,
    pub scout_name: String,
    pub device_id: String,
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(rename = "createdAt")]
    pub created_at_ms: i64,
    #[serde(default)]
    pub synced: bool,
}

impl MatchRecord {
    /// Strip a `notes` key that form code may have copied into the metrics
    /// map; the comments field is the only home for free text.
    pub fn sanitize_metrics(&mut self) {
        self.metrics.remove("notes");
    }
}

/// Reference roster entry, replaced wholesale on refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMeta {
    pub team_number: u32,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Compose the canonical qualification match key, e.g. `2025gaalb_qm12`.
pub fn make_qual_match_key(event_key: &str, match_number: u32) -> String {
    format!("{}_qm{}", event_key, match_number.max(1))
}
