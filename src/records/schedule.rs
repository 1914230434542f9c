//! Official match schedule entries and lookups.

use serde::{Deserialize, Serialize};

use super::types::Station;

/// Competition level, ordered for schedule display: qualification matches
/// first, finals last, unrecognized levels at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompLevel {
    Qm,
    Qf,
    Sf,
    F,
    #[serde(other)]
    Unknown,
}

impl CompLevel {
    /// Sort rank: qm < qf < sf < f < unknown.
    pub fn rank(&self) -> u8 {
        match self {
            CompLevel::Qm => 1,
            CompLevel::Qf => 2,
            CompLevel::Sf => 3,
            CompLevel::F => 4,
            CompLevel::Unknown => 5,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "qm" => CompLevel::Qm,
            "qf" => CompLevel::Qf,
            "sf" => CompLevel::Sf,
            "f" => CompLevel::F,
            _ => CompLevel::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompLevel::Qm => "qm",
            CompLevel::Qf => "qf",
            CompLevel::Sf => "sf",
            CompLevel::F => "f",
            CompLevel::Unknown => "unknown",
        }
    }
}

/// One scheduled match. Immutable once fetched; the cache replaces the whole
/// schedule for an event on refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub match_key: String,
    pub event_key: String,
    pub comp_level: CompLevel,
    #[serde(default)]
    pub set_number: u32,
    #[serde(default)]
    pub match_number: u32,
    #[serde(default)]
    pub time_utc: Option<String>,
    #[serde(default)]
    pub red1: Option<u32>,
    #[serde(default)]
    pub red2: Option<u32>,
    #[serde(default)]
    pub red3: Option<u32>,
    #[serde(default)]
    pub blue1: Option<u32>,
    #[serde(default)]
    pub blue2: Option<u32>,
    #[serde(default)]
    pub blue3: Option<u32>,
    #[serde(default)]
    pub field: Option<String>,
}

impl ScheduleEntry {
    /// Team assigned to the given station, if any.
    pub fn station_team(&self, station: Station) -> Option<u32> {
        match station {
            Station::Red1 => self.red1,
            Station::Red2 => self.red2,
            Station::Red3 => self.red3,
            Station::Blue1 => self.blue1,
            Station::Blue2 => self.blue2,
            Station::Blue3 => self.blue3,
        }
        .filter(|n| *n > 0)
    }
}

/// Look up the team number for a qualification match and station.
pub fn qual_team(
    schedule: &[ScheduleEntry],
    qual_match_number: u32,
    station: Station,
) -> Option<u32> {
    schedule
        .iter()
        .find(|m| m.comp_level == CompLevel::Qm && m.match_number == qual_match_number)
        .and_then(|m| m.station_team(station))
}
