//! Record types for scouting data collection.

pub mod schedule;
pub mod types;

pub use schedule::{qual_team, CompLevel, ScheduleEntry};
pub use types::{
    make_qual_match_key, Alliance, Card, Dimensions, Drivetrain, MatchRecord, MetricValue,
    PendingPhoto, PitRecord, RecordError, RecordKind, Station, TeamMeta, MAX_PIT_PHOTOS,
};
