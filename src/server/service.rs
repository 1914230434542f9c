//! Event service: the server's operation layer over [`EventDb`].
//!
//! Batch submission authenticates with a shared API key compared in
//! constant time, and answers in the flat `ok` / `error` envelope the
//! clients expect. Read endpoints are unauthenticated, matching the
//! dashboard's public surface.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::aggregation::{summarize, EventSummary};
use crate::games;
use crate::records::{MatchRecord, PitRecord};
use crate::server::store::{EventDb, ServerError};
use crate::sync::wire::{ScheduleResponse, SyncBatch, SyncResponse, TeamMetaEntry, TeamsResponse};

/// How many of a team's matches the drill-down returns.
const TEAM_RECENT_LIMIT: usize = 10;

/// One team's drill-down: roster names, latest pit record, most recent
/// match history, and discipline averages over every match played.
#[derive(Debug, Clone, Serialize)]
pub struct TeamDetail {
    pub team_number: u32,
    pub nickname: Option<String>,
    pub name: Option<String>,
    pub pit: Option<PitRecord>,
    pub recent_matches: Vec<MatchRecord>,
    pub played: usize,
    pub penalties_avg: f64,
    pub driver_skill_avg: f64,
}

/// The aggregation server's operations.
pub struct EventService {
    db: EventDb,
    api_key: String,
}

impl EventService {
    pub fn new(db: EventDb, api_key: &str) -> Self {
        Self {
            db,
            api_key: api_key.to_string(),
        }
    }

    pub fn db(&self) -> &EventDb {
        &self.db
    }

    /// Constant-time key comparison; timing reveals nothing about how much
    /// of the key matched.
    pub fn verify_key(&self, presented: &str) -> bool {
        let expected = self.api_key.as_bytes();
        let presented = presented.as_bytes();
        let mut diff = expected.len() ^ presented.len();
        for i in 0..expected.len() {
            let p = presented.get(i).copied().unwrap_or(0);
            diff |= (expected[i] ^ p) as usize;
        }
        diff == 0
    }

    /// Apply one record batch. Failures never partially apply: an invalid
    /// key or a storage error leaves the database untouched and reports
    /// `ok: false`.
    pub fn apply_batch(&self, presented_key: &str, batch: &SyncBatch) -> SyncResponse {
        if !self.verify_key(presented_key) {
            tracing::warn!("batch refused: invalid api key");
            return SyncResponse {
                ok: false,
                error: Some("invalid api key".to_string()),
                ..Default::default()
            };
        }

        let received_at_ms = chrono::Utc::now().timestamp_millis();
        match self.db.apply_batch(batch, received_at_ms) {
            Ok(counts) => {
                tracing::info!(pit = counts.pit, matches = counts.matches, "batch applied");
                SyncResponse {
                    ok: true,
                    pit_synced: counts.pit,
                    match_synced: counts.matches,
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!("batch failed: {e}");
                SyncResponse {
                    ok: false,
                    error: Some(e.to_string()),
                    ..Default::default()
                }
            }
        }
    }

    /// Event roster: team numbers plus whatever metadata the roster table
    /// holds.
    pub fn event_teams(&self, event_key: &str) -> Result<TeamsResponse, ServerError> {
        let teams = self.db.teams_for_event(event_key)?;
        let metas = self.db.team_metas(event_key)?;
        let meta: BTreeMap<String, TeamMetaEntry> = teams
            .iter()
            .filter_map(|n| {
                metas.get(n).map(|m| {
                    (
                        n.to_string(),
                        TeamMetaEntry {
                            nickname: m.nickname.clone(),
                            name: m.name.clone(),
                        },
                    )
                })
            })
            .collect();
        Ok(TeamsResponse {
            ok: true,
            teams,
            meta,
            error: None,
        })
    }

    /// Event schedule in play order.
    pub fn schedule(&self, event_key: &str) -> Result<ScheduleResponse, ServerError> {
        Ok(ScheduleResponse {
            ok: true,
            matches: self.db.schedule_for_event(event_key)?,
            error: None,
        })
    }

    /// One team's drill-down page: meta names, the stored pit record, the
    /// newest matches first (capped), and averages over all of them.
    pub fn team_detail(
        &self,
        event_key: &str,
        team_number: u32,
    ) -> Result<TeamDetail, ServerError> {
        let metas = self.db.team_metas(event_key)?;
        let (nickname, name) = metas
            .get(&team_number)
            .map(|m| (m.nickname.clone(), m.name.clone()))
            .unwrap_or_default();
        let pit = self.db.pit_record(event_key, team_number)?;

        let mut matches: Vec<MatchRecord> = self
            .db
            .match_records_for_event(event_key)?
            .into_iter()
            .filter(|m| m.team_number == team_number)
            .collect();
        matches.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));

        let played = matches.len();
        let avg = |sum: f64| {
            if played == 0 {
                0.0
            } else {
                (sum / played as f64 * 100.0).round() / 100.0
            }
        };
        let penalties_avg = avg(matches.iter().map(|m| m.penalties as f64).sum());
        let driver_skill_avg = avg(matches.iter().map(|m| m.driver_skill as f64).sum());
        matches.truncate(TEAM_RECENT_LIMIT);

        Ok(TeamDetail {
            team_number,
            nickname,
            name,
            pit,
            recent_matches: matches,
            played,
            penalties_avg,
            driver_skill_avg,
        })
    }

    /// Full event rollup: per-team summaries ranked by the season's primary
    /// metric, event stats, and the recent feed.
    pub fn summary(&self, event_key: &str) -> Result<EventSummary, ServerError> {
        let game = games::resolve_by_event_key(event_key);
        let records = self.db.match_records_for_event(event_key)?;
        let meta = self.db.team_metas(event_key)?;
        Ok(summarize(event_key, &records, &meta, &game))
    }
}
