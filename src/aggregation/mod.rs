//! Aggregation engine: per-team rollups over match records.
//!
//! Numbers are summed and averaged, booleans count as 0/1, and categorical
//! selections become percentage frequency tables. Metric keys pass through
//! the active game's alias table first, so records written under historical
//! key spellings merge into one canonical column. Averages round to two
//! decimals, percentages to one.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::games::GameConfig;
use crate::records::{Card, MatchRecord, TeamMeta};

/// How many recent entries the summary carries.
pub const RECENT_LIMIT: usize = 50;

/// One team's rollup across its matches.
#[derive(Debug, Clone, Serialize)]
pub struct TeamSummary {
    pub team_number: u32,
    pub nickname: Option<String>,
    pub name: Option<String>,
    /// Matches with a record for this team.
    pub played: usize,
    /// Per-metric averages over played matches, two decimals.
    pub avg: BTreeMap<String, f64>,
    /// Per-metric totals.
    pub sum: BTreeMap<String, f64>,
    /// Categorical metrics: canonical key to option to percent of played.
    pub select_pct: BTreeMap<String, BTreeMap<String, f64>>,
    /// Total of the game's primary metric family, the ranking key.
    pub primary_sum: f64,
    pub penalties_avg: f64,
    pub driver_skill_avg: f64,
    pub defense_played_avg: f64,
    pub defense_resilience_avg: f64,
    pub broke_down_pct: f64,
    /// Percent of played matches with a yellow or red card.
    pub card_pct: BTreeMap<String, f64>,
}

/// Event-wide totals and observed metric columns.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SummaryStats {
    pub teams: usize,
    pub matches: usize,
    /// Canonical numeric metric keys seen anywhere in the event.
    pub metric_keys: Vec<String>,
    /// Canonical categorical metric keys seen anywhere in the event.
    pub select_keys: Vec<String>,
}

/// One row of the recent-activity feed.
#[derive(Debug, Clone, Serialize)]
pub struct RecentEntry {
    pub match_key: String,
    pub team_number: u32,
    pub alliance: crate::records::Alliance,
    pub station: crate::records::Station,
    pub scout_name: String,
    pub created_at_ms: i64,
}

/// The full event summary: teams ranked by the primary metric, plus stats
/// and a recent feed.
#[derive(Debug, Clone, Serialize)]
pub struct EventSummary {
    pub event_key: String,
    pub game_id: &'static str,
    pub stats: SummaryStats,
    pub teams: Vec<TeamSummary>,
    pub recent: Vec<RecentEntry>,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[derive(Default)]
struct TeamAccum {
    played: usize,
    sums: BTreeMap<String, f64>,
    cats: BTreeMap<String, BTreeMap<String, usize>>,
    penalties: i64,
    driver_skill: i64,
    defense_played: i64,
    defense_resilience: i64,
    broke_down: usize,
    yellow: usize,
    red: usize,
}

/// Roll the given match records up into an event summary.
///
/// Roster metadata fills nicknames where present; teams appearing only in
/// records still get a row. Ranking is primary-metric total descending,
/// matches played breaking ties, team number last.
pub fn summarize(
    event_key: &str,
    records: &[MatchRecord],
    meta: &BTreeMap<u32, TeamMeta>,
    game: &GameConfig,
) -> EventSummary {
    let mut accums: BTreeMap<u32, TeamAccum> = BTreeMap::new();
    let mut metric_keys: BTreeSet<String> = BTreeSet::new();
    let mut select_keys: BTreeSet<String> = BTreeSet::new();

    for rec in records {
        let acc = accums.entry(rec.team_number).or_default();
        acc.played += 1;
        acc.penalties += rec.penalties as i64;
        acc.driver_skill += rec.driver_skill as i64;
        acc.defense_played += rec.defense_played as i64;
        acc.defense_resilience += rec.defense_resilience as i64;
        if rec.broke_down {
            acc.broke_down += 1;
        }
        match rec.card {
            Card::Yellow => acc.yellow += 1,
            Card::Red => acc.red += 1,
            Card::None => {}
        }

        for (key, value) in &rec.metrics {
            let canonical = game.canonical_key(key).to_string();
            if let Some(n) = value.as_number() {
                *acc.sums.entry(canonical.clone()).or_insert(0.0) += n;
                metric_keys.insert(canonical);
            } else if let Some(cat) = value.as_category() {
                *acc.cats
                    .entry(canonical.clone())
                    .or_default()
                    .entry(cat.to_string())
                    .or_insert(0) += 1;
                select_keys.insert(canonical);
            }
        }
    }

    let primary = game.primary_metric_substring.to_lowercase();
    let mut teams: Vec<TeamSummary> = accums
        .into_iter()
        .map(|(team_number, acc)| {
            let played = acc.played.max(1) as f64;
            let primary_sum = acc
                .sums
                .iter()
                .filter(|(k, _)| k.to_lowercase().contains(&primary))
                .map(|(_, v)| v)
                .sum::<f64>();
            let avg = acc
                .sums
                .iter()
                .map(|(k, v)| (k.clone(), round2(v / played)))
                .collect();
            let select_pct = acc
                .cats
                .iter()
                .map(|(k, counts)| {
                    let table = counts
                        .iter()
                        .map(|(opt, n)| (opt.clone(), round1(*n as f64 / played * 100.0)))
                        .collect();
                    (k.clone(), table)
                })
                .collect();
            let mut card_pct = BTreeMap::new();
            card_pct.insert(
                "yellow".to_string(),
                round1(acc.yellow as f64 / played * 100.0),
            );
            card_pct.insert("red".to_string(), round1(acc.red as f64 / played * 100.0));

            let entry = meta.get(&team_number);
            TeamSummary {
                team_number,
                nickname: entry.and_then(|m| m.nickname.clone()),
                name: entry.and_then(|m| m.name.clone()),
                played: acc.played,
                avg,
                sum: acc
                    .sums
                    .iter()
                    .map(|(k, v)| (k.clone(), round2(*v)))
                    .collect(),
                select_pct,
                primary_sum: round2(primary_sum),
                penalties_avg: round2(acc.penalties as f64 / played),
                driver_skill_avg: round2(acc.driver_skill as f64 / played),
                defense_played_avg: round2(acc.defense_played as f64 / played),
                defense_resilience_avg: round2(acc.defense_resilience as f64 / played),
                broke_down_pct: round1(acc.broke_down as f64 / played * 100.0),
                card_pct,
            }
        })
        .collect();

    teams.sort_by(|a, b| {
        b.primary_sum
            .partial_cmp(&a.primary_sum)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.played.cmp(&a.played))
            .then(a.team_number.cmp(&b.team_number))
    });

    let mut recent: Vec<&MatchRecord> = records.iter().collect();
    recent.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
    let recent = recent
        .into_iter()
        .take(RECENT_LIMIT)
        .map(|rec| RecentEntry {
            match_key: rec.match_key.clone(),
            team_number: rec.team_number,
            alliance: rec.alliance,
            station: rec.station,
            scout_name: rec.scout_name.clone(),
            created_at_ms: rec.created_at_ms,
        })
        .collect();

    EventSummary {
        event_key: event_key.to_string(),
        game_id: game.id,
        stats: SummaryStats {
            teams: teams.len(),
            matches: records.len(),
            metric_keys: metric_keys.into_iter().collect(),
            select_keys: select_keys.into_iter().collect(),
        },
        teams,
        recent,
    }
}
