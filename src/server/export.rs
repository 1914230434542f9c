//! CSV export of event summaries.

use crate::aggregation::EventSummary;

/// Render a summary as CSV, one row per team in rank order. Metric columns
/// are the event's observed numeric keys (averages), then categorical
/// percentage columns flattened as `key:option`.
pub fn summary_csv(summary: &EventSummary) -> String {
    let mut select_columns: Vec<(String, String)> = Vec::new();
    for key in &summary.stats.select_keys {
        let mut options: Vec<String> = summary
            .teams
            .iter()
            .filter_map(|t| t.select_pct.get(key))
            .flat_map(|table| table.keys().cloned())
            .collect();
        options.sort();
        options.dedup();
        for opt in options {
            select_columns.push((key.clone(), opt));
        }
    }

    let mut csv = String::new();
    csv.push_str("rank,team_number,nickname,played");
    for key in &summary.stats.metric_keys {
        csv.push_str(&format!(",avg_{key}"));
    }
    for (key, opt) in &select_columns {
        csv.push_str(&format!(",pct_{key}:{opt}"));
    }
    csv.push_str(",penalties_avg,driver_skill_avg,broke_down_pct\n");

    for (rank, team) in summary.teams.iter().enumerate() {
        csv.push_str(&format!(
            "{},{},{},{}",
            rank + 1,
            team.team_number,
            escape_csv(team.nickname.as_deref().unwrap_or("")),
            team.played,
        ));
        for key in &summary.stats.metric_keys {
            match team.avg.get(key) {
                Some(v) => csv.push_str(&format!(",{v}")),
                None => csv.push(','),
            }
        }
        for (key, opt) in &select_columns {
            match team.select_pct.get(key).and_then(|t| t.get(opt)) {
                Some(v) => csv.push_str(&format!(",{v}")),
                None => csv.push_str(",0"),
            }
        }
        csv.push_str(&format!(
            ",{},{},{}\n",
            team.penalties_avg, team.driver_skill_avg, team.broke_down_pct
        ));
    }

    csv
}

/// Escape a string for CSV.
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
