//! Declarative season game schema.
//!
//! Season-specific metrics are never hard-coded into forms or aggregation;
//! both consume these field declarations generically.

use serde::Serialize;

/// A selectable option for a `Select` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub value: &'static str,
    pub label: &'static str,
}

/// One metric field in a game schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GameField {
    Counter {
        key: &'static str,
        label: &'static str,
        min: Option<i32>,
        max: Option<i32>,
    },
    Toggle {
        key: &'static str,
        label: &'static str,
    },
    Select {
        key: &'static str,
        label: &'static str,
        options: Vec<SelectOption>,
    },
    #[serde(rename = "textarea")]
    TextArea {
        key: &'static str,
        label: &'static str,
        rows: Option<u32>,
    },
}

impl GameField {
    pub fn key(&self) -> &'static str {
        match self {
            GameField::Counter { key, .. }
            | GameField::Toggle { key, .. }
            | GameField::Select { key, .. }
            | GameField::TextArea { key, .. } => key,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GameField::Counter { label, .. }
            | GameField::Toggle { label, .. }
            | GameField::Select { label, .. }
            | GameField::TextArea { label, .. } => label,
        }
    }
}

/// A titled group of fields (form layout).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameSection {
    pub title: &'static str,
    pub fields: Vec<GameField>,
}

/// A season's full scouting schema plus the aggregation hints that go with
/// it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameConfig {
    /// Human id, e.g. `reefscape-2025`.
    pub id: &'static str,
    /// Display name, e.g. `Reefscape (2025)`.
    pub name: &'static str,
    /// Bumped whenever the schema changes.
    pub schema: u32,
    pub sections: Vec<GameSection>,
    /// Case-insensitive substring selecting the season's primary scoring
    /// metrics for the leaderboard ordering.
    pub primary_metric_substring: &'static str,
    /// Historical metric-key spellings merged into a canonical key before
    /// categorical percentages are computed.
    pub categorical_aliases: Vec<(&'static str, &'static str)>,
}

impl GameConfig {
    /// Canonical key for a categorical metric, applying the alias table.
    pub fn canonical_key<'a>(&'a self, key: &'a str) -> &'a str {
        for (alias, canonical) in &self.categorical_aliases {
            if *alias == key {
                return canonical;
            }
        }
        key
    }

    /// All declared metric keys in form order.
    pub fn metric_keys(&self) -> Vec<&'static str> {
        self.sections
            .iter()
            .flat_map(|s| s.fields.iter().map(GameField::key))
            .collect()
    }
}
