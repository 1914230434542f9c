//! Season game schemas.
//!
//! Each season supplies a declarative config (field kinds, keys, labels,
//! options) consumed generically by form rendering and by the aggregation
//! engine. Event keys start with the four-digit year, which picks the game.

pub mod crescendo_2024;
pub mod reefscape_2025;
pub mod types;

pub use types::{GameConfig, GameField, GameSection, SelectOption};

/// Resolve the game config for an event key like `2025gaalb`. Unmapped or
/// unparsable years fall back to the newest supported game.
pub fn resolve_by_event_key(event_key: &str) -> GameConfig {
    let year: Option<u32> = event_key.get(0..4).and_then(|y| y.parse().ok());
    match year {
        Some(2024) => crescendo_2024::game_2024(),
        Some(2025) => reefscape_2025::game_2025(),
        _ => reefscape_2025::game_2025(),
    }
}
