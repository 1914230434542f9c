//! Reefscape (2025): per-level coral in Auto & Teleop plus algae, mobility,
//! coop and endgame climb.

use super::types::{GameConfig, GameField, GameSection, SelectOption};

pub fn game_2025() -> GameConfig {
    GameConfig {
        id: "reefscape-2025",
        name: "Reefscape (2025)",
        schema: 2,
        sections: vec![
            GameSection {
                title: "Autonomous",
                fields: vec![
                    GameField::Counter {
                        key: "auto_coral_L1",
                        label: "Coral L1 (Auto)",
                        min: Some(0),
                        max: None,
                    },
                    GameField::Counter {
                        key: "auto_coral_L2",
                        label: "Coral L2 (Auto)",
                        min: Some(0),
                        max: None,
                    },
                    GameField::Counter {
                        key: "auto_coral_L3",
                        label: "Coral L3 (Auto)",
                        min: Some(0),
                        max: None,
                    },
                    GameField::Counter {
                        key: "auto_coral_L4",
                        label: "Coral L4 (Auto)",
                        min: Some(0),
                        max: None,
                    },
                    GameField::Counter {
                        key: "auto_algae_scored",
                        label: "Algae Scored (Auto)",
                        min: Some(0),
                        max: None,
                    },
                    GameField::Toggle {
                        key: "auto_mobility",
                        label: "Mobility Achieved",
                    },
                ],
            },
            GameSection {
                title: "Teleop",
                fields: vec![
                    GameField::Counter {
                        key: "teleop_coral_L1",
                        label: "Coral L1",
                        min: Some(0),
                        max: None,
                    },
                    GameField::Counter {
                        key: "teleop_coral_L2",
                        label: "Coral L2",
                        min: Some(0),
                        max: None,
                    },
                    GameField::Counter {
                        key: "teleop_coral_L3",
                        label: "Coral L3",
                        min: Some(0),
                        max: None,
                    },
                    GameField::Counter {
                        key: "teleop_coral_L4",
                        label: "Coral L4",
                        min: Some(0),
                        max: None,
                    },
                    GameField::Counter {
                        key: "teleop_algae_scored",
                        label: "Algae Scored",
                        min: Some(0),
                        max: None,
                    },
                    GameField::Counter {
                        key: "teleop_dropped",
                        label: "Game Pieces Dropped",
                        min: Some(0),
                        max: None,
                    },
                ],
            },
            GameSection {
                title: "Endgame",
                fields: vec![
                    GameField::Select {
                        key: "endgame_climb",
                        label: "Endgame",
                        options: vec![
                            SelectOption {
                                value: "none",
                                label: "None",
                            },
                            SelectOption {
                                value: "low",
                                label: "Shallow",
                            },
                            SelectOption {
                                value: "mid",
                                label: "Deep",
                            },
                        ],
                    },
                    GameField::Toggle {
                        key: "coop",
                        label: "Coopertition Achieved",
                    },
                ],
            },
        ],
        primary_metric_substring: "coral",
        categorical_aliases: vec![
            ("endgame_climb", "endgame"),
            ("endgame_status", "endgame"),
        ],
    }
}
