//! CRESCENDO (2024) - simplified essentials.

use super::types::{GameConfig, GameField, GameSection, SelectOption};

pub fn game_2024() -> GameConfig {
    GameConfig {
        id: "crescendo-2024",
        name: "CRESCENDO (2024)",
        schema: 2,
        sections: vec![
            GameSection {
                title: "Autonomous",
                fields: vec![
                    GameField::Counter {
                        key: "auto_notes_speaker",
                        label: "Speaker (Auto)",
                        min: Some(0),
                        max: None,
                    },
                    GameField::Counter {
                        key: "auto_notes_amp",
                        label: "Amp (Auto)",
                        min: Some(0),
                        max: None,
                    },
                    GameField::Toggle {
                        key: "auto_leave",
                        label: "Taxi / Mobility",
                    },
                ],
            },
            GameSection {
                title: "Teleop",
                fields: vec![
                    GameField::Counter {
                        key: "teleop_notes_speaker",
                        label: "Speaker",
                        min: Some(0),
                        max: None,
                    },
                    GameField::Counter {
                        key: "teleop_notes_amp",
                        label: "Amp",
                        min: Some(0),
                        max: None,
                    },
                    GameField::Counter {
                        key: "teleop_missed",
                        label: "Missed",
                        min: Some(0),
                        max: None,
                    },
                ],
            },
            GameSection {
                title: "Endgame",
                fields: vec![
                    GameField::Select {
                        key: "endgame_status",
                        label: "Endgame",
                        options: vec![
                            SelectOption {
                                value: "none",
                                label: "None",
                            },
                            SelectOption {
                                value: "park",
                                label: "Park",
                            },
                            SelectOption {
                                value: "onstage",
                                label: "Onstage",
                            },
                            SelectOption {
                                value: "harmonize",
                                label: "Harmonize",
                            },
                        ],
                    },
                    GameField::Toggle {
                        key: "trap_scored",
                        label: "Trap Scored",
                    },
                ],
            },
        ],
        primary_metric_substring: "notes",
        categorical_aliases: vec![
            ("endgame_climb", "endgame"),
            ("endgame_status", "endgame"),
        ],
    }
}
