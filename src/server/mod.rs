//! Aggregation server: event database, batch ingestion, rosters,
//! schedules, summaries, and CSV export.

pub mod export;
pub mod schema;
pub mod service;
pub mod store;

pub use export::summary_csv;
pub use service::{EventService, TeamDetail};
pub use store::{AppliedCounts, EventDb, ServerError};
