//! FieldScout - Offline-First Robotics Scouting
//!
//! Competition scouting toolkit for events with unreliable connectivity.
//! Records are captured into a device-local durable queue, synced to an
//! aggregation server in explicit all-or-nothing batches with last-write-wins
//! replacement, and rolled up into per-team summaries driven by declarative
//! season game schemas.

pub mod aggregation;
pub mod cache;
pub mod games;
pub mod photos;
pub mod records;
pub mod server;
pub mod settings;
pub mod storage;
pub mod sync;

// Re-export commonly used types
pub use cache::ReferenceCache;
pub use records::{MatchRecord, PitRecord};
pub use server::EventService;
pub use settings::Settings;
pub use storage::local::LocalStore;
pub use sync::{HttpApi, SyncEngine};
