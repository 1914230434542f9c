//! Storage module for the device-local durable queue.

pub mod local;
pub mod schema;

pub use local::{LocalStore, StoreError, Stored, UnsyncedCounts};
