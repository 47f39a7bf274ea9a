//! Append-only per-product snapshot history with automatic delta
//! computation and event generation on insert.

pub mod model;
pub mod repository;

pub use model::{compute_deltas, Deltas, DqCounts, InsertSummary, NewSnapshot, Snapshot, Stats30d, Stats7d};
pub use repository::{PostgresSnapshotRepository, SnapshotRepository};
