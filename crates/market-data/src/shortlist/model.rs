use chrono::{DateTime, Utc};
use nicheradar_core::{Asin, RunId};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One ranked shortlist member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortlistEntry {
    pub asin: Asin,
    pub final_score: i32,
    pub rank_score: f64,
    pub window_days: i32,
}

/// Stored per-run shortlist snapshot. At most one row is `active` at any
/// moment, enforced by a partial unique index.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShortlistSnapshot {
    pub id: i64,
    pub run_id: RunId,
    pub created_at: DateTime<Utc>,
    pub asins: Vec<Asin>,
    /// Final scores parallel to `asins`
    pub scores: Vec<i32>,
    pub total_potential_value: f64,
    pub added: Vec<Asin>,
    pub removed: Vec<Asin>,
    /// Jaccard overlap with the previous snapshot, in [0, 1]
    pub stability: f64,
    /// Recorded but never activated (degraded or failed run)
    pub frozen: bool,
    pub active: bool,
}

/// Snapshot payload before persistence.
#[derive(Debug, Clone)]
pub struct NewShortlistSnapshot {
    pub run_id: RunId,
    pub asins: Vec<Asin>,
    pub scores: Vec<i32>,
    pub total_potential_value: f64,
    pub added: Vec<Asin>,
    pub removed: Vec<Asin>,
    pub stability: f64,
    pub frozen: bool,
}
