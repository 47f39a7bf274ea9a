//! Shortlist snapshot persistence with freeze/active semantics.
//!
//! Activation swaps the active flag in one transaction; the partial unique
//! index on `(active) WHERE active` guarantees at most one active snapshot
//! even under concurrent writers.

use crate::shortlist::model::{NewShortlistSnapshot, ShortlistSnapshot};
use async_trait::async_trait;
use nicheradar_core::{Asin, DatabasePool, Result};
use tracing::info;

#[async_trait]
pub trait ShortlistRepository: Send + Sync {
    /// Records a snapshot row. When `activate` is set the previously
    /// active row is deactivated in the same transaction; frozen snapshots
    /// are recorded but never activated.
    async fn insert_snapshot(&self, snapshot: &NewShortlistSnapshot, activate: bool) -> Result<i64>;

    async fn active_snapshot(&self) -> Result<Option<ShortlistSnapshot>>;

    /// Most recent snapshot belonging to a `completed` run, the fallback
    /// when nothing is active.
    async fn latest_completed_snapshot(&self) -> Result<Option<ShortlistSnapshot>>;

    /// Membership of the currently active snapshot, for stability diffs.
    async fn active_asins(&self) -> Result<Vec<Asin>>;
}

pub struct PostgresShortlistRepository {
    db: DatabasePool,
}

impl PostgresShortlistRepository {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ShortlistRepository for PostgresShortlistRepository {
    async fn insert_snapshot(&self, snapshot: &NewShortlistSnapshot, activate: bool) -> Result<i64> {
        let frozen = snapshot.frozen;
        // A frozen snapshot must never become active.
        let activate = activate && !frozen;

        let mut tx = self.db.get().begin().await?;
        if activate {
            sqlx::query("UPDATE shortlist_snapshots SET active = FALSE WHERE active")
                .execute(&mut *tx)
                .await?;
        }

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO shortlist_snapshots (
                run_id, created_at, asins, scores, total_potential_value,
                added, removed, stability, frozen, active
            ) VALUES ($1, NOW(), $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(snapshot.run_id)
        .bind(&snapshot.asins)
        .bind(&snapshot.scores)
        .bind(snapshot.total_potential_value)
        .bind(&snapshot.added)
        .bind(&snapshot.removed)
        .bind(snapshot.stability)
        .bind(frozen)
        .bind(activate)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(
            snapshot_id = id,
            run_id = %snapshot.run_id,
            size = snapshot.asins.len(),
            activate,
            frozen,
            "shortlist snapshot recorded"
        );
        Ok(id)
    }

    async fn active_snapshot(&self) -> Result<Option<ShortlistSnapshot>> {
        let snapshot = sqlx::query_as::<_, ShortlistSnapshot>(
            "SELECT * FROM shortlist_snapshots WHERE active LIMIT 1",
        )
        .fetch_optional(self.db.get())
        .await?;
        Ok(snapshot)
    }

    async fn latest_completed_snapshot(&self) -> Result<Option<ShortlistSnapshot>> {
        let snapshot = sqlx::query_as::<_, ShortlistSnapshot>(
            r#"
            SELECT s.* FROM shortlist_snapshots s
            JOIN pipeline_runs r ON r.run_id = s.run_id
            WHERE r.status = 'completed'
            ORDER BY s.created_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(self.db.get())
        .await?;
        Ok(snapshot)
    }

    async fn active_asins(&self) -> Result<Vec<Asin>> {
        Ok(self
            .active_snapshot()
            .await?
            .map(|s| s.asins)
            .unwrap_or_default())
    }
}
