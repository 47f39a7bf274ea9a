//! Event row reads and retention. Rows are produced by the snapshot store
//! inside the insert transaction, never updated, and only pruned here.

use crate::events::model::{PriceEvent, RankEvent, StockEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nicheradar_core::{Asin, DatabasePool, Result};
use tracing::info;

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn recent_price_events(&self, asin: &Asin, since: DateTime<Utc>) -> Result<Vec<PriceEvent>>;
    async fn recent_rank_events(&self, asin: &Asin, since: DateTime<Utc>) -> Result<Vec<RankEvent>>;
    async fn recent_stock_events(&self, asin: &Asin, since: DateTime<Utc>) -> Result<Vec<StockEvent>>;

    /// Stockout events for a product since the cutoff.
    async fn count_stockouts(&self, asin: &Asin, since: DateTime<Utc>) -> Result<i64>;

    /// Deletes event rows older than the cutoff from all three tables.
    /// Returns the total rows removed.
    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

pub struct PostgresEventRepository {
    db: DatabasePool,
}

impl PostgresEventRepository {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EventRepository for PostgresEventRepository {
    async fn recent_price_events(&self, asin: &Asin, since: DateTime<Utc>) -> Result<Vec<PriceEvent>> {
        let events = sqlx::query_as::<_, PriceEvent>(
            r#"
            SELECT * FROM price_events
            WHERE asin = $1 AND snapshot_after_at >= $2
            ORDER BY snapshot_after_at DESC
            "#,
        )
        .bind(asin)
        .bind(since)
        .fetch_all(self.db.get())
        .await?;
        Ok(events)
    }

    async fn recent_rank_events(&self, asin: &Asin, since: DateTime<Utc>) -> Result<Vec<RankEvent>> {
        let events = sqlx::query_as::<_, RankEvent>(
            r#"
            SELECT * FROM rank_events
            WHERE asin = $1 AND snapshot_after_at >= $2
            ORDER BY snapshot_after_at DESC
            "#,
        )
        .bind(asin)
        .bind(since)
        .fetch_all(self.db.get())
        .await?;
        Ok(events)
    }

    async fn recent_stock_events(&self, asin: &Asin, since: DateTime<Utc>) -> Result<Vec<StockEvent>> {
        let events = sqlx::query_as::<_, StockEvent>(
            r#"
            SELECT * FROM stock_events
            WHERE asin = $1 AND snapshot_after_at >= $2
            ORDER BY snapshot_after_at DESC
            "#,
        )
        .bind(asin)
        .bind(since)
        .fetch_all(self.db.get())
        .await?;
        Ok(events)
    }

    async fn count_stockouts(&self, asin: &Asin, since: DateTime<Utc>) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM stock_events
            WHERE asin = $1 AND kind = 'stockout' AND snapshot_after_at >= $2
            "#,
        )
        .bind(asin)
        .bind(since)
        .fetch_one(self.db.get())
        .await?;
        Ok(count)
    }

    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut removed = 0u64;
        for table in ["price_events", "rank_events", "stock_events"] {
            let result = sqlx::query(&format!(
                "DELETE FROM {table} WHERE snapshot_after_at < $1"
            ))
            .bind(cutoff)
            .execute(self.db.get())
            .await?;
            removed += result.rows_affected();
        }
        info!(removed, cutoff = %cutoff, "event retention prune complete");
        Ok(removed)
    }
}
