//! Snapshot store.
//!
//! `insert_snapshots` is the compound write at the heart of the pipeline:
//! for each observation it computes deltas against the immediately prior
//! snapshot, appends the row, and emits any price/rank/stock events, all
//! inside one transaction per snapshot. Replays collapse on the primary
//! key; concurrent duplicate event writers collapse on the
//! `(asin, snapshot_before_at, snapshot_after_at)` unique triple.

use crate::events::engine::{detect_price_event, detect_rank_event, detect_stock_event};
use crate::events::model::{NewPriceEvent, NewRankEvent, NewStockEvent};
use crate::snapshots::model::{
    compute_deltas, DqCounts, InsertSummary, NewSnapshot, Snapshot, Stats30d, Stats7d,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nicheradar_core::{Asin, DatabasePool, Result, RunId};
use sqlx::{Postgres, Transaction};
use tracing::{debug, info, warn};

#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Appends snapshot rows with computed deltas and event generation.
    /// Out-of-order and replayed rows are skipped, never rewritten.
    async fn insert_snapshots(&self, batch: &[NewSnapshot], session: RunId) -> Result<InsertSummary>;

    async fn latest_snapshot(&self, asin: &Asin) -> Result<Option<Snapshot>>;

    /// Null-field counts over the snapshots a run wrote, for the DQ gate.
    async fn dq_counts(&self, session: RunId) -> Result<DqCounts>;

    async fn stats_7d(&self, asin: &Asin) -> Result<Option<Stats7d>>;
    async fn stats_30d(&self, asin: &Asin) -> Result<Option<Stats30d>>;

    /// Mean review count of the ten best-ranked products in a category.
    async fn top10_avg_reviews(&self, category_id: i64) -> Result<Option<f64>>;

    /// Non-exclusive refresh of the latest/7d/30d materialized views.
    async fn refresh_aggregates(&self) -> Result<()>;

    /// Deletes raw snapshots older than the cutoff.
    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

pub struct PostgresSnapshotRepository {
    db: DatabasePool,
}

impl PostgresSnapshotRepository {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    /// Latest prior snapshot, locked so concurrent inserts for the same
    /// product serialize within the transaction.
    async fn lock_prior(
        tx: &mut Transaction<'_, Postgres>,
        asin: &Asin,
    ) -> Result<Option<Snapshot>> {
        let prior = sqlx::query_as::<_, Snapshot>(
            r#"
            SELECT * FROM snapshots
            WHERE asin = $1
            ORDER BY captured_at DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(asin)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(prior)
    }

    async fn insert_row(
        tx: &mut Transaction<'_, Postgres>,
        snapshot: &Snapshot,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO snapshots (
                asin, captured_at, price_current, price_list, price_lowest_new,
                price_lowest_used, currency, coupon_amount, coupon_pct,
                rank_primary, rank_category, rank_secondary, stock_status,
                stock_quantity, seller_count, fulfillment, rating_avg,
                rating_count, review_count, star1_pct, star2_pct, star3_pct,
                star4_pct, star5_pct, price_delta, price_delta_pct, rank_delta,
                rank_delta_pct, review_count_delta, session_id
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26,
                $27, $28, $29, $30
            )
            ON CONFLICT (asin, captured_at) DO NOTHING
            "#,
        )
        .bind(&snapshot.asin)
        .bind(snapshot.captured_at)
        .bind(snapshot.price_current)
        .bind(snapshot.price_list)
        .bind(snapshot.price_lowest_new)
        .bind(snapshot.price_lowest_used)
        .bind(&snapshot.currency)
        .bind(snapshot.coupon_amount)
        .bind(snapshot.coupon_pct)
        .bind(snapshot.rank_primary)
        .bind(&snapshot.rank_category)
        .bind(snapshot.rank_secondary)
        .bind(snapshot.stock_status)
        .bind(snapshot.stock_quantity)
        .bind(snapshot.seller_count)
        .bind(snapshot.fulfillment)
        .bind(snapshot.rating_avg)
        .bind(snapshot.rating_count)
        .bind(snapshot.review_count)
        .bind(snapshot.star1_pct)
        .bind(snapshot.star2_pct)
        .bind(snapshot.star3_pct)
        .bind(snapshot.star4_pct)
        .bind(snapshot.star5_pct)
        .bind(snapshot.price_delta)
        .bind(snapshot.price_delta_pct)
        .bind(snapshot.rank_delta)
        .bind(snapshot.rank_delta_pct)
        .bind(snapshot.review_count_delta)
        .bind(snapshot.session_id)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_price_event(
        tx: &mut Transaction<'_, Postgres>,
        asin: &Asin,
        event: &NewPriceEvent,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO price_events (
                asin, detected_at, price_before, price_after, change_abs,
                change_pct, direction, severity, is_deal,
                snapshot_before_at, snapshot_after_at
            ) VALUES ($1, NOW(), $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (asin, snapshot_before_at, snapshot_after_at) DO NOTHING
            "#,
        )
        .bind(asin)
        .bind(event.price_before)
        .bind(event.price_after)
        .bind(event.change_abs)
        .bind(event.change_pct)
        .bind(event.direction)
        .bind(event.severity)
        .bind(event.is_deal)
        .bind(event.snapshot_before_at)
        .bind(event.snapshot_after_at)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_rank_event(
        tx: &mut Transaction<'_, Postgres>,
        asin: &Asin,
        event: &NewRankEvent,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO rank_events (
                asin, detected_at, rank_before, rank_after, change_abs,
                change_pct, direction, severity, sustained,
                snapshot_before_at, snapshot_after_at
            ) VALUES ($1, NOW(), $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (asin, snapshot_before_at, snapshot_after_at) DO NOTHING
            "#,
        )
        .bind(asin)
        .bind(event.rank_before)
        .bind(event.rank_after)
        .bind(event.change_abs)
        .bind(event.change_pct)
        .bind(event.direction)
        .bind(event.severity)
        .bind(event.sustained)
        .bind(event.snapshot_before_at)
        .bind(event.snapshot_after_at)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_stock_event(
        tx: &mut Transaction<'_, Postgres>,
        asin: &Asin,
        event: &NewStockEvent,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO stock_events (
                asin, detected_at, status_before, status_after,
                quantity_before, quantity_after, kind, severity,
                stockout_started_at, stockout_duration_hours,
                snapshot_before_at, snapshot_after_at
            ) VALUES ($1, NOW(), $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (asin, snapshot_before_at, snapshot_after_at) DO NOTHING
            "#,
        )
        .bind(asin)
        .bind(event.status_before)
        .bind(event.status_after)
        .bind(event.quantity_before)
        .bind(event.quantity_after)
        .bind(event.kind)
        .bind(event.severity)
        .bind(event.stockout_started_at)
        .bind(event.stockout_duration_hours)
        .bind(event.snapshot_before_at)
        .bind(event.snapshot_after_at)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    fn materialize(new: &NewSnapshot, session: RunId) -> Snapshot {
        Snapshot {
            asin: new.asin.clone(),
            captured_at: new.captured_at,
            price_current: new.price_current,
            price_list: new.price_list,
            price_lowest_new: new.price_lowest_new,
            price_lowest_used: new.price_lowest_used,
            currency: new.currency.clone(),
            coupon_amount: new.coupon_amount,
            coupon_pct: new.coupon_pct,
            rank_primary: new.rank_primary,
            rank_category: new.rank_category.clone(),
            rank_secondary: new.rank_secondary,
            stock_status: new.stock_status,
            stock_quantity: new.stock_quantity,
            seller_count: new.seller_count,
            fulfillment: new.fulfillment,
            rating_avg: new.rating_avg,
            rating_count: new.rating_count,
            review_count: new.review_count,
            star1_pct: new.star_pct.map(|s| s[0]),
            star2_pct: new.star_pct.map(|s| s[1]),
            star3_pct: new.star_pct.map(|s| s[2]),
            star4_pct: new.star_pct.map(|s| s[3]),
            star5_pct: new.star_pct.map(|s| s[4]),
            price_delta: None,
            price_delta_pct: None,
            rank_delta: None,
            rank_delta_pct: None,
            review_count_delta: None,
            session_id: Some(session),
        }
    }
}

#[async_trait]
impl SnapshotRepository for PostgresSnapshotRepository {
    async fn insert_snapshots(&self, batch: &[NewSnapshot], session: RunId) -> Result<InsertSummary> {
        let mut summary = InsertSummary::default();

        for new in batch {
            let mut tx = self.db.get().begin().await?;
            let prior = Self::lock_prior(&mut tx, &new.asin).await?;

            // Inserts must stay strictly monotone by captured_at per product.
            if let Some(ref prior) = prior {
                if prior.captured_at >= new.captured_at {
                    warn!(
                        asin = %new.asin,
                        prior = %prior.captured_at,
                        incoming = %new.captured_at,
                        "skipping non-monotone snapshot"
                    );
                    summary.skipped += 1;
                    tx.commit().await?;
                    continue;
                }
            }

            let deltas = compute_deltas(prior.as_ref(), new);
            let mut snapshot = Self::materialize(new, session);
            snapshot.price_delta = deltas.price_delta;
            snapshot.price_delta_pct = deltas.price_delta_pct;
            snapshot.rank_delta = deltas.rank_delta;
            snapshot.rank_delta_pct = deltas.rank_delta_pct;
            snapshot.review_count_delta = deltas.review_count_delta;

            if !Self::insert_row(&mut tx, &snapshot).await? {
                summary.skipped += 1;
                tx.commit().await?;
                continue;
            }
            summary.inserted += 1;

            if let Some(ref prior) = prior {
                if let Some(event) = detect_price_event(prior, &snapshot) {
                    if Self::insert_price_event(&mut tx, &new.asin, &event).await? {
                        summary.price_events += 1;
                    }
                }
                if let Some(event) = detect_rank_event(prior, &snapshot) {
                    if Self::insert_rank_event(&mut tx, &new.asin, &event).await? {
                        summary.rank_events += 1;
                    }
                }
                if let Some(event) = detect_stock_event(prior, &snapshot) {
                    if Self::insert_stock_event(&mut tx, &new.asin, &event).await? {
                        summary.stock_events += 1;
                    }
                }
            }

            tx.commit().await?;
        }

        debug!(
            inserted = summary.inserted,
            skipped = summary.skipped,
            price_events = summary.price_events,
            rank_events = summary.rank_events,
            stock_events = summary.stock_events,
            "snapshot batch stored"
        );
        Ok(summary)
    }

    async fn latest_snapshot(&self, asin: &Asin) -> Result<Option<Snapshot>> {
        let snapshot = sqlx::query_as::<_, Snapshot>(
            r#"
            SELECT * FROM snapshots
            WHERE asin = $1
            ORDER BY captured_at DESC
            LIMIT 1
            "#,
        )
        .bind(asin)
        .fetch_optional(self.db.get())
        .await?;
        Ok(snapshot)
    }

    async fn dq_counts(&self, session: RunId) -> Result<DqCounts> {
        let counts = sqlx::query_as::<_, DqCounts>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE price_current IS NULL) AS price_missing,
                COUNT(*) FILTER (WHERE rank_primary IS NULL) AS rank_missing,
                COUNT(*) FILTER (WHERE review_count IS NULL) AS review_missing
            FROM snapshots
            WHERE session_id = $1
            "#,
        )
        .bind(session)
        .fetch_one(self.db.get())
        .await?;
        Ok(counts)
    }

    async fn stats_7d(&self, asin: &Asin) -> Result<Option<Stats7d>> {
        // Computed live rather than from the materialized view: the view
        // refresh runs after scoring, so the scorer must see this run's
        // own snapshots.
        let stats = sqlx::query_as::<_, Stats7d>(
            r#"
            WITH win AS (
                SELECT * FROM snapshots
                WHERE asin = $1 AND captured_at >= NOW() - INTERVAL '7 days'
            )
            SELECT
                $1::text AS asin,
                (SELECT COUNT(*) FROM win) AS snapshot_count,
                (SELECT rank_primary FROM win WHERE rank_primary IS NOT NULL
                    ORDER BY captured_at ASC LIMIT 1) AS rank_first,
                (SELECT rank_primary FROM win WHERE rank_primary IS NOT NULL
                    ORDER BY captured_at DESC LIMIT 1) AS rank_last,
                (SELECT CASE WHEN f.rank > 0
                        THEN (100.0 * (l.rank - f.rank) / f.rank)::float8 END
                 FROM (SELECT rank_primary AS rank FROM win
                       WHERE rank_primary IS NOT NULL
                       ORDER BY captured_at ASC LIMIT 1) f,
                      (SELECT rank_primary AS rank FROM win
                       WHERE rank_primary IS NOT NULL
                       ORDER BY captured_at DESC LIMIT 1) l
                ) AS rank_trend_pct
            "#,
        )
        .bind(asin)
        .fetch_optional(self.db.get())
        .await?;
        Ok(stats)
    }

    async fn stats_30d(&self, asin: &Asin) -> Result<Option<Stats30d>> {
        let stats = sqlx::query_as::<_, Stats30d>(
            r#"
            WITH win AS (
                SELECT * FROM snapshots
                WHERE asin = $1 AND captured_at >= NOW() - INTERVAL '30 days'
            ),
            ordered AS (
                SELECT seller_count,
                       LAG(seller_count) OVER (ORDER BY captured_at) AS prev_sellers
                FROM win
            )
            SELECT
                $1::text AS asin,
                (SELECT COUNT(*) FROM win) AS snapshot_count,
                (SELECT AVG(price_current) FROM win) AS avg_price,
                (SELECT CASE WHEN AVG(price_current) > 0
                        THEN (100.0 * STDDEV_SAMP(price_current) / AVG(price_current))::float8 END
                 FROM win) AS price_volatility_pct,
                (SELECT rank_primary FROM win WHERE rank_primary IS NOT NULL
                    ORDER BY captured_at ASC LIMIT 1) AS rank_first,
                (SELECT rank_primary FROM win WHERE rank_primary IS NOT NULL
                    ORDER BY captured_at DESC LIMIT 1) AS rank_last,
                (SELECT CASE WHEN f.rank > 0
                        THEN (100.0 * (l.rank - f.rank) / f.rank)::float8 END
                 FROM (SELECT rank_primary AS rank FROM win
                       WHERE rank_primary IS NOT NULL
                       ORDER BY captured_at ASC LIMIT 1) f,
                      (SELECT rank_primary AS rank FROM win
                       WHERE rank_primary IS NOT NULL
                       ORDER BY captured_at DESC LIMIT 1) l
                ) AS rank_trend_pct,
                (SELECT l.reviews - f.reviews
                 FROM (SELECT review_count AS reviews FROM win
                       WHERE review_count IS NOT NULL
                       ORDER BY captured_at ASC LIMIT 1) f,
                      (SELECT review_count AS reviews FROM win
                       WHERE review_count IS NOT NULL
                       ORDER BY captured_at DESC LIMIT 1) l
                ) AS review_growth,
                (SELECT COUNT(*) FROM ordered
                 WHERE prev_sellers IS NOT NULL
                   AND seller_count IS DISTINCT FROM prev_sellers) AS seller_change_count
            "#,
        )
        .bind(asin)
        .fetch_optional(self.db.get())
        .await?;
        Ok(stats)
    }

    async fn top10_avg_reviews(&self, category_id: i64) -> Result<Option<f64>> {
        let avg = sqlx::query_scalar::<_, Option<f64>>(
            r#"
            SELECT AVG(review_count)::float8
            FROM (
                SELECT latest.review_count
                FROM (
                    SELECT DISTINCT ON (s.asin) s.review_count, s.rank_primary
                    FROM snapshots s
                    JOIN products p ON p.asin = s.asin
                    WHERE p.category_id = $1
                    ORDER BY s.asin, s.captured_at DESC
                ) latest
                WHERE latest.rank_primary IS NOT NULL
                  AND latest.review_count IS NOT NULL
                ORDER BY latest.rank_primary ASC
                LIMIT 10
            ) top10
            "#,
        )
        .bind(category_id)
        .fetch_one(self.db.get())
        .await?;
        Ok(avg)
    }

    async fn refresh_aggregates(&self) -> Result<()> {
        info!("refreshing snapshot aggregates");
        for view in ["product_latest", "product_stats_7d", "product_stats_30d"] {
            sqlx::query(&format!("REFRESH MATERIALIZED VIEW CONCURRENTLY {view}"))
                .execute(self.db.get())
                .await?;
        }
        Ok(())
    }

    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM snapshots WHERE captured_at < $1")
            .bind(cutoff)
            .execute(self.db.get())
            .await?;
        info!(removed = result.rows_affected(), cutoff = %cutoff, "snapshot retention prune complete");
        Ok(result.rows_affected())
    }
}
