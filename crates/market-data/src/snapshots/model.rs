use chrono::{DateTime, Utc};
use nicheradar_core::{Asin, Fulfillment, RunId, StockStatus};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One timestamped observation of a product's market-visible fields.
///
/// Rows are append-only. The three delta fields are set by the store at
/// insert time against the immediately prior snapshot of the same product,
/// never by callers.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Snapshot {
    pub asin: Asin,
    pub captured_at: DateTime<Utc>,
    pub price_current: Option<f64>,
    pub price_list: Option<f64>,
    pub price_lowest_new: Option<f64>,
    pub price_lowest_used: Option<f64>,
    pub currency: String,
    pub coupon_amount: Option<f64>,
    pub coupon_pct: Option<f64>,
    pub rank_primary: Option<i64>,
    pub rank_category: Option<String>,
    pub rank_secondary: Option<i64>,
    pub stock_status: StockStatus,
    pub stock_quantity: Option<i32>,
    pub seller_count: Option<i32>,
    pub fulfillment: Fulfillment,
    pub rating_avg: Option<f64>,
    pub rating_count: Option<i64>,
    pub review_count: Option<i64>,
    /// Share of 1..5 star ratings, percent
    pub star1_pct: Option<f64>,
    pub star2_pct: Option<f64>,
    pub star3_pct: Option<f64>,
    pub star4_pct: Option<f64>,
    pub star5_pct: Option<f64>,
    pub price_delta: Option<f64>,
    pub price_delta_pct: Option<f64>,
    pub rank_delta: Option<i64>,
    pub rank_delta_pct: Option<f64>,
    pub review_count_delta: Option<i64>,
    /// Ingestion session (pipeline run) that wrote the row
    pub session_id: Option<RunId>,
}

/// Incoming observation, before delta computation.
#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub asin: Asin,
    pub captured_at: DateTime<Utc>,
    pub price_current: Option<f64>,
    pub price_list: Option<f64>,
    pub price_lowest_new: Option<f64>,
    pub price_lowest_used: Option<f64>,
    pub currency: String,
    pub coupon_amount: Option<f64>,
    pub coupon_pct: Option<f64>,
    pub rank_primary: Option<i64>,
    pub rank_category: Option<String>,
    pub rank_secondary: Option<i64>,
    pub stock_status: StockStatus,
    pub stock_quantity: Option<i32>,
    pub seller_count: Option<i32>,
    pub fulfillment: Fulfillment,
    pub rating_avg: Option<f64>,
    pub rating_count: Option<i64>,
    pub review_count: Option<i64>,
    pub star_pct: Option<[f64; 5]>,
}

/// The three computed delta fields.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Deltas {
    pub price_delta: Option<f64>,
    pub price_delta_pct: Option<f64>,
    pub rank_delta: Option<i64>,
    pub rank_delta_pct: Option<f64>,
    pub review_count_delta: Option<i64>,
}

/// Deltas of `new` against the immediately prior snapshot. Null inputs
/// propagate; percent is null when the prior value is zero or null.
pub fn compute_deltas(prior: Option<&Snapshot>, new: &NewSnapshot) -> Deltas {
    let Some(prior) = prior else {
        return Deltas::default();
    };

    let mut deltas = Deltas::default();

    if let (Some(prev), Some(curr)) = (prior.price_current, new.price_current) {
        let delta = curr - prev;
        deltas.price_delta = Some(delta);
        if prev != 0.0 {
            deltas.price_delta_pct = Some(100.0 * delta / prev);
        }
    }

    if let (Some(prev), Some(curr)) = (prior.rank_primary, new.rank_primary) {
        let delta = curr - prev;
        deltas.rank_delta = Some(delta);
        if prev != 0 {
            deltas.rank_delta_pct = Some(100.0 * delta as f64 / prev as f64);
        }
    }

    if let (Some(prev), Some(curr)) = (prior.review_count, new.review_count) {
        deltas.review_count_delta = Some(curr - prev);
    }

    deltas
}

/// Outcome of one snapshot insert batch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InsertSummary {
    pub inserted: u64,
    /// Replays (primary-key collisions) and out-of-order arrivals
    pub skipped: u64,
    pub price_events: u64,
    pub rank_events: u64,
    pub stock_events: u64,
}

/// Null-field counts over the snapshots one run wrote, for the DQ gate.
#[derive(Debug, Clone, Copy, Default, FromRow)]
pub struct DqCounts {
    pub total: i64,
    pub price_missing: i64,
    pub rank_missing: i64,
    pub review_missing: i64,
}

/// 7-day aggregate row from the materialized view.
#[derive(Debug, Clone, FromRow)]
pub struct Stats7d {
    pub asin: Asin,
    pub snapshot_count: i64,
    pub rank_first: Option<i64>,
    pub rank_last: Option<i64>,
    /// (last - first) / first, percent; negative means the rank improved
    pub rank_trend_pct: Option<f64>,
}

/// 30-day aggregate row from the materialized view.
#[derive(Debug, Clone, FromRow)]
pub struct Stats30d {
    pub asin: Asin,
    pub snapshot_count: i64,
    pub avg_price: Option<f64>,
    /// Coefficient of variation of the price, percent
    pub price_volatility_pct: Option<f64>,
    pub rank_first: Option<i64>,
    pub rank_last: Option<i64>,
    pub rank_trend_pct: Option<f64>,
    /// Reviews gained over the window
    pub review_growth: Option<i64>,
    /// Snapshot-to-snapshot seller-count changes over the window
    pub seller_change_count: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_new(asin: &str) -> NewSnapshot {
        NewSnapshot {
            asin: Asin::parse(asin).unwrap(),
            captured_at: Utc::now(),
            price_current: None,
            price_list: None,
            price_lowest_new: None,
            price_lowest_used: None,
            currency: "USD".to_string(),
            coupon_amount: None,
            coupon_pct: None,
            rank_primary: None,
            rank_category: None,
            rank_secondary: None,
            stock_status: StockStatus::Unknown,
            stock_quantity: None,
            seller_count: None,
            fulfillment: Fulfillment::Unknown,
            rating_avg: None,
            rating_count: None,
            review_count: None,
            star_pct: None,
        }
    }

    fn prior_with(price: Option<f64>, rank: Option<i64>, reviews: Option<i64>) -> Snapshot {
        Snapshot {
            asin: Asin::parse("B01ABCD234").unwrap(),
            captured_at: Utc::now(),
            price_current: price,
            price_list: None,
            price_lowest_new: None,
            price_lowest_used: None,
            currency: "USD".to_string(),
            coupon_amount: None,
            coupon_pct: None,
            rank_primary: rank,
            rank_category: None,
            rank_secondary: None,
            stock_status: StockStatus::InStock,
            stock_quantity: None,
            seller_count: None,
            fulfillment: Fulfillment::Fba,
            rating_avg: None,
            rating_count: None,
            review_count: reviews,
            star1_pct: None,
            star2_pct: None,
            star3_pct: None,
            star4_pct: None,
            star5_pct: None,
            price_delta: None,
            price_delta_pct: None,
            rank_delta: None,
            rank_delta_pct: None,
            review_count_delta: None,
            session_id: None,
        }
    }

    #[test]
    fn no_prior_means_null_deltas() {
        let new = base_new("B01ABCD234");
        assert_eq!(compute_deltas(None, &new), Deltas::default());
    }

    #[test]
    fn price_delta_is_exact_difference() {
        let prior = prior_with(Some(20.0), None, None);
        let mut new = base_new("B01ABCD234");
        new.price_current = Some(23.5);
        let deltas = compute_deltas(Some(&prior), &new);
        assert_eq!(deltas.price_delta, Some(3.5));
        assert_eq!(deltas.price_delta_pct, Some(17.5));
    }

    #[test]
    fn zero_prior_price_suppresses_percent() {
        let prior = prior_with(Some(0.0), None, None);
        let mut new = base_new("B01ABCD234");
        new.price_current = Some(10.0);
        let deltas = compute_deltas(Some(&prior), &new);
        assert_eq!(deltas.price_delta, Some(10.0));
        assert_eq!(deltas.price_delta_pct, None);
    }

    #[test]
    fn null_on_either_side_suppresses_the_dimension() {
        let prior = prior_with(None, Some(1000), Some(50));
        let mut new = base_new("B01ABCD234");
        new.price_current = Some(10.0);
        new.rank_primary = Some(800);
        let deltas = compute_deltas(Some(&prior), &new);
        assert_eq!(deltas.price_delta, None);
        assert_eq!(deltas.rank_delta, Some(-200));
        assert_eq!(deltas.rank_delta_pct, Some(-20.0));
        assert_eq!(deltas.review_count_delta, None);
    }
}
