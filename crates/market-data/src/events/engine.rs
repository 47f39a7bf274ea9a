//! Deterministic event detection over a `(prior, current)` snapshot pair.
//!
//! Runs after delta computation, inside the same transaction as the
//! snapshot insert. Every rule is pure: no prior snapshot means no event,
//! and a null price or rank on either side suppresses that dimension.

use crate::events::model::{NewPriceEvent, NewRankEvent, NewStockEvent};
use crate::snapshots::model::Snapshot;
use nicheradar_core::{EventDirection, EventSeverity, StockEventKind, StockStatus};

/// Price events fire at an absolute percent change of 5 or more.
const PRICE_EVENT_PCT: f64 = 5.0;
/// Rank events fire at 20 percent or 10 000 absolute positions.
const RANK_EVENT_PCT: f64 = 20.0;
const RANK_EVENT_ABS: i64 = 10_000;
/// A rank improvement held across at least two cadence periods counts as
/// sustained.
const SUSTAINED_GAP_HOURS: i64 = 48;

/// Price event iff `|price_delta_pct| >= 5`.
pub fn detect_price_event(prior: &Snapshot, current: &Snapshot) -> Option<NewPriceEvent> {
    let before = prior.price_current?;
    let after = current.price_current?;
    let pct = current.price_delta_pct?;
    if pct.abs() < PRICE_EVENT_PCT {
        return None;
    }

    let severity = match pct.abs() {
        p if p >= 25.0 => EventSeverity::Critical,
        p if p >= 15.0 => EventSeverity::High,
        p if p >= 10.0 => EventSeverity::Medium,
        _ => EventSeverity::Low,
    };
    let direction = if after > before {
        EventDirection::Up
    } else {
        EventDirection::Down
    };

    Some(NewPriceEvent {
        price_before: before,
        price_after: after,
        change_abs: after - before,
        change_pct: pct,
        direction,
        severity,
        is_deal: direction == EventDirection::Down,
        snapshot_before_at: prior.captured_at,
        snapshot_after_at: current.captured_at,
    })
}

/// Rank event iff `|rank_delta_pct| >= 20` or `|rank_delta| >= 10 000`.
/// Improving moves (rank number dropping) carry the severity ladder;
/// worsening moves are always `low`.
pub fn detect_rank_event(prior: &Snapshot, current: &Snapshot) -> Option<NewRankEvent> {
    let before = prior.rank_primary?;
    let after = current.rank_primary?;
    let delta = current.rank_delta?;
    let pct = current.rank_delta_pct.unwrap_or(0.0);
    if pct.abs() < RANK_EVENT_PCT && delta.abs() < RANK_EVENT_ABS {
        return None;
    }

    let improving = delta < 0;
    let severity = if improving {
        if pct.abs() >= 50.0 || delta.abs() >= 50_000 {
            EventSeverity::Critical
        } else if pct.abs() >= 30.0 {
            EventSeverity::High
        } else {
            EventSeverity::Medium
        }
    } else {
        EventSeverity::Low
    };

    let gap_hours = (current.captured_at - prior.captured_at).num_hours();

    Some(NewRankEvent {
        rank_before: before,
        rank_after: after,
        change_abs: delta,
        change_pct: pct,
        direction: if improving { EventDirection::Up } else { EventDirection::Down },
        severity,
        sustained: improving && gap_hours >= SUSTAINED_GAP_HOURS,
        snapshot_before_at: prior.captured_at,
        snapshot_after_at: current.captured_at,
    })
}

/// Stock event iff the status changed. A prior status of `unknown` counts
/// as missing and suppresses the event.
pub fn detect_stock_event(prior: &Snapshot, current: &Snapshot) -> Option<NewStockEvent> {
    let before = prior.stock_status;
    let after = current.stock_status;
    if before == StockStatus::Unknown || before == after {
        return None;
    }

    use StockStatus::*;
    let (kind, severity) = match (before, after) {
        (InStock | LowStock, OutOfStock) => (StockEventKind::Stockout, EventSeverity::High),
        (OutOfStock, InStock | LowStock) => (StockEventKind::Restock, EventSeverity::Medium),
        (_, LowStock) => (StockEventKind::LowStockAlert, EventSeverity::Low),
        _ => (StockEventKind::StatusChange, EventSeverity::Low),
    };

    let (stockout_started_at, stockout_duration_hours) = match kind {
        StockEventKind::Stockout => (Some(current.captured_at), None),
        StockEventKind::Restock => {
            let hours = (current.captured_at - prior.captured_at).num_seconds() as f64 / 3600.0;
            (Some(prior.captured_at), Some(hours))
        }
        _ => (None, None),
    };

    Some(NewStockEvent {
        status_before: before,
        status_after: after,
        quantity_before: prior.stock_quantity,
        quantity_after: current.stock_quantity,
        kind,
        severity,
        stockout_started_at,
        stockout_duration_hours,
        snapshot_before_at: prior.captured_at,
        snapshot_after_at: current.captured_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use nicheradar_core::{Asin, Fulfillment};

    fn snapshot(price: Option<f64>, rank: Option<i64>, stock: StockStatus) -> Snapshot {
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
            stock_status: stock,
            stock_quantity: None,
            seller_count: None,
            fulfillment: Fulfillment::Fba,
            rating_avg: None,
            rating_count: None,
            review_count: None,
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

    fn pair(
        prior_price: f64,
        current_price: f64,
    ) -> (Snapshot, Snapshot) {
        let prior = snapshot(Some(prior_price), None, StockStatus::InStock);
        let mut current = snapshot(Some(current_price), None, StockStatus::InStock);
        current.captured_at = prior.captured_at + Duration::hours(24);
        current.price_delta = Some(current_price - prior_price);
        current.price_delta_pct = Some(100.0 * (current_price - prior_price) / prior_price);
        (prior, current)
    }

    #[test]
    fn price_event_boundary_at_five_percent() {
        // 4.999% stays quiet
        let (prior, current) = pair(100.0, 104.999);
        assert!(detect_price_event(&prior, &current).is_none());

        // 5.000% fires at low severity
        let (prior, current) = pair(100.0, 105.0);
        let event = detect_price_event(&prior, &current).unwrap();
        assert_eq!(event.severity, EventSeverity::Low);
        assert_eq!(event.direction, EventDirection::Up);
        assert!(!event.is_deal);
    }

    #[test]
    fn price_severity_ladder() {
        let (prior, current) = pair(100.0, 89.0); // -11%
        assert_eq!(detect_price_event(&prior, &current).unwrap().severity, EventSeverity::Medium);

        let (prior, current) = pair(100.0, 84.0); // -16%
        assert_eq!(detect_price_event(&prior, &current).unwrap().severity, EventSeverity::High);

        let (prior, current) = pair(100.0, 70.0); // -30%
        let event = detect_price_event(&prior, &current).unwrap();
        assert_eq!(event.severity, EventSeverity::Critical);
        assert!(event.is_deal);
        assert_eq!(event.direction, EventDirection::Down);
    }

    #[test]
    fn missing_price_on_either_side_suppresses_event() {
        let prior = snapshot(None, None, StockStatus::InStock);
        let mut current = snapshot(Some(10.0), None, StockStatus::InStock);
        current.price_delta_pct = None;
        assert!(detect_price_event(&prior, &current).is_none());
    }

    fn rank_pair(before: i64, after: i64, gap_hours: i64) -> (Snapshot, Snapshot) {
        let prior = snapshot(None, Some(before), StockStatus::InStock);
        let mut current = snapshot(None, Some(after), StockStatus::InStock);
        current.captured_at = prior.captured_at + Duration::hours(gap_hours);
        current.rank_delta = Some(after - before);
        current.rank_delta_pct = Some(100.0 * (after - before) as f64 / before as f64);
        (prior, current)
    }

    #[test]
    fn rank_event_requires_percent_or_absolute_threshold() {
        let (prior, current) = rank_pair(100_000, 85_000, 24); // -15%, 15k abs
        let event = detect_rank_event(&prior, &current).unwrap();
        assert_eq!(event.severity, EventSeverity::Medium);

        let (prior, current) = rank_pair(10_000, 8_500, 24); // -15%, 1.5k abs
        assert!(detect_rank_event(&prior, &current).is_none());
    }

    #[test]
    fn improving_rank_severity_ladder() {
        let (prior, current) = rank_pair(10_000, 4_500, 24); // -55%
        assert_eq!(detect_rank_event(&prior, &current).unwrap().severity, EventSeverity::Critical);

        let (prior, current) = rank_pair(200_000, 140_000, 24); // -30%, 60k abs
        assert_eq!(detect_rank_event(&prior, &current).unwrap().severity, EventSeverity::Critical);

        let (prior, current) = rank_pair(10_000, 6_500, 24); // -35%
        assert_eq!(detect_rank_event(&prior, &current).unwrap().severity, EventSeverity::High);

        let (prior, current) = rank_pair(10_000, 7_500, 24); // -25%
        assert_eq!(detect_rank_event(&prior, &current).unwrap().severity, EventSeverity::Medium);
    }

    #[test]
    fn worsening_rank_is_always_low() {
        let (prior, current) = rank_pair(10_000, 25_000, 24); // +150%
        let event = detect_rank_event(&prior, &current).unwrap();
        assert_eq!(event.severity, EventSeverity::Low);
        assert_eq!(event.direction, EventDirection::Down);
        assert!(!event.sustained);
    }

    #[test]
    fn sustained_flag_needs_two_cadence_periods() {
        let (prior, current) = rank_pair(10_000, 6_000, 48);
        assert!(detect_rank_event(&prior, &current).unwrap().sustained);

        let (prior, current) = rank_pair(10_000, 6_000, 24);
        assert!(!detect_rank_event(&prior, &current).unwrap().sustained);
    }

    fn stock_pair(before: StockStatus, after: StockStatus) -> (Snapshot, Snapshot) {
        let prior = snapshot(None, None, before);
        let mut current = snapshot(None, None, after);
        current.captured_at = prior.captured_at + Duration::hours(36);
        (prior, current)
    }

    #[test]
    fn stockout_transition_is_high_severity() {
        let (prior, current) = stock_pair(StockStatus::InStock, StockStatus::OutOfStock);
        let event = detect_stock_event(&prior, &current).unwrap();
        assert_eq!(event.kind, StockEventKind::Stockout);
        assert_eq!(event.severity, EventSeverity::High);
        assert_eq!(event.stockout_started_at, Some(current.captured_at));
    }

    #[test]
    fn restock_records_outage_duration() {
        let (prior, current) = stock_pair(StockStatus::OutOfStock, StockStatus::InStock);
        let event = detect_stock_event(&prior, &current).unwrap();
        assert_eq!(event.kind, StockEventKind::Restock);
        assert_eq!(event.severity, EventSeverity::Medium);
        assert!((event.stockout_duration_hours.unwrap() - 36.0).abs() < 1e-9);
    }

    #[test]
    fn low_stock_alert_and_plain_status_change() {
        let (prior, current) = stock_pair(StockStatus::InStock, StockStatus::LowStock);
        let event = detect_stock_event(&prior, &current).unwrap();
        assert_eq!(event.kind, StockEventKind::LowStockAlert);
        assert_eq!(event.severity, EventSeverity::Low);

        let (prior, current) = stock_pair(StockStatus::BackOrdered, StockStatus::InStock);
        let event = detect_stock_event(&prior, &current).unwrap();
        assert_eq!(event.kind, StockEventKind::StatusChange);
    }

    #[test]
    fn unknown_prior_status_suppresses_event() {
        let (prior, current) = stock_pair(StockStatus::Unknown, StockStatus::InStock);
        assert!(detect_stock_event(&prior, &current).is_none());

        let (prior, current) = stock_pair(StockStatus::InStock, StockStatus::InStock);
        assert!(detect_stock_event(&prior, &current).is_none());
    }
}
