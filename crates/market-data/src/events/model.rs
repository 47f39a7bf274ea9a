use chrono::{DateTime, Utc};
use nicheradar_core::{Asin, EventDirection, EventSeverity, StockEventKind, StockStatus};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Stored price change event.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PriceEvent {
    pub id: i64,
    pub asin: Asin,
    pub detected_at: DateTime<Utc>,
    pub price_before: f64,
    pub price_after: f64,
    pub change_abs: f64,
    pub change_pct: f64,
    pub direction: EventDirection,
    pub severity: EventSeverity,
    pub is_deal: bool,
    pub snapshot_before_at: DateTime<Utc>,
    pub snapshot_after_at: DateTime<Utc>,
}

/// Stored sales-rank change event. Direction `up` means the rank number
/// dropped, i.e. the product improved.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RankEvent {
    pub id: i64,
    pub asin: Asin,
    pub detected_at: DateTime<Utc>,
    pub rank_before: i64,
    pub rank_after: i64,
    pub change_abs: i64,
    pub change_pct: f64,
    pub direction: EventDirection,
    pub severity: EventSeverity,
    pub sustained: bool,
    pub snapshot_before_at: DateTime<Utc>,
    pub snapshot_after_at: DateTime<Utc>,
}

/// Stored stock transition event.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StockEvent {
    pub id: i64,
    pub asin: Asin,
    pub detected_at: DateTime<Utc>,
    pub status_before: StockStatus,
    pub status_after: StockStatus,
    pub quantity_before: Option<i32>,
    pub quantity_after: Option<i32>,
    pub kind: StockEventKind,
    pub severity: EventSeverity,
    pub stockout_started_at: Option<DateTime<Utc>>,
    pub stockout_duration_hours: Option<f64>,
    pub snapshot_before_at: DateTime<Utc>,
    pub snapshot_after_at: DateTime<Utc>,
}

/// Detection output for a price change, before persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPriceEvent {
    pub price_before: f64,
    pub price_after: f64,
    pub change_abs: f64,
    pub change_pct: f64,
    pub direction: EventDirection,
    pub severity: EventSeverity,
    pub is_deal: bool,
    pub snapshot_before_at: DateTime<Utc>,
    pub snapshot_after_at: DateTime<Utc>,
}

/// Detection output for a rank change, before persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRankEvent {
    pub rank_before: i64,
    pub rank_after: i64,
    pub change_abs: i64,
    pub change_pct: f64,
    pub direction: EventDirection,
    pub severity: EventSeverity,
    pub sustained: bool,
    pub snapshot_before_at: DateTime<Utc>,
    pub snapshot_after_at: DateTime<Utc>,
}

/// Detection output for a stock transition, before persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStockEvent {
    pub status_before: StockStatus,
    pub status_after: StockStatus,
    pub quantity_before: Option<i32>,
    pub quantity_after: Option<i32>,
    pub kind: StockEventKind,
    pub severity: EventSeverity,
    pub stockout_started_at: Option<DateTime<Utc>>,
    pub stockout_duration_hours: Option<f64>,
    pub snapshot_before_at: DateTime<Utc>,
    pub snapshot_after_at: DateTime<Utc>,
}
