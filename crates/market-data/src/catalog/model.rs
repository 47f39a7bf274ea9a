use chrono::{DateTime, Utc};
use nicheradar_core::Asin;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Catalog row for a tracked product.
///
/// Created on first discovery and kept forever: delisted products keep
/// their history and are only soft-deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub asin: Asin,
    /// Null once a product is delisted upstream
    pub title: Option<String>,
    pub brand: Option<String>,
    pub manufacturer: Option<String>,
    pub category_id: Option<i64>,
    pub category_path: Vec<String>,
    pub dimensions: Option<serde_json::Value>,
    pub is_active: bool,
    /// 1 (background) to 10 (hot), drives refresh ordering
    pub tracking_priority: i16,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// Last successful observation refresh; null until first fetch
    pub last_updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Upsert payload carried from the connector into the catalog.
#[derive(Debug, Clone)]
pub struct ProductUpsert {
    pub asin: Asin,
    pub title: Option<String>,
    pub brand: Option<String>,
    pub manufacturer: Option<String>,
    pub category_id: Option<i64>,
    pub category_path: Vec<String>,
    pub dimensions: Option<serde_json::Value>,
}
