//! Wire payload types and per-record decoding.
//!
//! One malformed product inside a batch must never fail the batch: decoding
//! is isolated per record and failures are returned as an explicit list
//! beside the successful records.

use chrono::{DateTime, Utc};
use nicheradar_core::{Asin, Error, Fulfillment, Result, StockStatus};
use serde::Deserialize;

/// Top-level response envelope. Every response is expected to carry the
/// remote's authoritative budget accounting.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope {
    pub tokens_left: Option<f64>,
    pub refill_per_minute: Option<f64>,
    #[serde(default)]
    pub products: Vec<serde_json::Value>,
    #[serde(default)]
    pub best_sellers: Option<BestSellers>,
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestSellers {
    #[serde(default)]
    pub asin_list: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    pub message: Option<String>,
    #[serde(default)]
    pub retry_after_secs: Option<u64>,
}

/// Raw per-product payload shape.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProduct {
    asin: String,
    title: Option<String>,
    brand: Option<String>,
    manufacturer: Option<String>,
    category_id: Option<i64>,
    #[serde(default)]
    category_path: Vec<String>,
    dimensions: Option<serde_json::Value>,
    price_current: Option<f64>,
    price_list: Option<f64>,
    price_lowest_new: Option<f64>,
    price_lowest_used: Option<f64>,
    currency: Option<String>,
    coupon_amount: Option<f64>,
    coupon_pct: Option<f64>,
    rank_primary: Option<i64>,
    rank_category: Option<String>,
    rank_secondary: Option<i64>,
    stock_status: Option<String>,
    stock_quantity: Option<i32>,
    seller_count: Option<i32>,
    fulfillment: Option<String>,
    rating_avg: Option<f64>,
    rating_count: Option<i64>,
    review_count: Option<i64>,
    star_pct: Option<[f64; 5]>,
    captured_at: Option<DateTime<Utc>>,
    #[serde(default)]
    reviews: Vec<RawReview>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReview {
    review_id: String,
    title: Option<String>,
    body: Option<String>,
    rating: Option<f64>,
    verified: Option<bool>,
    review_date: Option<DateTime<Utc>>,
}

/// A stored review attached to a product observation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRecord {
    pub review_id: String,
    pub title: Option<String>,
    pub body: Option<String>,
    pub rating: Option<f64>,
    pub verified: bool,
    pub review_date: Option<DateTime<Utc>>,
}

/// One decoded product observation: catalog identity plus the market-visible
/// fields captured at fetch time.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    pub asin: Asin,
    pub title: Option<String>,
    pub brand: Option<String>,
    pub manufacturer: Option<String>,
    pub category_id: Option<i64>,
    pub category_path: Vec<String>,
    pub dimensions: Option<serde_json::Value>,
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
    pub captured_at: DateTime<Utc>,
    pub reviews: Vec<ReviewRecord>,
}

/// A product that could not be decoded or fetched, kept for the run's
/// failed-product list.
#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub asin: Option<String>,
    pub reason: String,
}

/// Successful records plus the isolated failure list of one fetch call.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub records: Vec<ProductRecord>,
    pub failures: Vec<FetchFailure>,
    pub tokens_consumed: f64,
}

impl FetchOutcome {
    pub fn merge(&mut self, other: FetchOutcome) {
        self.records.extend(other.records);
        self.failures.extend(other.failures);
        self.tokens_consumed += other.tokens_consumed;
    }
}

fn parse_stock_status(raw: Option<&str>) -> StockStatus {
    match raw {
        Some("in_stock") => StockStatus::InStock,
        Some("low_stock") => StockStatus::LowStock,
        Some("out_of_stock") => StockStatus::OutOfStock,
        Some("back_ordered") => StockStatus::BackOrdered,
        _ => StockStatus::Unknown,
    }
}

fn parse_fulfillment(raw: Option<&str>) -> Fulfillment {
    match raw {
        Some("fba") => Fulfillment::Fba,
        Some("fbm") => Fulfillment::Fbm,
        Some("first_party") => Fulfillment::FirstParty,
        _ => Fulfillment::Unknown,
    }
}

/// Decodes a single product payload. Malformed records fail with the
/// `malformed` kind and never abort the surrounding batch.
pub fn decode_product(value: &serde_json::Value, fetched_at: DateTime<Utc>) -> Result<ProductRecord> {
    let raw: RawProduct = serde_json::from_value(value.clone())
        .map_err(|e| Error::malformed(format!("undecodable product record: {e}")))?;

    let asin = Asin::parse(&raw.asin)
        .map_err(|e| Error::malformed(e.to_string()).with_details(raw.asin.clone()))?;

    let reviews = raw
        .reviews
        .into_iter()
        .map(|r| ReviewRecord {
            review_id: r.review_id,
            title: r.title,
            body: r.body,
            rating: r.rating,
            verified: r.verified.unwrap_or(false),
            review_date: r.review_date,
        })
        .collect();

    Ok(ProductRecord {
        asin,
        title: raw.title,
        brand: raw.brand,
        manufacturer: raw.manufacturer,
        category_id: raw.category_id,
        category_path: raw.category_path,
        dimensions: raw.dimensions,
        price_current: raw.price_current,
        price_list: raw.price_list,
        price_lowest_new: raw.price_lowest_new,
        price_lowest_used: raw.price_lowest_used,
        currency: raw.currency.unwrap_or_else(|| "USD".to_string()),
        coupon_amount: raw.coupon_amount,
        coupon_pct: raw.coupon_pct,
        rank_primary: raw.rank_primary,
        rank_category: raw.rank_category,
        rank_secondary: raw.rank_secondary,
        stock_status: parse_stock_status(raw.stock_status.as_deref()),
        stock_quantity: raw.stock_quantity,
        seller_count: raw.seller_count,
        fulfillment: parse_fulfillment(raw.fulfillment.as_deref()),
        rating_avg: raw.rating_avg,
        rating_count: raw.rating_count,
        review_count: raw.review_count,
        star_pct: raw.star_pct,
        captured_at: raw.captured_at.unwrap_or(fetched_at),
        reviews,
    })
}

/// Decodes every product in an envelope, isolating per-record failures.
pub fn decode_batch(envelope: &ApiEnvelope, fetched_at: DateTime<Utc>) -> (Vec<ProductRecord>, Vec<FetchFailure>) {
    let mut records = Vec::with_capacity(envelope.products.len());
    let mut failures = Vec::new();
    for value in &envelope.products {
        match decode_product(value, fetched_at) {
            Ok(record) => records.push(record),
            Err(err) => failures.push(FetchFailure {
                asin: value
                    .get("asin")
                    .and_then(|a| a.as_str())
                    .map(|a| a.to_string()),
                reason: err.to_string(),
            }),
        }
    }
    (records, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn product_json(asin: &str) -> serde_json::Value {
        json!({
            "asin": asin,
            "title": "Adjustable Phone Mount",
            "brand": "Acme",
            "categoryId": 1234,
            "categoryPath": ["Electronics", "Mounts"],
            "priceCurrent": 19.99,
            "rankPrimary": 4500,
            "stockStatus": "in_stock",
            "sellerCount": 4,
            "fulfillment": "fba",
            "ratingAvg": 4.2,
            "reviewCount": 310,
            "starPct": [5.0, 6.0, 9.0, 30.0, 50.0]
        })
    }

    #[test]
    fn decode_product_maps_enumerations() {
        let now = Utc::now();
        let record = decode_product(&product_json("B01ABCD234"), now).unwrap();
        assert_eq!(record.asin.as_str(), "B01ABCD234");
        assert_eq!(record.stock_status, StockStatus::InStock);
        assert_eq!(record.fulfillment, Fulfillment::Fba);
        assert_eq!(record.currency, "USD");
        assert_eq!(record.captured_at, now);
    }

    #[test]
    fn decode_batch_isolates_malformed_records() {
        let envelope = ApiEnvelope {
            tokens_left: Some(100.0),
            refill_per_minute: Some(21.0),
            products: vec![
                product_json("B01ABCD234"),
                json!({"asin": "not-an-asin", "title": "Broken"}),
                json!("not even an object"),
                product_json("B09XYZW111"),
            ],
            best_sellers: None,
            error: None,
        };
        let (records, failures) = decode_batch(&envelope, Utc::now());
        assert_eq!(records.len(), 2);
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].asin.as_deref(), Some("not-an-asin"));
        assert!(failures[1].asin.is_none());
    }

    #[test]
    fn unknown_stock_status_degrades_to_unknown() {
        let mut value = product_json("B01ABCD234");
        value["stockStatus"] = json!("teleported");
        let record = decode_product(&value, Utc::now()).unwrap();
        assert_eq!(record.stock_status, StockStatus::Unknown);
    }
}
