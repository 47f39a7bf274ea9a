//! Deterministic in-memory catalog API.
//!
//! Serves a fixed product set without the network, used by orchestrator
//! tests and by demo deployments that have no API credentials.

use crate::client::{ApiHealth, CatalogApi};
use crate::records::{FetchFailure, FetchOutcome, ProductRecord};
use async_trait::async_trait;
use nicheradar_core::{Asin, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct MockCatalogApi {
    products: BTreeMap<Asin, ProductRecord>,
    /// ASINs that fail individually inside any batch
    failing: Vec<Asin>,
    calls: AtomicU64,
}

impl MockCatalogApi {
    pub fn new(products: impl IntoIterator<Item = ProductRecord>) -> Self {
        Self {
            products: products.into_iter().map(|p| (p.asin.clone(), p)).collect(),
            failing: Vec::new(),
            calls: AtomicU64::new(0),
        }
    }

    /// Marks ASINs whose fetch fails individually, exercising the
    /// per-product isolation path.
    pub fn with_failing(mut self, failing: impl IntoIterator<Item = Asin>) -> Self {
        self.failing = failing.into_iter().collect();
        self
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CatalogApi for MockCatalogApi {
    async fn discover_category(&self, _category_id: i64) -> Result<Vec<Asin>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.products.keys().cloned().collect())
    }

    async fn fetch_products(&self, asins: &[Asin], _include_history: bool) -> Result<FetchOutcome> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let mut outcome = FetchOutcome::default();
        for asin in asins {
            if self.failing.contains(asin) {
                outcome.failures.push(FetchFailure {
                    asin: Some(asin.to_string()),
                    reason: "mock: record marked as failing".to_string(),
                });
                continue;
            }
            match self.products.get(asin) {
                Some(record) => outcome.records.push(record.clone()),
                None => outcome.failures.push(FetchFailure {
                    asin: Some(asin.to_string()),
                    reason: "mock: unknown ASIN".to_string(),
                }),
            }
        }
        outcome.tokens_consumed = 2.0 * asins.len() as f64;
        Ok(outcome)
    }

    async fn health_check(&self) -> Result<ApiHealth> {
        Ok(ApiHealth {
            tokens_left: 1000.0,
            refill_per_minute: 21.0,
            last_error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nicheradar_core::{Fulfillment, StockStatus};

    pub fn record(asin: &str) -> ProductRecord {
        ProductRecord {
            asin: Asin::parse(asin).unwrap(),
            title: Some("Widget".to_string()),
            brand: Some("Acme".to_string()),
            manufacturer: None,
            category_id: Some(10),
            category_path: vec!["Tools".to_string()],
            dimensions: None,
            price_current: Some(25.0),
            price_list: None,
            price_lowest_new: None,
            price_lowest_used: None,
            currency: "USD".to_string(),
            coupon_amount: None,
            coupon_pct: None,
            rank_primary: Some(4000),
            rank_category: Some("Tools".to_string()),
            rank_secondary: None,
            stock_status: StockStatus::InStock,
            stock_quantity: Some(40),
            seller_count: Some(3),
            fulfillment: Fulfillment::Fba,
            rating_avg: Some(4.1),
            rating_count: Some(500),
            review_count: Some(450),
            star_pct: Some([6.0, 7.0, 10.0, 27.0, 50.0]),
            captured_at: Utc::now(),
            reviews: Vec::new(),
        }
    }

    #[tokio::test]
    async fn fetch_isolates_failing_asins() {
        let good = record("B01ABCD234");
        let bad = record("B09XYZW111");
        let api = MockCatalogApi::new([good.clone(), bad.clone()])
            .with_failing([bad.asin.clone()]);

        let outcome = api
            .fetch_products(&[good.asin.clone(), bad.asin.clone()], false)
            .await
            .unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].asin.as_deref(), Some("B09XYZW111"));
    }
}
