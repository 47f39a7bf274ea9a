//! Mapping from connector records into store payloads.

use nicheradar_connector::records::{ProductRecord, ReviewRecord};
use nicheradar_market_data::catalog::ProductUpsert;
use nicheradar_market_data::reviews::NewReview;
use nicheradar_market_data::snapshots::NewSnapshot;

pub fn to_upsert(record: &ProductRecord) -> ProductUpsert {
    ProductUpsert {
        asin: record.asin.clone(),
        title: record.title.clone(),
        brand: record.brand.clone(),
        manufacturer: record.manufacturer.clone(),
        category_id: record.category_id,
        category_path: record.category_path.clone(),
        dimensions: record.dimensions.clone(),
    }
}

pub fn to_snapshot(record: &ProductRecord) -> NewSnapshot {
    NewSnapshot {
        asin: record.asin.clone(),
        captured_at: record.captured_at,
        price_current: record.price_current,
        price_list: record.price_list,
        price_lowest_new: record.price_lowest_new,
        price_lowest_used: record.price_lowest_used,
        currency: record.currency.clone(),
        coupon_amount: record.coupon_amount,
        coupon_pct: record.coupon_pct,
        rank_primary: record.rank_primary,
        rank_category: record.rank_category.clone(),
        rank_secondary: record.rank_secondary,
        stock_status: record.stock_status,
        stock_quantity: record.stock_quantity,
        seller_count: record.seller_count,
        fulfillment: record.fulfillment,
        rating_avg: record.rating_avg,
        rating_count: record.rating_count,
        review_count: record.review_count,
        star_pct: record.star_pct,
    }
}

pub fn to_reviews(record: &ProductRecord) -> Vec<NewReview> {
    record
        .reviews
        .iter()
        .map(|review: &ReviewRecord| NewReview {
            review_id: review.review_id.clone(),
            asin: record.asin.clone(),
            title: review.title.clone(),
            body: review.body.clone(),
            rating: review.rating,
            verified: review.verified,
            review_date: review.review_date,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nicheradar_core::{Asin, Fulfillment, StockStatus};

    fn record() -> ProductRecord {
        ProductRecord {
            asin: Asin::parse("B01ABCD234").unwrap(),
            title: Some("Widget".to_string()),
            brand: Some("Acme".to_string()),
            manufacturer: Some("Acme Mfg".to_string()),
            category_id: Some(42),
            category_path: vec!["Tools".to_string(), "Widgets".to_string()],
            dimensions: None,
            price_current: Some(19.99),
            price_list: Some(24.99),
            price_lowest_new: None,
            price_lowest_used: None,
            currency: "USD".to_string(),
            coupon_amount: None,
            coupon_pct: None,
            rank_primary: Some(3200),
            rank_category: Some("Tools".to_string()),
            rank_secondary: None,
            stock_status: StockStatus::InStock,
            stock_quantity: Some(12),
            seller_count: Some(5),
            fulfillment: Fulfillment::Fba,
            rating_avg: Some(4.0),
            rating_count: Some(220),
            review_count: Some(200),
            star_pct: Some([5.0, 8.0, 12.0, 25.0, 50.0]),
            captured_at: Utc::now(),
            reviews: vec![ReviewRecord {
                review_id: "R1".to_string(),
                title: None,
                body: Some("it rattles".to_string()),
                rating: Some(2.0),
                verified: true,
                review_date: None,
            }],
        }
    }

    #[test]
    fn snapshot_mapping_preserves_observation_fields() {
        let record = record();
        let snapshot = to_snapshot(&record);
        assert_eq!(snapshot.asin, record.asin);
        assert_eq!(snapshot.price_current, Some(19.99));
        assert_eq!(snapshot.rank_primary, Some(3200));
        assert_eq!(snapshot.stock_status, StockStatus::InStock);
        assert_eq!(snapshot.star_pct, Some([5.0, 8.0, 12.0, 25.0, 50.0]));
    }

    #[test]
    fn review_mapping_carries_the_product_asin() {
        let record = record();
        let reviews = to_reviews(&record);
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].asin, record.asin);
        assert_eq!(reviews[0].review_id, "R1");
    }
}
