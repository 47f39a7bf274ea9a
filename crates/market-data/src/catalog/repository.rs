//! Catalog data access: idempotent upserts and freshness queries.

use crate::catalog::model::{Product, ProductUpsert};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use nicheradar_core::{Asin, DatabasePool, Result};
use tracing::debug;

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Idempotent upsert of catalog rows. Touches `last_seen_at` on every
    /// sighting; identity fields are refreshed from the latest record.
    async fn upsert_products(&self, products: &[ProductUpsert]) -> Result<u64>;

    /// Marks the observation refresh time after snapshots are stored.
    async fn mark_refreshed(&self, asins: &[Asin], refreshed_at: DateTime<Utc>) -> Result<()>;

    async fn get_product(&self, asin: &Asin) -> Result<Option<Product>>;

    /// All active, non-deleted ASINs, highest tracking priority first.
    async fn tracked_asins(&self) -> Result<Vec<Asin>>;

    /// Number of active, non-deleted catalog rows.
    async fn count_active(&self) -> Result<i64>;

    /// Subset of `candidates` whose last refresh is older than the
    /// freshness threshold (or that were never refreshed).
    async fn filter_stale(&self, candidates: &[Asin], threshold_hours: i64) -> Result<Vec<Asin>>;

    /// Soft delete: the row survives with `deleted_at` set.
    async fn soft_delete(&self, asin: &Asin) -> Result<()>;
}

pub struct PostgresCatalogRepository {
    db: DatabasePool,
}

impl PostgresCatalogRepository {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CatalogRepository for PostgresCatalogRepository {
    async fn upsert_products(&self, products: &[ProductUpsert]) -> Result<u64> {
        let mut upserted = 0u64;
        for product in products {
            let result = sqlx::query(
                r#"
                INSERT INTO products (
                    asin, title, brand, manufacturer, category_id, category_path,
                    dimensions, is_active, tracking_priority, first_seen_at, last_seen_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, 5, NOW(), NOW())
                ON CONFLICT (asin) DO UPDATE SET
                    title = COALESCE(EXCLUDED.title, products.title),
                    brand = COALESCE(EXCLUDED.brand, products.brand),
                    manufacturer = COALESCE(EXCLUDED.manufacturer, products.manufacturer),
                    category_id = COALESCE(EXCLUDED.category_id, products.category_id),
                    category_path = CASE
                        WHEN cardinality(EXCLUDED.category_path) > 0 THEN EXCLUDED.category_path
                        ELSE products.category_path
                    END,
                    dimensions = COALESCE(EXCLUDED.dimensions, products.dimensions),
                    last_seen_at = NOW()
                "#,
            )
            .bind(&product.asin)
            .bind(&product.title)
            .bind(&product.brand)
            .bind(&product.manufacturer)
            .bind(product.category_id)
            .bind(&product.category_path)
            .bind(&product.dimensions)
            .execute(self.db.get())
            .await?;
            upserted += result.rows_affected();
        }
        debug!(count = upserted, "catalog upsert complete");
        Ok(upserted)
    }

    async fn mark_refreshed(&self, asins: &[Asin], refreshed_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE products SET last_updated_at = $2 WHERE asin = ANY($1)")
            .bind(asins)
            .bind(refreshed_at)
            .execute(self.db.get())
            .await?;
        Ok(())
    }

    async fn get_product(&self, asin: &Asin) -> Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE asin = $1",
        )
        .bind(asin)
        .fetch_optional(self.db.get())
        .await?;
        Ok(product)
    }

    async fn tracked_asins(&self) -> Result<Vec<Asin>> {
        let asins = sqlx::query_scalar::<_, Asin>(
            r#"
            SELECT asin FROM products
            WHERE is_active AND deleted_at IS NULL
            ORDER BY tracking_priority DESC, asin
            "#,
        )
        .fetch_all(self.db.get())
        .await?;
        Ok(asins)
    }

    async fn count_active(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM products WHERE is_active AND deleted_at IS NULL",
        )
        .fetch_one(self.db.get())
        .await?;
        Ok(count)
    }

    async fn filter_stale(&self, candidates: &[Asin], threshold_hours: i64) -> Result<Vec<Asin>> {
        let cutoff = Utc::now() - Duration::hours(threshold_hours);
        let stale = sqlx::query_scalar::<_, Asin>(
            r#"
            SELECT c.asin
            FROM unnest($1::text[]) AS c(asin)
            LEFT JOIN products p ON p.asin = c.asin
            WHERE p.asin IS NULL
               OR p.last_updated_at IS NULL
               OR p.last_updated_at < $2
            "#,
        )
        .bind(candidates)
        .bind(cutoff)
        .fetch_all(self.db.get())
        .await?;
        Ok(stale)
    }

    async fn soft_delete(&self, asin: &Asin) -> Result<()> {
        sqlx::query(
            "UPDATE products SET is_active = FALSE, deleted_at = NOW() WHERE asin = $1 AND deleted_at IS NULL",
        )
        .bind(asin)
        .execute(self.db.get())
        .await?;
        Ok(())
    }
}
