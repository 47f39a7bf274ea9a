//! Review storage and per-run extraction artifacts.

use crate::reviews::model::{
    DefectSignal, FeatureRequest, ImprovementProfile, NewReview, Review,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nicheradar_core::{Asin, DatabasePool, Result, RunId};
use tracing::debug;

#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Stores incoming reviews; replays collapse on the review id.
    async fn insert_reviews(&self, reviews: &[NewReview]) -> Result<u64>;

    /// All stored reviews for a product, oldest first.
    async fn reviews_for(&self, asin: &Asin) -> Result<Vec<Review>>;

    async fn mark_analyzed(&self, review_ids: &[String], analyzed_at: DateTime<Utc>) -> Result<()>;

    /// Persists the improvement profile with its detail rows for one
    /// `(product, run)`. Replays collapse on the profile's unique pair.
    async fn save_profile(
        &self,
        profile: &ImprovementProfile,
        defects: &[DefectSignal],
        wishes: &[FeatureRequest],
    ) -> Result<()>;

    async fn get_profile(&self, asin: &Asin, run_id: RunId) -> Result<Option<ImprovementProfile>>;
}

pub struct PostgresReviewRepository {
    db: DatabasePool,
}

impl PostgresReviewRepository {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReviewRepository for PostgresReviewRepository {
    async fn insert_reviews(&self, reviews: &[NewReview]) -> Result<u64> {
        let mut inserted = 0u64;
        for review in reviews {
            let result = sqlx::query(
                r#"
                INSERT INTO reviews (
                    review_id, asin, title, body, rating, verified,
                    review_date, captured_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
                ON CONFLICT (review_id) DO NOTHING
                "#,
            )
            .bind(&review.review_id)
            .bind(&review.asin)
            .bind(&review.title)
            .bind(&review.body)
            .bind(review.rating)
            .bind(review.verified)
            .bind(review.review_date)
            .execute(self.db.get())
            .await?;
            inserted += result.rows_affected();
        }
        debug!(count = inserted, "reviews stored");
        Ok(inserted)
    }

    async fn reviews_for(&self, asin: &Asin) -> Result<Vec<Review>> {
        let reviews = sqlx::query_as::<_, Review>(
            r#"
            SELECT * FROM reviews
            WHERE asin = $1
            ORDER BY review_date NULLS LAST, review_id
            "#,
        )
        .bind(asin)
        .fetch_all(self.db.get())
        .await?;
        Ok(reviews)
    }

    async fn mark_analyzed(&self, review_ids: &[String], analyzed_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE reviews SET analyzed_at = $2 WHERE review_id = ANY($1)")
            .bind(review_ids)
            .bind(analyzed_at)
            .execute(self.db.get())
            .await?;
        Ok(())
    }

    async fn save_profile(
        &self,
        profile: &ImprovementProfile,
        defects: &[DefectSignal],
        wishes: &[FeatureRequest],
    ) -> Result<()> {
        let mut tx = self.db.get().begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO improvement_profiles (
                asin, run_id, top_defects, missing_features, dominant_pain,
                improvement_score, reviews_analyzed, negative_reviews_analyzed,
                reviews_ready
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (asin, run_id) DO NOTHING
            "#,
        )
        .bind(&profile.asin)
        .bind(profile.run_id)
        .bind(&profile.top_defects)
        .bind(&profile.missing_features)
        .bind(profile.dominant_pain)
        .bind(profile.improvement_score)
        .bind(profile.reviews_analyzed)
        .bind(profile.negative_reviews_analyzed)
        .bind(profile.reviews_ready)
        .execute(&mut *tx)
        .await?;

        // Replayed run: the profile and its detail rows already exist.
        if result.rows_affected() == 0 {
            tx.commit().await?;
            return Ok(());
        }

        for signal in defects {
            sqlx::query(
                r#"
                INSERT INTO review_defect_signals (
                    asin, run_id, defect_type, frequency, severity_score,
                    example_quotes, reviews_scanned, negative_reviews_scanned
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(&profile.asin)
            .bind(profile.run_id)
            .bind(signal.defect_type)
            .bind(signal.frequency)
            .bind(signal.severity_score)
            .bind(&signal.example_quotes)
            .bind(signal.reviews_scanned)
            .bind(signal.negative_reviews_scanned)
            .execute(&mut *tx)
            .await?;
        }

        for wish in wishes {
            sqlx::query(
                r#"
                INSERT INTO review_feature_requests (
                    asin, run_id, phrase, mentions, confidence, source_quotes
                ) VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(&profile.asin)
            .bind(profile.run_id)
            .bind(&wish.phrase)
            .bind(wish.mentions)
            .bind(wish.confidence)
            .bind(&wish.source_quotes)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_profile(&self, asin: &Asin, run_id: RunId) -> Result<Option<ImprovementProfile>> {
        let profile = sqlx::query_as::<_, ImprovementProfile>(
            "SELECT * FROM improvement_profiles WHERE asin = $1 AND run_id = $2",
        )
        .bind(asin)
        .bind(run_id)
        .fetch_optional(self.db.get())
        .await?;
        Ok(profile)
    }
}
