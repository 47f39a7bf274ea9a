//! Artifact persistence. Artifacts are immutable: insert-only, with
//! replays collapsing on the `(run_id, asin)` unique pair. Only the run
//! orchestrator writes here.

use crate::scoring::model::OpportunityArtifact;
use async_trait::async_trait;
use nicheradar_core::{Asin, DatabasePool, Result, RunId};
use tracing::debug;

#[async_trait]
pub trait ArtifactRepository: Send + Sync {
    async fn insert_artifacts(&self, artifacts: &[OpportunityArtifact]) -> Result<u64>;

    /// All artifacts of a run, best rank first, rejected ones last.
    async fn artifacts_for_run(&self, run_id: RunId) -> Result<Vec<OpportunityArtifact>>;

    async fn artifacts_by_asin(
        &self,
        run_id: RunId,
        asins: &[Asin],
    ) -> Result<Vec<OpportunityArtifact>>;
}

pub struct PostgresArtifactRepository {
    db: DatabasePool,
}

impl PostgresArtifactRepository {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ArtifactRepository for PostgresArtifactRepository {
    async fn insert_artifacts(&self, artifacts: &[OpportunityArtifact]) -> Result<u64> {
        let mut inserted = 0u64;
        for artifact in artifacts {
            let result = sqlx::query(
                r#"
                INSERT INTO opportunity_artifacts (
                    run_id, asin, rank_in_run, final_score, base_score,
                    time_multiplier, components, time_factors, signals_for,
                    signals_against, thesis, action, monthly_profit,
                    annual_value, risk_adjusted_value, rank_score, window_days,
                    urgency, rejected, rejection_reason, inputs_hash, price_at,
                    review_count_at, rating_at, rank_at, scored_at
                ) VALUES (
                    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24,
                    $25, $26
                )
                ON CONFLICT (run_id, asin) DO NOTHING
                "#,
            )
            .bind(artifact.run_id)
            .bind(&artifact.asin)
            .bind(artifact.rank_in_run)
            .bind(artifact.final_score)
            .bind(artifact.base_score)
            .bind(artifact.time_multiplier)
            .bind(&artifact.components)
            .bind(&artifact.time_factors)
            .bind(&artifact.signals_for)
            .bind(&artifact.signals_against)
            .bind(&artifact.thesis)
            .bind(&artifact.action)
            .bind(artifact.monthly_profit)
            .bind(artifact.annual_value)
            .bind(artifact.risk_adjusted_value)
            .bind(artifact.rank_score)
            .bind(artifact.window_days)
            .bind(artifact.urgency)
            .bind(artifact.rejected)
            .bind(&artifact.rejection_reason)
            .bind(&artifact.inputs_hash)
            .bind(artifact.price_at)
            .bind(artifact.review_count_at)
            .bind(artifact.rating_at)
            .bind(artifact.rank_at)
            .bind(artifact.scored_at)
            .execute(self.db.get())
            .await?;
            inserted += result.rows_affected();
        }
        debug!(count = inserted, "artifacts stored");
        Ok(inserted)
    }

    async fn artifacts_for_run(&self, run_id: RunId) -> Result<Vec<OpportunityArtifact>> {
        let artifacts = sqlx::query_as::<_, OpportunityArtifact>(
            r#"
            SELECT * FROM opportunity_artifacts
            WHERE run_id = $1
            ORDER BY rejected ASC, rank_in_run NULLS LAST, rank_score DESC
            "#,
        )
        .bind(run_id)
        .fetch_all(self.db.get())
        .await?;
        Ok(artifacts)
    }

    async fn artifacts_by_asin(
        &self,
        run_id: RunId,
        asins: &[Asin],
    ) -> Result<Vec<OpportunityArtifact>> {
        let artifacts = sqlx::query_as::<_, OpportunityArtifact>(
            r#"
            SELECT * FROM opportunity_artifacts
            WHERE run_id = $1 AND asin = ANY($2)
            "#,
        )
        .bind(run_id)
        .bind(asins)
        .fetch_all(self.db.get())
        .await?;
        Ok(artifacts)
    }
}
