//! Pipeline run records: one row per invocation, owned exclusively by the
//! orchestrator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nicheradar_core::{DatabasePool, Result, RunId, RunStatus};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Audit record of one pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PipelineRun {
    pub run_id: RunId,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub asins_total: i32,
    pub asins_ok: i32,
    pub asins_failed: i32,
    pub asins_skipped: i32,
    /// Phase name to elapsed milliseconds
    pub phase_timings: serde_json::Value,
    pub tokens_consumed: f64,
    pub dq_price_missing_pct: Option<f64>,
    pub dq_rank_missing_pct: Option<f64>,
    pub dq_review_missing_pct: Option<f64>,
    pub dq_passed: Option<bool>,
    pub error_rate: Option<f64>,
    pub error_budget_breached: Option<bool>,
    pub shortlist_frozen: bool,
    pub config_snapshot: serde_json::Value,
    pub error_message: Option<String>,
    pub failed_asins: Vec<String>,
    pub opportunities_found: i32,
}

impl PipelineRun {
    pub fn new(run_id: RunId, config_snapshot: serde_json::Value) -> Self {
        Self {
            run_id,
            status: RunStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            asins_total: 0,
            asins_ok: 0,
            asins_failed: 0,
            asins_skipped: 0,
            phase_timings: serde_json::json!({}),
            tokens_consumed: 0.0,
            dq_price_missing_pct: None,
            dq_rank_missing_pct: None,
            dq_review_missing_pct: None,
            dq_passed: None,
            error_rate: None,
            error_budget_breached: None,
            shortlist_frozen: false,
            config_snapshot,
            error_message: None,
            failed_asins: Vec::new(),
            opportunities_found: 0,
        }
    }
}

#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Records the pre-flight `running` row.
    async fn create_run(&self, run: &PipelineRun) -> Result<()>;

    /// Writes the finalized run state over the running row.
    async fn finalize_run(&self, run: &PipelineRun) -> Result<()>;

    async fn get_run(&self, run_id: RunId) -> Result<Option<PipelineRun>>;

    async fn latest_run(&self) -> Result<Option<PipelineRun>>;
}

pub struct PostgresRunRepository {
    db: DatabasePool,
}

impl PostgresRunRepository {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RunRepository for PostgresRunRepository {
    async fn create_run(&self, run: &PipelineRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pipeline_runs (
                run_id, status, started_at, phase_timings, tokens_consumed,
                shortlist_frozen, config_snapshot, failed_asins,
                asins_total, asins_ok, asins_failed, asins_skipped,
                opportunities_found
            ) VALUES ($1, $2, $3, $4, 0, FALSE, $5, '{}', 0, 0, 0, 0, 0)
            "#,
        )
        .bind(run.run_id)
        .bind(run.status)
        .bind(run.started_at)
        .bind(&run.phase_timings)
        .bind(&run.config_snapshot)
        .execute(self.db.get())
        .await?;
        Ok(())
    }

    async fn finalize_run(&self, run: &PipelineRun) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE pipeline_runs SET
                status = $2,
                ended_at = $3,
                asins_total = $4,
                asins_ok = $5,
                asins_failed = $6,
                asins_skipped = $7,
                phase_timings = $8,
                tokens_consumed = $9,
                dq_price_missing_pct = $10,
                dq_rank_missing_pct = $11,
                dq_review_missing_pct = $12,
                dq_passed = $13,
                error_rate = $14,
                error_budget_breached = $15,
                shortlist_frozen = $16,
                error_message = $17,
                failed_asins = $18,
                opportunities_found = $19
            WHERE run_id = $1
            "#,
        )
        .bind(run.run_id)
        .bind(run.status)
        .bind(run.ended_at)
        .bind(run.asins_total)
        .bind(run.asins_ok)
        .bind(run.asins_failed)
        .bind(run.asins_skipped)
        .bind(&run.phase_timings)
        .bind(run.tokens_consumed)
        .bind(run.dq_price_missing_pct)
        .bind(run.dq_rank_missing_pct)
        .bind(run.dq_review_missing_pct)
        .bind(run.dq_passed)
        .bind(run.error_rate)
        .bind(run.error_budget_breached)
        .bind(run.shortlist_frozen)
        .bind(&run.error_message)
        .bind(&run.failed_asins)
        .bind(run.opportunities_found)
        .execute(self.db.get())
        .await?;
        Ok(())
    }

    async fn get_run(&self, run_id: RunId) -> Result<Option<PipelineRun>> {
        let run = sqlx::query_as::<_, PipelineRun>(
            "SELECT * FROM pipeline_runs WHERE run_id = $1",
        )
        .bind(run_id)
        .fetch_optional(self.db.get())
        .await?;
        Ok(run)
    }

    async fn latest_run(&self) -> Result<Option<PipelineRun>> {
        let run = sqlx::query_as::<_, PipelineRun>(
            "SELECT * FROM pipeline_runs ORDER BY started_at DESC LIMIT 1",
        )
        .fetch_optional(self.db.get())
        .await?;
        Ok(run)
    }
}
