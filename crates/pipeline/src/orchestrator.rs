//! The controlled run orchestrator.
//!
//! Phases run sequentially: pre-flight, discovery, freshness filter,
//! batched fetch, store, data-quality gate, scoring, aggregates refresh,
//! finalize. Per-product failures are isolated into the run's failed list;
//! batch failures retry once; fatal and integrity errors abort the run.
//! A degraded or failed run freezes the shortlist: the previously active
//! snapshot keeps serving.

use crate::audit::AuditWriter;
use crate::dq::{error_rate, evaluate_dq, resolve_status};
use crate::ingest::{to_reviews, to_snapshot, to_upsert};
use crate::run::{PipelineRun, PostgresRunRepository, RunRepository};
use chrono::{Duration as ChronoDuration, Utc};
use nicheradar_connector::records::{FetchFailure, ProductRecord};
use nicheradar_connector::CatalogApi;
use nicheradar_core::{Asin, Config, DatabasePool, Error, Result, RunId, RunStatus};
use nicheradar_market_data::catalog::{CatalogRepository, PostgresCatalogRepository};
use nicheradar_market_data::events::{EventRepository, PostgresEventRepository};
use nicheradar_market_data::reviews::{
    DefectLexicon, PostgresReviewRepository, ReviewExtractor, ReviewRepository,
};
use nicheradar_market_data::scoring::{
    ArtifactRepository, OpportunityScorer, PostgresArtifactRepository, ScoringInputs,
};
use nicheradar_market_data::shortlist::{
    assign_ranks, NewShortlistSnapshot, PostgresShortlistRepository, ShortlistEntry,
    ShortlistRepository, ShortlistSelector,
};
use nicheradar_market_data::snapshots::{
    PostgresSnapshotRepository, SnapshotRepository, Snapshot, Stats30d,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Per-invocation options from the CLI or the trigger endpoint.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Pre-allocated run id (the trigger endpoint needs it up front)
    pub run_id: Option<RunId>,
    /// Overrides `ingestion.max_products`
    pub max_asins: Option<usize>,
    /// Operator freeze override: record the shortlist but do not activate.
    /// Falls back to `ingestion.freeze_shortlist` when unset.
    pub freeze: Option<bool>,
    /// Use tracked catalog products instead of category discovery
    pub skip_discovery: bool,
    /// Explicit product list, bypassing discovery entirely
    pub asins: Option<Vec<Asin>>,
}

/// Outcome summary returned to the caller.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    pub status: RunStatus,
    pub asins_ok: usize,
    pub asins_failed: usize,
    pub opportunities_found: usize,
    pub shortlist_size: usize,
}

pub struct Orchestrator {
    config: Config,
    api: Arc<dyn CatalogApi>,
    catalog: Arc<dyn CatalogRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
    events: Arc<dyn EventRepository>,
    reviews: Arc<dyn ReviewRepository>,
    artifacts: Arc<dyn ArtifactRepository>,
    shortlists: Arc<dyn ShortlistRepository>,
    runs: Arc<dyn RunRepository>,
    audit: AuditWriter,
    lexicon: DefectLexicon,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Wires the orchestrator against Postgres-backed repositories.
    pub fn postgres(
        config: Config,
        api: Arc<dyn CatalogApi>,
        db: DatabasePool,
        cancel: CancellationToken,
    ) -> Self {
        let audit = AuditWriter::new(&config.ingestion.audit_dir);
        Self {
            api,
            catalog: Arc::new(PostgresCatalogRepository::new(db.clone())),
            snapshots: Arc::new(PostgresSnapshotRepository::new(db.clone())),
            events: Arc::new(PostgresEventRepository::new(db.clone())),
            reviews: Arc::new(PostgresReviewRepository::new(db.clone())),
            artifacts: Arc::new(PostgresArtifactRepository::new(db.clone())),
            shortlists: Arc::new(PostgresShortlistRepository::new(db.clone())),
            runs: Arc::new(PostgresRunRepository::new(db)),
            audit,
            lexicon: DefectLexicon::standard(),
            cancel,
            config,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Executes one complete pipeline run. The returned report mirrors the
    /// persisted run row; failures inside the run surface as a `failed`
    /// status rather than an error, so the audit trail is always written.
    pub async fn run(&self, options: RunOptions) -> Result<RunReport> {
        let run_id = options.run_id.unwrap_or_default();
        let mut config_snapshot = self.config.snapshot();
        config_snapshot["lexicon_version"] = serde_json::json!(self.lexicon.version);

        let mut run = PipelineRun::new(run_id, config_snapshot);
        self.runs.create_run(&run).await?;
        info!(run_id = %run_id, "pipeline run started");

        let shortlist = match self.execute(&mut run, &options).await {
            Ok(entries) => entries,
            Err(e) => {
                error!(run_id = %run_id, error = %e, "pipeline run failed");
                run.status = RunStatus::Failed;
                run.shortlist_frozen = true;
                run.error_message = Some(e.to_string());
                Vec::new()
            }
        };

        run.ended_at = Some(Utc::now());
        self.runs.finalize_run(&run).await?;
        if let Err(e) = self.audit.write_run(&run) {
            warn!(error = %e, "audit record not written");
        }
        if let Err(e) = self.audit.write_shortlist(run_id, &shortlist) {
            warn!(error = %e, "shortlist record not written");
        }

        info!(
            run_id = %run_id,
            status = ?run.status,
            ok = run.asins_ok,
            failed = run.asins_failed,
            opportunities = run.opportunities_found,
            "pipeline run finished"
        );
        Ok(RunReport {
            run_id,
            status: run.status,
            asins_ok: run.asins_ok as usize,
            asins_failed: run.asins_failed as usize,
            opportunities_found: run.opportunities_found as usize,
            shortlist_size: shortlist.len(),
        })
    }

    async fn execute(
        &self,
        run: &mut PipelineRun,
        options: &RunOptions,
    ) -> Result<Vec<ShortlistEntry>> {
        let ingestion = &self.config.ingestion;
        let mut timings = serde_json::Map::new();

        // Pre-flight: the external API must be reachable before anything
        // is ingested.
        let health = self
            .api
            .health_check()
            .await
            .map_err(|e| Error::fatal(format!("external API health check failed: {e}")))?;
        info!(
            tokens_left = health.tokens_left,
            refill_per_minute = health.refill_per_minute,
            "external API healthy"
        );

        // Phase 1: discovery.
        if self.check_cancelled(run) {
            return Ok(Vec::new());
        }
        let phase = Instant::now();
        let candidates = self.discover(options).await?;
        record_timing(&mut timings, "discovery", phase);
        info!(candidates = candidates.len(), "discovery complete");

        // Phase 2: freshness filter and cap.
        let phase = Instant::now();
        let stale = self
            .catalog
            .filter_stale(&candidates, ingestion.freshness_threshold_hours)
            .await?;
        let cap = options.max_asins.unwrap_or(ingestion.max_products);
        let mut targets = stale;
        targets.truncate(cap);
        run.asins_total = targets.len() as i32;
        run.asins_skipped = (candidates.len() - targets.len()) as i32;
        record_timing(&mut timings, "freshness_filter", phase);
        info!(
            targets = targets.len(),
            skipped = run.asins_skipped,
            "freshness filter complete"
        );

        // Phase 3: batched fetch with isolated failures.
        if self.check_cancelled(run) {
            run.phase_timings = serde_json::Value::Object(timings);
            return Ok(Vec::new());
        }
        let phase = Instant::now();
        let (records, failures, cancelled_in_fetch) = self.fetch(&targets, run).await?;
        run.asins_ok = records.len() as i32;
        run.asins_failed = failures.len() as i32;
        run.failed_asins = failures
            .iter()
            .map(|f| f.asin.clone().unwrap_or_else(|| "unknown".to_string()))
            .collect();
        record_timing(&mut timings, "fetch", phase);
        info!(
            fetched = records.len(),
            failed = failures.len(),
            tokens = run.tokens_consumed,
            "fetch complete"
        );
        if cancelled_in_fetch {
            run.status = RunStatus::Cancelled;
            run.phase_timings = serde_json::Value::Object(timings);
            return Ok(Vec::new());
        }

        // Phase 4: store. Delta and event generation are side-effects of
        // the snapshot insert.
        let phase = Instant::now();
        self.store(&records, run.run_id).await?;
        record_timing(&mut timings, "store", phase);

        // Phase 5: data-quality gate.
        let phase = Instant::now();
        let counts = self.snapshots.dq_counts(run.run_id).await?;
        let dq = evaluate_dq(&counts, ingestion.dq_threshold_pct);
        run.dq_price_missing_pct = Some(dq.price_missing_pct);
        run.dq_rank_missing_pct = Some(dq.rank_missing_pct);
        run.dq_review_missing_pct = Some(dq.review_missing_pct);
        run.dq_passed = Some(dq.passed);
        record_timing(&mut timings, "dq_gate", phase);
        if !dq.passed {
            warn!(
                price = dq.price_missing_pct,
                rank = dq.rank_missing_pct,
                review = dq.review_missing_pct,
                "data-quality gate failed"
            );
        }

        // Phase 6: scoring.
        if self.check_cancelled(run) {
            run.phase_timings = serde_json::Value::Object(timings);
            return Ok(Vec::new());
        }
        let phase = Instant::now();
        let artifacts = self.score(&records, run).await?;
        run.opportunities_found = artifacts.iter().filter(|a| !a.rejected).count() as i32;
        record_timing(&mut timings, "scoring", phase);
        info!(
            scored = artifacts.len(),
            opportunities = run.opportunities_found,
            "scoring complete"
        );

        // Phase 7: aggregates refresh, non-exclusive. A refresh failure
        // degrades the read surface, not the run.
        let phase = Instant::now();
        if let Err(e) = self.snapshots.refresh_aggregates().await {
            warn!(error = %e, "aggregate refresh failed");
        }
        record_timing(&mut timings, "refresh_aggregates", phase);

        // Phase 8: finalize.
        let phase = Instant::now();
        let rate = error_rate(run.asins_failed as usize, run.asins_total as usize);
        let breached = rate >= ingestion.error_budget_threshold;
        run.error_rate = Some(rate);
        run.error_budget_breached = Some(breached);
        run.status = resolve_status(dq.passed, breached);

        let freeze_requested = options
            .freeze
            .unwrap_or(self.config.ingestion.freeze_shortlist);
        let healthy = run.status == RunStatus::Completed && !freeze_requested;
        run.shortlist_frozen = !healthy;

        let previous = self.shortlists.active_asins().await?;
        let selection = ShortlistSelector::new(&self.config.shortlist).select(&artifacts, &previous);
        let snapshot = NewShortlistSnapshot {
            run_id: run.run_id,
            asins: selection.entries.iter().map(|e| e.asin.clone()).collect(),
            scores: selection.entries.iter().map(|e| e.final_score).collect(),
            total_potential_value: selection.total_potential_value,
            added: selection.added.clone(),
            removed: selection.removed.clone(),
            stability: selection.stability,
            frozen: !healthy,
        };
        self.shortlists.insert_snapshot(&snapshot, healthy).await?;
        record_timing(&mut timings, "finalize", phase);

        run.phase_timings = serde_json::Value::Object(timings);
        Ok(selection.entries)
    }

    /// Candidate products: an explicit list, the tracked catalog, or
    /// category discovery. A discovery timeout degrades to the tracked
    /// catalog rather than failing the run.
    async fn discover(&self, options: &RunOptions) -> Result<Vec<Asin>> {
        if let Some(asins) = &options.asins {
            return Ok(asins.clone());
        }
        if options.skip_discovery {
            return self.catalog.tracked_asins().await;
        }

        let deadline = std::time::Duration::from_secs(self.config.ingestion.discovery_timeout_secs);
        match timeout(
            deadline,
            self.api.discover_category(self.config.ingestion.category_id),
        )
        .await
        {
            Ok(Ok(asins)) => Ok(asins),
            Ok(Err(e)) if e.aborts_run() => Err(e),
            Ok(Err(e)) => {
                warn!(error = %e, "discovery failed, falling back to tracked products");
                self.catalog.tracked_asins().await
            }
            Err(_) => {
                warn!("discovery timed out, falling back to tracked products");
                self.catalog.tracked_asins().await
            }
        }
    }

    /// Fetches targets in batches. One batch-level failure retries once;
    /// a second failure records the whole batch as failed products.
    /// Cancellation finishes the current batch and exits.
    async fn fetch(
        &self,
        targets: &[Asin],
        run: &mut PipelineRun,
    ) -> Result<(Vec<ProductRecord>, Vec<FetchFailure>, bool)> {
        let ingestion = &self.config.ingestion;
        let per_1k = ingestion.fetch_timeout_secs_per_1k;
        let budget_secs = per_1k * (targets.len() as u64 / 1000 + 1);
        let deadline = Instant::now() + std::time::Duration::from_secs(budget_secs);

        let mut records = Vec::with_capacity(targets.len());
        let mut failures = Vec::new();
        let mut cancelled = false;

        for batch in targets.chunks(ingestion.batch_size) {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            if Instant::now() > deadline {
                warn!(
                    fetched = records.len(),
                    remaining = targets.len() - records.len() - failures.len(),
                    "fetch phase deadline reached, promoting partial results"
                );
                break;
            }

            let outcome = match self.api.fetch_products(batch, true).await {
                Ok(outcome) => outcome,
                Err(e) if e.aborts_run() => return Err(e),
                Err(first) => {
                    warn!(error = %first, "batch fetch failed, retrying once");
                    match self.api.fetch_products(batch, true).await {
                        Ok(outcome) => outcome,
                        Err(second) => {
                            warn!(error = %second, batch = batch.len(), "batch fetch failed twice");
                            failures.extend(batch.iter().map(|asin| FetchFailure {
                                asin: Some(asin.to_string()),
                                reason: second.to_string(),
                            }));
                            continue;
                        }
                    }
                }
            };

            run.tokens_consumed += outcome.tokens_consumed;
            records.extend(outcome.records);
            failures.extend(outcome.failures);
        }

        Ok((records, failures, cancelled))
    }

    async fn store(&self, records: &[ProductRecord], run_id: RunId) -> Result<()> {
        let upserts: Vec<_> = records.iter().map(to_upsert).collect();
        self.catalog.upsert_products(&upserts).await?;

        let snapshots: Vec<_> = records.iter().map(to_snapshot).collect();
        let summary = self.snapshots.insert_snapshots(&snapshots, run_id).await?;
        info!(
            inserted = summary.inserted,
            skipped = summary.skipped,
            price_events = summary.price_events,
            rank_events = summary.rank_events,
            stock_events = summary.stock_events,
            "snapshots stored"
        );

        let reviews: Vec<_> = records.iter().flat_map(to_reviews).collect();
        if !reviews.is_empty() {
            self.reviews.insert_reviews(&reviews).await?;
        }

        let refreshed: Vec<Asin> = records.iter().map(|r| r.asin.clone()).collect();
        self.catalog.mark_refreshed(&refreshed, Utc::now()).await?;
        Ok(())
    }

    /// Scores every freshly snapshotted product. Per-product failures are
    /// isolated; the phase deadline promotes partial results.
    async fn score(
        &self,
        records: &[ProductRecord],
        run: &mut PipelineRun,
    ) -> Result<Vec<nicheradar_market_data::OpportunityArtifact>> {
        let scorer = OpportunityScorer::new(&self.config.scoring);
        let extractor =
            ReviewExtractor::new(&self.lexicon, self.config.scoring.reviews_ready_floor);
        let deadline = Instant::now()
            + std::time::Duration::from_secs(self.config.ingestion.scoring_timeout_secs);

        let mut artifacts = Vec::with_capacity(records.len());
        let mut top10_cache: HashMap<i64, Option<f64>> = HashMap::new();

        for record in records {
            if Instant::now() > deadline {
                warn!(
                    scored = artifacts.len(),
                    remaining = records.len() - artifacts.len(),
                    "scoring phase deadline reached, promoting partial results"
                );
                break;
            }

            match self
                .collect_inputs(run.run_id, record, &extractor, &mut top10_cache)
                .await
            {
                Ok(inputs) => artifacts.push(scorer.score(run.run_id, &inputs, Utc::now())),
                Err(e) if e.aborts_run() => return Err(e),
                Err(e) => {
                    warn!(asin = %record.asin, error = %e, "scoring skipped for product");
                    run.asins_ok -= 1;
                    run.asins_failed += 1;
                    run.failed_asins.push(record.asin.to_string());
                }
            }
        }

        assign_ranks(&mut artifacts);
        self.artifacts.insert_artifacts(&artifacts).await?;
        Ok(artifacts)
    }

    /// Assembles the scoring input tuple: latest snapshot, live 7/30-day
    /// aggregates, recent stock events, and the review profile written in
    /// this run (consumed only when `reviews_ready`).
    async fn collect_inputs(
        &self,
        run_id: RunId,
        record: &ProductRecord,
        extractor: &ReviewExtractor<'_>,
        top10_cache: &mut HashMap<i64, Option<f64>>,
    ) -> Result<ScoringInputs> {
        let asin = &record.asin;
        let latest: Snapshot = self
            .snapshots
            .latest_snapshot(asin)
            .await?
            .ok_or_else(|| Error::integrity(format!("no snapshot stored for {asin}")))?;

        let reviews = self.reviews.reviews_for(asin).await?;
        let outcome = extractor.extract(&reviews);
        let profile = outcome.to_profile(asin.clone(), run_id);
        self.reviews
            .save_profile(&profile, &outcome.defects, &outcome.wishes)
            .await?;
        if !outcome.analyzed_review_ids.is_empty() {
            self.reviews
                .mark_analyzed(&outcome.analyzed_review_ids, Utc::now())
                .await?;
        }

        let stats7 = self.snapshots.stats_7d(asin).await?;
        let stats30 = self.snapshots.stats_30d(asin).await?;
        let since = Utc::now() - ChronoDuration::days(30);
        let stockouts = self.events.count_stockouts(asin, since).await?;

        let top10_avg_reviews = match record.category_id {
            Some(category_id) => match top10_cache.get(&category_id) {
                Some(cached) => *cached,
                None => {
                    let avg = self.snapshots.top10_avg_reviews(category_id).await?;
                    top10_cache.insert(category_id, avg);
                    avg
                }
            },
            None => None,
        };

        let negative_share_pct = match (latest.star1_pct, latest.star2_pct) {
            (Some(one), Some(two)) => Some(one + two),
            _ => None,
        };

        Ok(ScoringInputs {
            asin: asin.clone(),
            price: latest.price_current,
            rank: latest.rank_primary,
            review_count: latest.review_count,
            rating_avg: latest.rating_avg,
            seller_count: latest.seller_count,
            negative_share_pct,
            rank_trend_7d_pct: stats7.as_ref().and_then(|s| s.rank_trend_pct),
            rank_trend_30d_pct: stats30.as_ref().and_then(|s| s.rank_trend_pct),
            reviews_per_month: stats30
                .as_ref()
                .and_then(|s| s.review_growth)
                .map(|g| g as f64),
            price_volatility_pct: stats30.as_ref().and_then(|s| s.price_volatility_pct),
            seller_churn_pct: stats30.as_ref().and_then(churn_pct),
            stockouts_30d: stockouts,
            top10_avg_reviews,
            improvement_score: profile
                .reviews_ready
                .then_some(profile.improvement_score),
            captured_at: latest.captured_at,
        })
    }

    /// Sets cancelled status when the token fired between phases.
    fn check_cancelled(&self, run: &mut PipelineRun) -> bool {
        if self.cancel.is_cancelled() {
            info!(run_id = %run.run_id, "run cancelled");
            run.status = RunStatus::Cancelled;
            run.shortlist_frozen = true;
            true
        } else {
            false
        }
    }
}

/// Seller rotation over 30 days as a percentage of snapshot transitions.
fn churn_pct(stats: &Stats30d) -> Option<f64> {
    let changes = stats.seller_change_count?;
    if stats.snapshot_count < 2 {
        return None;
    }
    Some(100.0 * changes as f64 / (stats.snapshot_count - 1) as f64)
}

fn record_timing(timings: &mut serde_json::Map<String, serde_json::Value>, name: &str, start: Instant) {
    timings.insert(
        name.to_string(),
        serde_json::json!(start.elapsed().as_millis() as u64),
    );
}
