//! HTTP catalog API client.
//!
//! Every call acquires its estimated cost from the shared token budget
//! before going to the wire, carries a deadline, and resynchronizes the
//! budget from the response envelope.

use crate::budget::TokenBudget;
use crate::records::{decode_batch, ApiEnvelope, FetchOutcome};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use nicheradar_core::config::ConnectorConfig;
use nicheradar_core::{Asin, Error, Result};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Cost model: discovery is one small unit, each product in a batch costs
/// about two units.
const DISCOVERY_COST: f64 = 1.0;
const PER_PRODUCT_COST: f64 = 2.0;
/// API-side ceiling on products per batched call.
pub const MAX_BATCH: usize = 100;

/// Remote budget accounting as reported by the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ApiHealth {
    pub tokens_left: f64,
    pub refill_per_minute: f64,
    pub last_error: Option<String>,
}

/// External catalog API contract used by the orchestrator.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Best-selling product identifiers for a category.
    async fn discover_category(&self, category_id: i64) -> Result<Vec<Asin>>;

    /// Batched per-product observations. Per-product failures are isolated
    /// into the outcome's failure list, never failing the whole batch.
    async fn fetch_products(&self, asins: &[Asin], include_history: bool) -> Result<FetchOutcome>;

    async fn health_check(&self) -> Result<ApiHealth>;
}

pub struct HttpCatalogApi {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    domain: u16,
    budget: TokenBudget,
    retry: RetryPolicy,
    budget_wait: Duration,
    last_error: std::sync::Mutex<Option<String>>,
}

impl HttpCatalogApi {
    pub fn new(config: &ConnectorConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::fatal("connector.api_key is not configured"));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::fatal(format!("HTTP client construction failed: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            domain: config.domain,
            budget: TokenBudget::new(config.bucket_capacity, config.refill_per_minute),
            retry: RetryPolicy::new(config.max_retries),
            budget_wait: Duration::from_secs(config.request_timeout_secs * 4),
            last_error: std::sync::Mutex::new(None),
        })
    }

    fn record_error(&self, message: Option<String>) {
        *self.last_error.lock().expect("last_error lock poisoned") = message;
    }

    /// Issues one budgeted GET. Transient failures back off with jitter up
    /// to the retry cap; rate-limit responses wait out the refill instead
    /// and do not consume retries.
    async fn call(&self, path: &str, query: &[(&str, String)], cost: f64) -> Result<ApiEnvelope> {
        self.budget.acquire(cost, self.budget_wait).await?;

        let url = format!("{}{}", self.base_url, path);
        let mut attempt: u32 = 0;
        let mut rate_limit_waited = Duration::ZERO;

        loop {
            let response = self
                .http
                .get(&url)
                .query(&[("key", self.api_key.clone()), ("domain", self.domain.to_string())])
                .query(query)
                .send()
                .await;

            let response = match response {
                Ok(resp) => resp,
                Err(e) if e.is_timeout() || e.is_connect() => {
                    attempt += 1;
                    if attempt > self.retry.max_retries {
                        self.record_error(Some(e.to_string()));
                        return Err(Error::transient(format!("transport failure after {attempt} attempts: {e}")));
                    }
                    let delay = self.retry.backoff_delay(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying transient transport failure");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => {
                    self.record_error(Some(e.to_string()));
                    return Err(Error::transient(format!("transport failure: {e}")));
                }
            };

            let status = response.status();
            if status.as_u16() == 429 {
                let wait = self.rate_limit_wait(&response).await;
                rate_limit_waited += wait;
                if rate_limit_waited > self.budget_wait {
                    self.record_error(Some("rate limited past phase budget".to_string()));
                    return Err(Error::budget("rate limited for longer than the phase allows"));
                }
                debug!(wait_secs = wait.as_secs_f64(), "rate limited, waiting out refill");
                tokio::time::sleep(wait).await;
                continue;
            }
            if status.is_server_error() {
                attempt += 1;
                if attempt > self.retry.max_retries {
                    self.record_error(Some(format!("server error {status}")));
                    return Err(Error::transient(format!("server error {status} after {attempt} attempts")));
                }
                tokio::time::sleep(self.retry.backoff_delay(attempt)).await;
                continue;
            }
            if status.as_u16() == 401 || status.as_u16() == 403 {
                self.record_error(Some(format!("authorization failure {status}")));
                return Err(Error::fatal(format!("API rejected credentials: {status}")));
            }
            if !status.is_success() {
                self.record_error(Some(format!("unexpected status {status}")));
                return Err(Error::malformed(format!("unexpected status {status}")));
            }

            let envelope: ApiEnvelope = response
                .json()
                .await
                .map_err(|e| Error::malformed(format!("undecodable response envelope: {e}")))?;

            self.budget
                .synchronize(envelope.tokens_left, envelope.refill_per_minute)
                .await;
            self.record_error(None);
            return Ok(envelope);
        }
    }

    /// Wait until the bucket can cover one more call, from the response's
    /// retry-after hint when present, otherwise from the refill rate.
    async fn rate_limit_wait(&self, response: &reqwest::Response) -> Duration {
        if let Some(retry_after) = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
        {
            return Duration::from_secs(retry_after.max(1));
        }
        let rate = self.budget.refill_per_minute().await;
        if rate <= 0.0 {
            return Duration::from_secs(60);
        }
        Duration::from_secs_f64((PER_PRODUCT_COST / rate * 60.0).max(1.0))
    }
}

#[async_trait]
impl CatalogApi for HttpCatalogApi {
    async fn discover_category(&self, category_id: i64) -> Result<Vec<Asin>> {
        let envelope = self
            .call(
                "/bestsellers",
                &[("category", category_id.to_string())],
                DISCOVERY_COST,
            )
            .await?;

        let listed = envelope
            .best_sellers
            .ok_or_else(|| Error::malformed("bestsellers response missing asin list"))?;

        let mut asins = Vec::with_capacity(listed.asin_list.len());
        for raw in &listed.asin_list {
            match Asin::parse(raw) {
                Ok(asin) => asins.push(asin),
                Err(e) => warn!(raw, "skipping undecodable ASIN in discovery: {e}"),
            }
        }
        Ok(asins)
    }

    async fn fetch_products(&self, asins: &[Asin], include_history: bool) -> Result<FetchOutcome> {
        let mut outcome = FetchOutcome::default();

        for chunk in asins.chunks(MAX_BATCH) {
            let cost = PER_PRODUCT_COST * chunk.len() as f64;
            let joined = chunk
                .iter()
                .map(Asin::as_str)
                .collect::<Vec<_>>()
                .join(",");
            let envelope = self
                .call(
                    "/product",
                    &[
                        ("asin", joined),
                        ("history", (include_history as u8).to_string()),
                    ],
                    cost,
                )
                .await?;

            let (records, failures) = decode_batch(&envelope, chrono::Utc::now());
            debug!(
                requested = chunk.len(),
                decoded = records.len(),
                failed = failures.len(),
                "product batch decoded"
            );
            outcome.records.extend(records);
            outcome.failures.extend(failures);
            outcome.tokens_consumed += cost;
        }
        Ok(outcome)
    }

    async fn health_check(&self) -> Result<ApiHealth> {
        let envelope = self.call("/token", &[], 0.0).await?;
        Ok(ApiHealth {
            tokens_left: envelope.tokens_left.unwrap_or(0.0),
            refill_per_minute: envelope.refill_per_minute.unwrap_or(0.0),
            last_error: self.last_error.lock().expect("last_error lock poisoned").clone(),
        })
    }
}
