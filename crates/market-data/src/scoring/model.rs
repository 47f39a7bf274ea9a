use chrono::{DateTime, Utc};
use nicheradar_core::{Asin, RunId, UrgencyLevel};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Rejection reason recorded when the time-pressure gate fails.
pub const REJECTION_NO_WINDOW: &str = "invalid_no_window";

/// One scored base-score component with its cap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentScore {
    pub score: i32,
    pub max: i32,
}

/// The five capped components (30 / 25 / 20 / 15 / 10).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ComponentBreakdown {
    pub margin: ComponentScore,
    pub velocity: ComponentScore,
    pub competition: ComponentScore,
    pub gap: ComponentScore,
    pub time_pressure: ComponentScore,
}

impl ComponentBreakdown {
    pub fn total(&self) -> i32 {
        self.margin.score
            + self.velocity.score
            + self.competition.score
            + self.gap.score
            + self.time_pressure.score
    }
}

/// The four urgency factors and their geometric mean.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeFactors {
    pub stockout: f64,
    pub seller_churn: f64,
    pub price_volatility: f64,
    pub rank_acceleration: f64,
    pub geometric_mean: f64,
}

/// Economic value estimates for one opportunity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EconomicEstimates {
    pub monthly_units: f64,
    pub monthly_profit: f64,
    pub annual_value: f64,
    pub risk_adjusted_value: f64,
    pub rank_score: f64,
}

/// Everything the scorer reads for one product. Serialized (in field
/// order) into the artifact's `inputs_hash` so identical inputs are
/// provably identical.
#[derive(Debug, Clone, Serialize)]
pub struct ScoringInputs {
    pub asin: Asin,
    pub price: Option<f64>,
    pub rank: Option<i64>,
    pub review_count: Option<i64>,
    pub rating_avg: Option<f64>,
    pub seller_count: Option<i32>,
    /// Share of 1- and 2-star ratings, percent
    pub negative_share_pct: Option<f64>,
    /// (rank_now - rank_then) / rank_then, percent; negative = improving
    pub rank_trend_7d_pct: Option<f64>,
    pub rank_trend_30d_pct: Option<f64>,
    pub reviews_per_month: Option<f64>,
    pub price_volatility_pct: Option<f64>,
    pub seller_churn_pct: Option<f64>,
    pub stockouts_30d: i64,
    pub top10_avg_reviews: Option<f64>,
    /// Present only when the review profile is trusted (`reviews_ready`)
    pub improvement_score: Option<f64>,
    pub captured_at: DateTime<Utc>,
}

/// Immutable per-(run, product) record of every scoring input and output.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OpportunityArtifact {
    pub run_id: RunId,
    pub asin: Asin,
    /// Position among the run's non-rejected artifacts, best first
    pub rank_in_run: Option<i32>,
    /// 0..100
    pub final_score: i32,
    /// Base points divided by 100, in [0, 1]
    pub base_score: f64,
    /// Geometric mean of the four factors, clamped to [0.5, 2.0]
    pub time_multiplier: f64,
    /// [`ComponentBreakdown`] as JSON
    pub components: serde_json::Value,
    /// [`TimeFactors`] as JSON
    pub time_factors: serde_json::Value,
    pub signals_for: serde_json::Value,
    pub signals_against: serde_json::Value,
    pub thesis: String,
    pub action: String,
    pub monthly_profit: f64,
    pub annual_value: f64,
    pub risk_adjusted_value: f64,
    pub rank_score: f64,
    pub window_days: i32,
    pub urgency: UrgencyLevel,
    pub rejected: bool,
    pub rejection_reason: Option<String>,
    pub inputs_hash: String,
    pub price_at: Option<f64>,
    pub review_count_at: Option<i64>,
    pub rating_at: Option<f64>,
    pub rank_at: Option<i64>,
    pub scored_at: DateTime<Utc>,
}
