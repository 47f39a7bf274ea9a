use chrono::{DateTime, Utc};
use nicheradar_core::{Asin, RunId};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Closed set of defect categories the extractor recognizes.
///
/// The store enforces the enumeration; adding a member is a schema change
/// plus a lexicon version bump. Free-form defect strings never enter the
/// store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "defect_type", rename_all = "snake_case")]
pub enum DefectType {
    MechanicalFailure,
    PoorGrip,
    Durability,
    CompatibilityIssue,
    HeatIssue,
    InstallationIssue,
    VibrationNoise,
    MaterialQuality,
    SizeFit,
}

impl DefectType {
    /// Snake-case name, also the lexical tie-break key for dominant pain.
    pub fn as_str(&self) -> &'static str {
        match self {
            DefectType::MechanicalFailure => "mechanical_failure",
            DefectType::PoorGrip => "poor_grip",
            DefectType::Durability => "durability",
            DefectType::CompatibilityIssue => "compatibility_issue",
            DefectType::HeatIssue => "heat_issue",
            DefectType::InstallationIssue => "installation_issue",
            DefectType::VibrationNoise => "vibration_noise",
            DefectType::MaterialQuality => "material_quality",
            DefectType::SizeFit => "size_fit",
        }
    }
}

impl std::fmt::Display for DefectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stored customer review.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Review {
    pub review_id: String,
    pub asin: Asin,
    pub title: Option<String>,
    pub body: Option<String>,
    pub rating: Option<f64>,
    pub verified: bool,
    pub review_date: Option<DateTime<Utc>>,
    pub captured_at: DateTime<Utc>,
    /// Set by the extractor once the review entered a profile
    pub analyzed_at: Option<DateTime<Utc>>,
}

/// Incoming review payload.
#[derive(Debug, Clone)]
pub struct NewReview {
    pub review_id: String,
    pub asin: Asin,
    pub title: Option<String>,
    pub body: Option<String>,
    pub rating: Option<f64>,
    pub verified: bool,
    pub review_date: Option<DateTime<Utc>>,
}

/// Aggregated defect signal for one `(product, run)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefectSignal {
    pub defect_type: DefectType,
    /// Negative reviews matching the type
    pub frequency: i32,
    /// `min(1, base_weight * min(1, 2 * frequency / negatives))`
    pub severity_score: f64,
    /// Up to three verbatim quotes, shortest matches preferred
    pub example_quotes: Vec<String>,
    pub reviews_scanned: i32,
    pub negative_reviews_scanned: i32,
}

/// Aggregated wish request for one `(product, run)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRequest {
    /// Normalized feature phrase
    pub phrase: String,
    pub mentions: i32,
    /// `min(1, mentions / 10)`; an offline pass may later revise it
    pub confidence: f64,
    pub source_quotes: Vec<String>,
}

/// Per-(product, run) improvement profile consumed by the scorer as a rank
/// bonus. Never feeds the base score.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ImprovementProfile {
    pub asin: Asin,
    pub run_id: RunId,
    /// Top defects, JSON array of [`DefectSignal`]
    pub top_defects: serde_json::Value,
    /// Missing features, JSON array of [`FeatureRequest`]
    pub missing_features: serde_json::Value,
    pub dominant_pain: Option<DefectType>,
    pub improvement_score: f64,
    pub reviews_analyzed: i32,
    pub negative_reviews_analyzed: i32,
    /// True only with at least the configured floor of negative reviews
    pub reviews_ready: bool,
}
