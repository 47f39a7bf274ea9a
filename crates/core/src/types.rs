use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Marketplace product identifier: an opaque 10-character alphanumeric code.
///
/// Used as the stable primary key for catalog rows, snapshots and events.
/// The wrapper validates the shape once at the boundary so the rest of the
/// system can treat it as well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct Asin(String);

impl Asin {
    /// Parses and validates a raw identifier. Accepts exactly 10 ASCII
    /// alphanumeric characters; lowercase input is normalized to uppercase.
    pub fn parse(raw: &str) -> Result<Self, InvalidAsin> {
        let trimmed = raw.trim();
        if trimmed.len() != 10 || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(InvalidAsin(raw.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Asin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid ASIN: {0:?} (expected 10 alphanumeric characters)")]
pub struct InvalidAsin(pub String);

/// Identity of a single pipeline invocation. A fresh UUID per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stock availability as observed on the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "stock_status", rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
    BackOrdered,
    Unknown,
}

impl Default for StockStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Fulfilment channel of the dominant offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "fulfillment", rename_all = "snake_case")]
pub enum Fulfillment {
    Fba,
    Fbm,
    FirstParty,
    Unknown,
}

impl Default for Fulfillment {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Lifecycle state of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "run_status", rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Degraded,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Process exit code for the CLI: 0 completed, 2 degraded, 3 failed,
    /// 130 cancelled. A still-running status maps to failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Completed => 0,
            RunStatus::Degraded => 2,
            RunStatus::Failed | RunStatus::Running => 3,
            RunStatus::Cancelled => 130,
        }
    }
}

/// Direction of a detected change between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "event_direction", rename_all = "snake_case")]
pub enum EventDirection {
    Up,
    Down,
    Stable,
}

/// Severity of a detected event row.
///
/// Distinct from [`UrgencyLevel`]: events and opportunities carry separate
/// vocabularies and are never unified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "event_severity", rename_all = "snake_case")]
pub enum EventSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Classification of a stock transition event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "stock_event_kind", rename_all = "snake_case")]
pub enum StockEventKind {
    Stockout,
    Restock,
    LowStockAlert,
    StatusChange,
}

/// Urgency bucket of a scored opportunity, derived from the expected
/// actionability window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "urgency_level", rename_all = "snake_case")]
pub enum UrgencyLevel {
    Critical,
    Urgent,
    Active,
    Standard,
    Extended,
}

impl UrgencyLevel {
    /// Buckets an expected window length in days into the five labels.
    pub fn from_window_days(days: i32) -> Self {
        match days {
            d if d <= 14 => UrgencyLevel::Critical,
            d if d <= 30 => UrgencyLevel::Urgent,
            d if d <= 60 => UrgencyLevel::Active,
            d if d <= 90 => UrgencyLevel::Standard,
            _ => UrgencyLevel::Extended,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UrgencyLevel::Critical => "critical",
            UrgencyLevel::Urgent => "urgent",
            UrgencyLevel::Active => "active",
            UrgencyLevel::Standard => "standard",
            UrgencyLevel::Extended => "extended",
        }
    }

    /// Ranker multiplier applied to the risk-adjusted value when ordering
    /// the shortlist.
    pub fn window_multiplier(&self) -> f64 {
        match self {
            UrgencyLevel::Critical => 2.0,
            UrgencyLevel::Urgent => 1.5,
            UrgencyLevel::Active => 1.2,
            UrgencyLevel::Standard => 1.0,
            UrgencyLevel::Extended => 0.7,
        }
    }
}

impl std::fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asin_parse_accepts_canonical_ids() {
        let asin = Asin::parse("B01ABCD234").unwrap();
        assert_eq!(asin.as_str(), "B01ABCD234");
    }

    #[test]
    fn asin_parse_normalizes_case_and_whitespace() {
        let asin = Asin::parse("  b01abcd234 ").unwrap();
        assert_eq!(asin.as_str(), "B01ABCD234");
    }

    #[test]
    fn asin_parse_rejects_bad_shapes() {
        assert!(Asin::parse("short").is_err());
        assert!(Asin::parse("B01ABCD23!").is_err());
        assert!(Asin::parse("B01ABCD2345").is_err());
        assert!(Asin::parse("").is_err());
    }

    #[test]
    fn urgency_buckets_match_window_boundaries() {
        assert_eq!(UrgencyLevel::from_window_days(14), UrgencyLevel::Critical);
        assert_eq!(UrgencyLevel::from_window_days(15), UrgencyLevel::Urgent);
        assert_eq!(UrgencyLevel::from_window_days(30), UrgencyLevel::Urgent);
        assert_eq!(UrgencyLevel::from_window_days(31), UrgencyLevel::Active);
        assert_eq!(UrgencyLevel::from_window_days(60), UrgencyLevel::Active);
        assert_eq!(UrgencyLevel::from_window_days(90), UrgencyLevel::Standard);
        assert_eq!(UrgencyLevel::from_window_days(91), UrgencyLevel::Extended);
    }

    #[test]
    fn exit_codes_follow_run_status() {
        assert_eq!(RunStatus::Completed.exit_code(), 0);
        assert_eq!(RunStatus::Degraded.exit_code(), 2);
        assert_eq!(RunStatus::Failed.exit_code(), 3);
        assert_eq!(RunStatus::Cancelled.exit_code(), 130);
    }
}
