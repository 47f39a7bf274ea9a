//! Data-quality gate and run-status arithmetic. Pure functions so the
//! gate semantics are testable without a datastore.

use nicheradar_market_data::snapshots::DqCounts;
use nicheradar_core::RunStatus;
use serde::Serialize;

/// Per-field missingness over the snapshots one run wrote.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DqReport {
    pub price_missing_pct: f64,
    pub rank_missing_pct: f64,
    pub review_missing_pct: f64,
    pub passed: bool,
}

/// Each missingness percentage must stay below the threshold; the gate is
/// the conjunction of all three. An empty run passes trivially.
pub fn evaluate_dq(counts: &DqCounts, threshold_pct: f64) -> DqReport {
    let pct = |missing: i64| {
        if counts.total == 0 {
            0.0
        } else {
            100.0 * missing as f64 / counts.total as f64
        }
    };
    let price = pct(counts.price_missing);
    let rank = pct(counts.rank_missing);
    let review = pct(counts.review_missing);
    DqReport {
        price_missing_pct: price,
        rank_missing_pct: rank,
        review_missing_pct: review,
        passed: price < threshold_pct && rank < threshold_pct && review < threshold_pct,
    }
}

/// Fraction of per-product failures.
pub fn error_rate(failed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        failed as f64 / total as f64
    }
}

/// Final status resolution: completed only when the DQ gate passed and the
/// error budget held.
pub fn resolve_status(dq_passed: bool, error_budget_breached: bool) -> RunStatus {
    if dq_passed && !error_budget_breached {
        RunStatus::Completed
    } else {
        RunStatus::Degraded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(total: i64, price: i64, rank: i64, review: i64) -> DqCounts {
        DqCounts {
            total,
            price_missing: price,
            rank_missing: rank,
            review_missing: review,
        }
    }

    #[test]
    fn clean_run_passes_all_gates() {
        let report = evaluate_dq(&counts(100, 0, 0, 0), 30.0);
        assert!(report.passed);
        assert_eq!(report.price_missing_pct, 0.0);
    }

    #[test]
    fn forty_percent_null_rank_fails_the_gate() {
        let report = evaluate_dq(&counts(100, 0, 40, 0), 30.0);
        assert!(!report.passed);
        assert_eq!(report.rank_missing_pct, 40.0);
        assert_eq!(report.price_missing_pct, 0.0);
    }

    #[test]
    fn threshold_is_exclusive() {
        // Exactly at the threshold fails: the percentage must be below it.
        let report = evaluate_dq(&counts(100, 30, 0, 0), 30.0);
        assert!(!report.passed);
        let report = evaluate_dq(&counts(100, 29, 0, 0), 30.0);
        assert!(report.passed);
    }

    #[test]
    fn empty_run_passes_trivially() {
        let report = evaluate_dq(&counts(0, 0, 0, 0), 30.0);
        assert!(report.passed);
    }

    #[test]
    fn error_budget_arithmetic() {
        assert_eq!(error_rate(12, 100), 0.12);
        assert_eq!(error_rate(0, 100), 0.0);
        assert_eq!(error_rate(5, 0), 0.0);
    }

    #[test]
    fn status_resolution_matrix() {
        assert_eq!(resolve_status(true, false), RunStatus::Completed);
        assert_eq!(resolve_status(false, false), RunStatus::Degraded);
        assert_eq!(resolve_status(true, true), RunStatus::Degraded);
        assert_eq!(resolve_status(false, true), RunStatus::Degraded);
    }

    #[test]
    fn error_budget_breach_at_point_twelve() {
        // 12 failures over 100 requested products breaches the 0.10 budget.
        let rate = error_rate(12, 100);
        assert!(rate >= 0.10);
        assert_eq!(resolve_status(true, rate >= 0.10), RunStatus::Degraded);
    }
}
