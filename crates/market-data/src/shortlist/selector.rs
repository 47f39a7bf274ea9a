//! Pure shortlist selection over a run's artifacts.

use crate::scoring::model::OpportunityArtifact;
use crate::shortlist::model::ShortlistEntry;
use nicheradar_core::config::ShortlistConfig;
use nicheradar_core::Asin;
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Selection result with stability accounting against the previous
/// snapshot.
#[derive(Debug, Clone)]
pub struct SelectionOutcome {
    pub entries: Vec<ShortlistEntry>,
    pub total_potential_value: f64,
    pub added: Vec<Asin>,
    pub removed: Vec<Asin>,
    pub stability: f64,
}

/// Deterministic artifact ordering: rank score descending, then final
/// score, then shorter window, then lexical ASIN.
fn compare(a: &OpportunityArtifact, b: &OpportunityArtifact) -> Ordering {
    b.rank_score
        .partial_cmp(&a.rank_score)
        .unwrap_or(Ordering::Equal)
        .then(b.final_score.cmp(&a.final_score))
        .then(a.window_days.cmp(&b.window_days))
        .then(a.asin.cmp(&b.asin))
}

/// Assigns `rank_in_run` across a run's non-rejected artifacts. Rejected
/// artifacts keep a null rank.
pub fn assign_ranks(artifacts: &mut [OpportunityArtifact]) {
    let mut order: Vec<usize> = (0..artifacts.len())
        .filter(|&i| !artifacts[i].rejected)
        .collect();
    order.sort_by(|&a, &b| compare(&artifacts[a], &artifacts[b]));
    for (position, index) in order.into_iter().enumerate() {
        artifacts[index].rank_in_run = Some(position as i32 + 1);
    }
}

pub struct ShortlistSelector<'a> {
    config: &'a ShortlistConfig,
}

impl<'a> ShortlistSelector<'a> {
    pub fn new(config: &'a ShortlistConfig) -> Self {
        Self { config }
    }

    /// Applies the minimum-score / minimum-value / top-N gates and computes
    /// the membership diff against the previously active shortlist.
    pub fn select(
        &self,
        artifacts: &[OpportunityArtifact],
        previous: &[Asin],
    ) -> SelectionOutcome {
        let mut eligible: Vec<&OpportunityArtifact> = artifacts
            .iter()
            .filter(|a| {
                !a.rejected
                    && a.final_score >= self.config.min_score
                    && a.risk_adjusted_value >= self.config.min_value
            })
            .collect();
        eligible.sort_by(|a, b| compare(a, b));
        eligible.truncate(self.config.max_items);

        let entries: Vec<ShortlistEntry> = eligible
            .iter()
            .map(|a| ShortlistEntry {
                asin: a.asin.clone(),
                final_score: a.final_score,
                rank_score: a.rank_score,
                window_days: a.window_days,
            })
            .collect();
        let total_potential_value = eligible.iter().map(|a| a.risk_adjusted_value).sum();

        let new_set: BTreeSet<&Asin> = entries.iter().map(|e| &e.asin).collect();
        let old_set: BTreeSet<&Asin> = previous.iter().collect();
        let added: Vec<Asin> = new_set.difference(&old_set).map(|a| (*a).clone()).collect();
        let removed: Vec<Asin> = old_set.difference(&new_set).map(|a| (*a).clone()).collect();
        let union = new_set.union(&old_set).count();
        let intersection = new_set.intersection(&old_set).count();
        let stability = intersection as f64 / union.max(1) as f64;

        SelectionOutcome {
            entries,
            total_potential_value,
            added,
            removed,
            stability,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nicheradar_core::{RunId, UrgencyLevel};

    fn artifact(asin: &str, final_score: i32, rank_score: f64, window_days: i32) -> OpportunityArtifact {
        OpportunityArtifact {
            run_id: RunId::new(),
            asin: Asin::parse(asin).unwrap(),
            rank_in_run: None,
            final_score,
            base_score: final_score as f64 / 100.0,
            time_multiplier: 1.0,
            components: serde_json::Value::Null,
            time_factors: serde_json::Value::Null,
            signals_for: serde_json::Value::Null,
            signals_against: serde_json::Value::Null,
            thesis: String::new(),
            action: "monitor".to_string(),
            monthly_profit: 1000.0,
            annual_value: 12_000.0,
            risk_adjusted_value: 8_400.0,
            rank_score,
            window_days,
            urgency: UrgencyLevel::Standard,
            rejected: false,
            rejection_reason: None,
            inputs_hash: String::new(),
            price_at: None,
            review_count_at: None,
            rating_at: None,
            rank_at: None,
            scored_at: Utc::now(),
        }
    }

    fn config() -> ShortlistConfig {
        ShortlistConfig::default()
    }

    #[test]
    fn ordering_is_rank_score_then_final_then_window_then_asin() {
        let config = config();
        let selector = ShortlistSelector::new(&config);
        let artifacts = vec![
            artifact("B000000004", 60, 9_000.0, 40),
            artifact("B000000001", 70, 10_000.0, 40),
            artifact("B000000003", 80, 10_000.0, 30),
            artifact("B000000002", 80, 10_000.0, 30),
        ];
        let outcome = selector.select(&artifacts, &[]);
        let order: Vec<&str> = outcome.entries.iter().map(|e| e.asin.as_str()).collect();
        assert_eq!(
            order,
            vec!["B000000002", "B000000003", "B000000001", "B000000004"]
        );
    }

    #[test]
    fn gates_exclude_low_score_low_value_and_rejected() {
        let config = config();
        let selector = ShortlistSelector::new(&config);
        let mut rejected = artifact("B000000001", 90, 20_000.0, 30);
        rejected.rejected = true;
        let mut low_value = artifact("B000000002", 90, 20_000.0, 30);
        low_value.risk_adjusted_value = 100.0;
        let low_score = artifact("B000000003", 40, 20_000.0, 30);
        let keeper = artifact("B000000004", 75, 15_000.0, 30);

        let outcome = selector.select(&[rejected, low_value, low_score, keeper], &[]);
        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.entries[0].asin.as_str(), "B000000004");
    }

    #[test]
    fn list_caps_at_max_items() {
        let mut config = config();
        config.max_items = 3;
        let selector = ShortlistSelector::new(&config);
        let artifacts: Vec<OpportunityArtifact> = (0..6)
            .map(|i| artifact(&format!("B00000000{i}"), 80, 10_000.0 + i as f64, 30))
            .collect();
        let outcome = selector.select(&artifacts, &[]);
        assert_eq!(outcome.entries.len(), 3);
        // Highest rank scores survive.
        assert_eq!(outcome.entries[0].asin.as_str(), "B000000005");
    }

    #[test]
    fn stability_is_jaccard_of_old_and_new_membership() {
        let config = config();
        let selector = ShortlistSelector::new(&config);
        let artifacts = vec![
            artifact("B000000001", 80, 10_000.0, 30),
            artifact("B000000002", 80, 9_000.0, 30),
        ];
        let previous = vec![
            Asin::parse("B000000002").unwrap(),
            Asin::parse("B000000003").unwrap(),
        ];
        let outcome = selector.select(&artifacts, &previous);
        assert_eq!(outcome.added, vec![Asin::parse("B000000001").unwrap()]);
        assert_eq!(outcome.removed, vec![Asin::parse("B000000003").unwrap()]);
        // intersection 1, union 3
        assert!((outcome.stability - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_sets_are_fully_stable() {
        let config = config();
        let selector = ShortlistSelector::new(&config);
        let outcome = selector.select(&[], &[]);
        assert_eq!(outcome.stability, 0.0);
        assert!(outcome.entries.is_empty());
    }

    #[test]
    fn assign_ranks_skips_rejected_artifacts() {
        let mut artifacts = vec![
            artifact("B000000001", 70, 8_000.0, 30),
            artifact("B000000002", 90, 12_000.0, 30),
            artifact("B000000003", 95, 20_000.0, 30),
        ];
        artifacts[2].rejected = true;
        assign_ranks(&mut artifacts);
        assert_eq!(artifacts[1].rank_in_run, Some(1));
        assert_eq!(artifacts[0].rank_in_run, Some(2));
        assert_eq!(artifacts[2].rank_in_run, None);
    }
}
