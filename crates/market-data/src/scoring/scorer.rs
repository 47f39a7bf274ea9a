//! The deterministic opportunity scorer.
//!
//! For a fixed configuration snapshot and identical input tuple the
//! produced artifact is bit-identical across re-runs (all fields except
//! `scored_at`, which the caller supplies). The scorer holds the frozen
//! configuration by reference and keeps no state of its own.

use crate::scoring::economics::{monthly_units, unit_economics, UnitEconomics};
use crate::scoring::model::{
    ComponentBreakdown, ComponentScore, EconomicEstimates, OpportunityArtifact, ScoringInputs,
    TimeFactors, REJECTION_NO_WINDOW,
};
use chrono::{DateTime, Utc};
use nicheradar_core::config::ScoringConfig;
use nicheradar_core::{RunId, UrgencyLevel};
use sha2::{Digest, Sha256};

const MULTIPLIER_FLOOR: f64 = 0.5;
const MULTIPLIER_CEIL: f64 = 2.0;

pub struct OpportunityScorer<'a> {
    config: &'a ScoringConfig,
}

impl<'a> OpportunityScorer<'a> {
    pub fn new(config: &'a ScoringConfig) -> Self {
        Self { config }
    }

    /// Scores one product. A rejected artifact (time pressure below the
    /// gate) is still fully populated for the audit trail.
    pub fn score(
        &self,
        run_id: RunId,
        inputs: &ScoringInputs,
        scored_at: DateTime<Utc>,
    ) -> OpportunityArtifact {
        let (margin_points, economics) = self.margin_points(inputs.price);
        let velocity_points = self.velocity_points(inputs);
        let competition_points = self.competition_points(inputs);
        let gap_points = self.gap_points(inputs);
        let time_pressure_points = self.time_pressure_points(inputs);

        let components = ComponentBreakdown {
            margin: ComponentScore { score: margin_points, max: 30 },
            velocity: ComponentScore { score: velocity_points, max: 25 },
            competition: ComponentScore { score: competition_points, max: 20 },
            gap: ComponentScore { score: gap_points, max: 15 },
            time_pressure: ComponentScore { score: time_pressure_points, max: 10 },
        };
        let base_points = components.total();

        let factors = self.time_factors(inputs);
        let multiplier = factors
            .geometric_mean
            .clamp(MULTIPLIER_FLOOR, MULTIPLIER_CEIL);
        let final_score = ((base_points as f64 * multiplier).round() as i32).clamp(0, 100);

        let window_days = self.window_days(multiplier);
        let urgency = UrgencyLevel::from_window_days(window_days);

        let rejected = time_pressure_points < self.config.time_pressure.min_points;
        let estimates = self.estimates(inputs, economics.as_ref(), urgency);

        let signals_for = self.signals_for(inputs, &components);
        let signals_against = self.signals_against(inputs, &components);
        let action = if rejected {
            "discard".to_string()
        } else {
            match urgency {
                UrgencyLevel::Critical => "move_now",
                UrgencyLevel::Urgent => "prepare_launch",
                UrgencyLevel::Active => "validate_suppliers",
                UrgencyLevel::Standard => "monitor",
                UrgencyLevel::Extended => "watchlist",
            }
            .to_string()
        };
        let thesis = self.thesis(inputs, &components, final_score, window_days, urgency, &estimates, rejected);

        OpportunityArtifact {
            run_id,
            asin: inputs.asin.clone(),
            rank_in_run: None,
            final_score,
            base_score: base_points as f64 / 100.0,
            time_multiplier: multiplier,
            components: serde_json::to_value(components).unwrap_or_default(),
            time_factors: serde_json::to_value(factors).unwrap_or_default(),
            signals_for: serde_json::to_value(signals_for).unwrap_or_default(),
            signals_against: serde_json::to_value(signals_against).unwrap_or_default(),
            thesis,
            action,
            monthly_profit: estimates.monthly_profit,
            annual_value: estimates.annual_value,
            risk_adjusted_value: estimates.risk_adjusted_value,
            rank_score: estimates.rank_score,
            window_days,
            urgency,
            rejected,
            rejection_reason: rejected.then(|| REJECTION_NO_WINDOW.to_string()),
            inputs_hash: inputs_hash(inputs),
            price_at: inputs.price,
            review_count_at: inputs.review_count,
            rating_at: inputs.rating_avg,
            rank_at: inputs.rank,
            scored_at,
        }
    }

    /// Margin (cap 30): net margin ratio mapped piecewise-linearly across
    /// the {weak, fair, good, strong} calibration points to {6, 14, 22, 30}.
    fn margin_points(&self, price: Option<f64>) -> (i32, Option<UnitEconomics>) {
        let Some(price) = price.filter(|p| *p > 0.0) else {
            return (0, None);
        };
        let econ = unit_economics(price, &self.config.margin);
        let m = &self.config.margin;
        let r = econ.margin_ratio;
        let points = if r <= 0.0 {
            0.0
        } else if r < m.weak {
            6.0 * r / m.weak
        } else if r < m.fair {
            6.0 + 8.0 * (r - m.weak) / (m.fair - m.weak)
        } else if r < m.good {
            14.0 + 8.0 * (r - m.fair) / (m.good - m.fair)
        } else if r < m.strong {
            22.0 + 8.0 * (r - m.good) / (m.strong - m.good)
        } else {
            30.0
        };
        (points.round() as i32, Some(econ))
    }

    /// Velocity (cap 25): up to 15 from the absolute rank tier, up to 10
    /// from trend and review growth.
    fn velocity_points(&self, inputs: &ScoringInputs) -> i32 {
        let v = &self.config.velocity;

        let tier = match inputs.rank {
            Some(rank) => v
                .rank_tiers
                .iter()
                .find(|t| rank <= t.rank_under)
                .map(|t| t.points)
                .unwrap_or(v.rank_floor_points),
            None => 0,
        };

        let mut extra = 0;
        if inputs
            .rank_trend_7d_pct
            .is_some_and(|t| t <= -v.trend_7d_improving_pct)
        {
            extra += 3;
        }
        if inputs
            .rank_trend_30d_pct
            .is_some_and(|t| t <= -v.trend_30d_improving_pct)
        {
            extra += 3;
        }
        match inputs.reviews_per_month {
            Some(rpm) if rpm >= v.reviews_per_month_hot => extra += 4,
            Some(rpm) if rpm >= v.reviews_per_month_warm => extra += 2,
            _ => {}
        }

        (tier + extra).min(25)
    }

    /// Competition (cap 20): fewer sellers and higher rotation both score.
    fn competition_points(&self, inputs: &ScoringInputs) -> i32 {
        let c = &self.config.competition;

        let sellers = match inputs.seller_count {
            Some(s) if s <= c.sellers_low => 10,
            Some(s) if s <= c.sellers_mid => 7,
            Some(s) if s <= c.sellers_high => 4,
            Some(_) => 1,
            None => 0,
        };
        let churn = match inputs.seller_churn_pct {
            Some(r) if r > c.churn_high_pct => 10,
            Some(r) if r > c.churn_mid_pct => 7,
            Some(r) if r > c.churn_low_pct => 4,
            Some(_) => 2,
            None => 0,
        };
        (sellers + churn).min(20)
    }

    /// Gap (cap 15): under-reviewing against the category top 10 plus the
    /// negative-review share.
    fn gap_points(&self, inputs: &ScoringInputs) -> i32 {
        let g = &self.config.gap;

        let ratio_points = match (inputs.review_count, inputs.top10_avg_reviews) {
            (Some(own), Some(top)) if top > 0.0 => {
                let ratio = own as f64 / top;
                if ratio < g.ratio_strong {
                    9
                } else if ratio < g.ratio_fair {
                    6
                } else if ratio < g.ratio_weak {
                    3
                } else {
                    0
                }
            }
            _ => 0,
        };

        let negative_points = match inputs.negative_share_pct {
            Some(share) if share >= g.negative_share_high => 6,
            Some(share) if share >= g.negative_share_mid => 4,
            Some(share) if share >= g.negative_share_low => 2,
            _ => 0,
        };

        (ratio_points + negative_points).min(15)
    }

    /// Time pressure (cap 10): stockouts 4/3/2, rank acceleration 3/2/1,
    /// price volatility 3/2, strictly ordered.
    fn time_pressure_points(&self, inputs: &ScoringInputs) -> i32 {
        let tp = &self.config.time_pressure;
        let stockouts = inputs.stockouts_30d as f64;
        let accel = rank_acceleration(inputs);
        let volatility = inputs.price_volatility_pct.unwrap_or(0.0);

        let stockout_points = if stockouts >= tp.stockout_high {
            4
        } else if stockouts >= tp.stockout_mid {
            3
        } else if stockouts >= tp.stockout_low {
            2
        } else {
            0
        };
        let accel_points = if accel > tp.accel_high_pct {
            3
        } else if accel > tp.accel_mid_pct {
            2
        } else if accel > tp.accel_floor_pct {
            1
        } else {
            0
        };
        let volatility_points = if volatility > tp.volatility_high_pct {
            3
        } else if volatility > tp.volatility_mid_pct {
            2
        } else {
            0
        };

        (stockout_points + accel_points + volatility_points).min(10)
    }

    fn time_factors(&self, inputs: &ScoringInputs) -> TimeFactors {
        let tf = &self.config.time_factors;
        let stockouts = inputs.stockouts_30d as f64;
        let churn = inputs.seller_churn_pct.unwrap_or(0.0);
        let volatility = inputs.price_volatility_pct.unwrap_or(0.0);
        let accel = rank_acceleration(inputs);

        let stockout = if stockouts >= tf.stockout_high {
            1.5
        } else if stockouts >= tf.stockout_mid {
            1.2
        } else if stockouts >= tf.stockout_low {
            1.0
        } else {
            0.8
        };
        let seller_churn = if churn > tf.churn_high_pct {
            1.4
        } else if churn > tf.churn_mid_pct {
            1.2
        } else if churn > tf.churn_low_pct {
            1.0
        } else {
            0.8
        };
        let price_volatility = if volatility > tf.volatility_high_pct {
            1.3
        } else if volatility > tf.volatility_mid_pct {
            1.1
        } else {
            1.0
        };
        let rank_accel = if accel > tf.accel_high_pct {
            1.4
        } else if accel > 0.0 {
            1.2
        } else if accel > tf.accel_floor_pct {
            1.0
        } else {
            0.8
        };

        TimeFactors {
            stockout,
            seller_churn,
            price_volatility,
            rank_acceleration: rank_accel,
            geometric_mean: (stockout * seller_churn * price_volatility * rank_accel).powf(0.25),
        }
    }

    /// Expected actionability window shrinks cubically with urgency.
    fn window_days(&self, multiplier: f64) -> i32 {
        let days = (self.config.window_numerator / multiplier.powi(3)).round();
        (days as i32).clamp(7, 365)
    }

    fn estimates(
        &self,
        inputs: &ScoringInputs,
        economics: Option<&UnitEconomics>,
        urgency: UrgencyLevel,
    ) -> EconomicEstimates {
        let units = inputs
            .rank
            .map(|rank| monthly_units(rank, self.config))
            .unwrap_or(0.0);
        let monthly_profit = economics
            .map(|e| e.net_margin.max(0.0) * units)
            .unwrap_or(0.0);
        let annual_value = 12.0 * monthly_profit;
        let risk_adjusted_value = self.config.risk_discount * annual_value;

        // The review-intelligence bonus is the only permitted contribution
        // outside the component caps.
        let review_bonus = inputs.improvement_score.unwrap_or(0.0)
            * self.config.review_bonus_weight
            * risk_adjusted_value;
        let rank_score = risk_adjusted_value * urgency.window_multiplier() + review_bonus;

        EconomicEstimates {
            monthly_units: units,
            monthly_profit,
            annual_value,
            risk_adjusted_value,
            rank_score,
        }
    }

    fn signals_for(&self, inputs: &ScoringInputs, components: &ComponentBreakdown) -> Vec<String> {
        let mut signals = Vec::new();
        if components.margin.score >= 22 {
            signals.push("strong unit margin".to_string());
        }
        if inputs.rank.is_some_and(|r| r <= 10_000) {
            signals.push("top-10k sales rank".to_string());
        }
        if inputs.rank_trend_7d_pct.is_some_and(|t| t < 0.0) {
            signals.push("rank improving over 7 days".to_string());
        }
        if inputs
            .seller_count
            .is_some_and(|s| s <= self.config.competition.sellers_mid)
        {
            signals.push("few competing sellers".to_string());
        }
        if inputs.stockouts_30d >= 1 {
            signals.push(format!("{} stockout(s) in the last 30 days", inputs.stockouts_30d));
        }
        if inputs
            .negative_share_pct
            .is_some_and(|s| s >= self.config.gap.negative_share_mid)
        {
            signals.push("high negative-review share to improve on".to_string());
        }
        if inputs.improvement_score.is_some_and(|s| s >= 0.5) {
            signals.push("clear improvement signals in reviews".to_string());
        }
        signals
    }

    fn signals_against(&self, inputs: &ScoringInputs, components: &ComponentBreakdown) -> Vec<String> {
        let mut signals = Vec::new();
        if components.margin.score < 14 {
            signals.push("thin unit margin".to_string());
        }
        if inputs.rank.is_none() {
            signals.push("no sales rank observed".to_string());
        } else if inputs.rank.is_some_and(|r| r > 50_000) {
            signals.push("slow sales rank".to_string());
        }
        if inputs
            .seller_count
            .is_some_and(|s| s > self.config.competition.sellers_high)
        {
            signals.push("crowded listing".to_string());
        }
        if inputs.rank_trend_7d_pct.is_some_and(|t| t > 5.0) {
            signals.push("rank slipping over 7 days".to_string());
        }
        if components.time_pressure.score < self.config.time_pressure.min_points {
            signals.push("no actionable window".to_string());
        }
        signals
    }

    #[allow(clippy::too_many_arguments)]
    fn thesis(
        &self,
        inputs: &ScoringInputs,
        components: &ComponentBreakdown,
        final_score: i32,
        window_days: i32,
        urgency: UrgencyLevel,
        estimates: &EconomicEstimates,
        rejected: bool,
    ) -> String {
        if rejected {
            return format!(
                "{}: time pressure {}/10 is below the actionable floor; no current window.",
                inputs.asin, components.time_pressure.score
            );
        }
        format!(
            "{}: score {}/100 (margin {}/30, velocity {}/25, competition {}/20, gap {}/15, pressure {}/10); \
             est. {:.0} units/mo for ${:.0}/mo profit; window ~{} days ({}).",
            inputs.asin,
            final_score,
            components.margin.score,
            components.velocity.score,
            components.competition.score,
            components.gap.score,
            components.time_pressure.score,
            estimates.monthly_units,
            estimates.monthly_profit,
            window_days,
            urgency,
        )
    }
}

/// Rank acceleration: improvement rate over the last 7 days, positive when
/// the rank number is dropping.
fn rank_acceleration(inputs: &ScoringInputs) -> f64 {
    -inputs.rank_trend_7d_pct.unwrap_or(0.0)
}

fn inputs_hash(inputs: &ScoringInputs) -> String {
    let serialized = serde_json::to_string(inputs).unwrap_or_default();
    hex::encode(Sha256::digest(serialized.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nicheradar_core::Asin;

    fn inputs(asin: &str) -> ScoringInputs {
        ScoringInputs {
            asin: Asin::parse(asin).unwrap(),
            price: Some(25.0),
            rank: Some(4_000),
            review_count: Some(120),
            rating_avg: Some(3.9),
            seller_count: Some(4),
            negative_share_pct: Some(22.0),
            rank_trend_7d_pct: Some(-8.0),
            rank_trend_30d_pct: Some(-12.0),
            reviews_per_month: Some(15.0),
            price_volatility_pct: Some(12.0),
            seller_churn_pct: Some(25.0),
            stockouts_30d: 2,
            top10_avg_reviews: Some(800.0),
            improvement_score: Some(0.6),
            captured_at: chrono::DateTime::parse_from_rfc3339("2026-07-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    fn config() -> ScoringConfig {
        ScoringConfig::default()
    }

    #[test]
    fn components_respect_their_caps() {
        let config = config();
        let scorer = OpportunityScorer::new(&config);
        let mut maxed = inputs("B01ABCD234");
        maxed.price = Some(1000.0);
        maxed.rank = Some(400);
        maxed.review_count = Some(10);
        maxed.top10_avg_reviews = Some(1000.0);
        maxed.negative_share_pct = Some(40.0);
        maxed.seller_count = Some(1);
        maxed.seller_churn_pct = Some(40.0);
        maxed.rank_trend_7d_pct = Some(-20.0);
        maxed.rank_trend_30d_pct = Some(-30.0);
        maxed.reviews_per_month = Some(50.0);
        maxed.price_volatility_pct = Some(30.0);
        maxed.stockouts_30d = 4;

        let artifact = scorer.score(RunId::new(), &maxed, Utc::now());
        let components: ComponentBreakdown =
            serde_json::from_value(artifact.components.clone()).unwrap();
        assert_eq!(components.margin.score, 30);
        assert_eq!(components.velocity.score, 25);
        assert_eq!(components.competition.score, 20);
        assert_eq!(components.gap.score, 15);
        assert_eq!(components.time_pressure.score, 10);
        assert!((artifact.base_score - 1.0).abs() < 1e-9);
        assert!(artifact.final_score <= 100);
        assert!(artifact.time_multiplier >= 0.5 && artifact.time_multiplier <= 2.0);
        assert!(!artifact.rejected);
    }

    #[test]
    fn quiet_market_multiplier_matches_geometric_mean_fixture() {
        let config = config();
        let scorer = OpportunityScorer::new(&config);
        let mut quiet = inputs("B01ABCD234");
        quiet.price_volatility_pct = Some(0.0);
        quiet.seller_churn_pct = Some(0.0);
        quiet.stockouts_30d = 0;
        // Rank worsening 10% over 7 days: acceleration is -10%.
        quiet.rank_trend_7d_pct = Some(10.0);

        let artifact = scorer.score(RunId::new(), &quiet, Utc::now());
        let expected = (0.8f64 * 0.8 * 1.0 * 0.8).powf(0.25);
        assert!((artifact.time_multiplier - expected).abs() < 1e-9);
    }

    #[test]
    fn low_time_pressure_rejects_with_no_window() {
        let config = config();
        let scorer = OpportunityScorer::new(&config);
        let mut gated = inputs("B01ABCD234");
        // Only volatility contributes: 12% -> 2 points, below the gate.
        gated.stockouts_30d = 0;
        gated.rank_trend_7d_pct = Some(10.0);
        gated.price_volatility_pct = Some(12.0);

        let artifact = scorer.score(RunId::new(), &gated, Utc::now());
        let components: ComponentBreakdown =
            serde_json::from_value(artifact.components.clone()).unwrap();
        assert_eq!(components.time_pressure.score, 2);
        assert!(artifact.rejected);
        assert_eq!(artifact.rejection_reason.as_deref(), Some(REJECTION_NO_WINDOW));
        assert_eq!(artifact.action, "discard");
    }

    #[test]
    fn identical_inputs_produce_identical_artifacts() {
        let config = config();
        let scorer = OpportunityScorer::new(&config);
        let run_id = RunId::new();
        let scored_at = Utc::now();
        let fixed = inputs("B01ABCD234");

        let first = scorer.score(run_id, &fixed, scored_at);
        let second = scorer.score(run_id, &fixed, scored_at);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(first.inputs_hash, second.inputs_hash);
    }

    #[test]
    fn final_score_is_rounded_product_of_base_and_multiplier() {
        let config = config();
        let scorer = OpportunityScorer::new(&config);
        let fixed = inputs("B01ABCD234");
        let artifact = scorer.score(RunId::new(), &fixed, Utc::now());

        let base_points = (artifact.base_score * 100.0).round();
        let expected = (base_points * artifact.time_multiplier).round() as i32;
        assert_eq!(artifact.final_score, expected.clamp(0, 100));
    }

    #[test]
    fn review_bonus_only_lifts_rank_score() {
        let config = config();
        let scorer = OpportunityScorer::new(&config);
        let with_profile = inputs("B01ABCD234");
        let mut without_profile = inputs("B01ABCD234");
        without_profile.improvement_score = None;

        let bonus = scorer.score(RunId::new(), &with_profile, Utc::now());
        let plain = scorer.score(RunId::new(), &without_profile, Utc::now());

        assert_eq!(bonus.final_score, plain.final_score);
        assert_eq!(bonus.base_score, plain.base_score);
        assert!(bonus.rank_score > plain.rank_score);
        let expected_bonus = 0.6 * config.review_bonus_weight * plain.risk_adjusted_value;
        assert!((bonus.rank_score - plain.rank_score - expected_bonus).abs() < 1e-6);
    }

    #[test]
    fn window_shrinks_as_multiplier_grows() {
        let config = config();
        let scorer = OpportunityScorer::new(&config);
        assert_eq!(scorer.window_days(1.0), 70);
        assert_eq!(scorer.window_days(2.0), 9);
        assert_eq!(scorer.window_days(1.5), 21);
        assert_eq!(scorer.window_days(0.5), 365);
        assert!(scorer.window_days(2.0) < scorer.window_days(1.0));
    }

    #[test]
    fn missing_price_zeroes_margin_and_economics() {
        let config = config();
        let scorer = OpportunityScorer::new(&config);
        let mut no_price = inputs("B01ABCD234");
        no_price.price = None;

        let artifact = scorer.score(RunId::new(), &no_price, Utc::now());
        let components: ComponentBreakdown =
            serde_json::from_value(artifact.components.clone()).unwrap();
        assert_eq!(components.margin.score, 0);
        assert_eq!(artifact.monthly_profit, 0.0);
        assert_eq!(artifact.risk_adjusted_value, 0.0);
    }
}
