//! Deterministic review-signal extraction.
//!
//! Inputs are the stored reviews with rating at most 3 and a non-empty
//! body. Defect detection is substring matching against the fixed lexicon;
//! wish extraction runs the six capture patterns. Both aggregate into an
//! improvement profile whose score feeds the shortlist ranker as a bonus,
//! never the base score.

use crate::reviews::lexicon::{normalize_phrase, DefectLexicon, WISH_PATTERNS};
use crate::reviews::model::{
    DefectSignal, DefectType, FeatureRequest, ImprovementProfile, Review,
};
use nicheradar_core::{Asin, RunId};
use std::collections::BTreeMap;

const NEGATIVE_RATING_CEILING: f64 = 3.0;
const MAX_QUOTES: usize = 3;
const TOP_DEFECTS: usize = 5;
const MAX_QUOTE_CHARS: usize = 200;

/// Everything extracted for one product in one run.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub defects: Vec<DefectSignal>,
    pub wishes: Vec<FeatureRequest>,
    pub dominant_pain: Option<DefectType>,
    pub improvement_score: f64,
    pub reviews_analyzed: i32,
    pub negative_reviews_analyzed: i32,
    pub reviews_ready: bool,
    /// Reviews that entered the profile, for the analyzed-at marker
    pub analyzed_review_ids: Vec<String>,
}

impl ExtractionOutcome {
    pub fn to_profile(&self, asin: Asin, run_id: RunId) -> ImprovementProfile {
        let top_defects: Vec<&DefectSignal> = self.defects.iter().take(TOP_DEFECTS).collect();
        ImprovementProfile {
            asin,
            run_id,
            top_defects: serde_json::to_value(top_defects).unwrap_or_default(),
            missing_features: serde_json::to_value(&self.wishes).unwrap_or_default(),
            dominant_pain: self.dominant_pain,
            improvement_score: self.improvement_score,
            reviews_analyzed: self.reviews_analyzed,
            negative_reviews_analyzed: self.negative_reviews_analyzed,
            reviews_ready: self.reviews_ready,
        }
    }
}

pub struct ReviewExtractor<'a> {
    lexicon: &'a DefectLexicon,
    reviews_ready_floor: i64,
}

struct DefectAccumulator {
    frequency: i32,
    base_weight: f64,
    quotes: Vec<String>,
}

struct WishAccumulator {
    mentions: i32,
    quotes: Vec<String>,
}

impl<'a> ReviewExtractor<'a> {
    pub fn new(lexicon: &'a DefectLexicon, reviews_ready_floor: i64) -> Self {
        Self {
            lexicon,
            reviews_ready_floor,
        }
    }

    pub fn extract(&self, reviews: &[Review]) -> ExtractionOutcome {
        let negatives: Vec<&Review> = reviews
            .iter()
            .filter(|r| {
                r.rating.is_some_and(|rating| rating <= NEGATIVE_RATING_CEILING)
                    && r.body.as_deref().is_some_and(|b| !b.trim().is_empty())
            })
            .collect();
        let negative_count = negatives.len() as i32;

        let mut defect_acc: BTreeMap<&'static str, DefectAccumulator> = BTreeMap::new();
        let mut defect_types: BTreeMap<&'static str, DefectType> = BTreeMap::new();
        let mut wish_acc: BTreeMap<String, WishAccumulator> = BTreeMap::new();
        let mut matched_reviews = 0i32;

        for review in &negatives {
            let body = review.body.as_deref().unwrap_or_default();
            let body_lower = body.to_lowercase();

            let hits = self.lexicon.matches(&body_lower);
            if !hits.is_empty() {
                matched_reviews += 1;
            }
            for (defect_type, base_weight, keyword) in hits {
                let acc = defect_acc
                    .entry(defect_type.as_str())
                    .or_insert(DefectAccumulator {
                        frequency: 0,
                        base_weight,
                        quotes: Vec::new(),
                    });
                defect_types.insert(defect_type.as_str(), defect_type);
                acc.frequency += 1;
                acc.quotes.push(quote_for(body, keyword));
            }

            for pattern in WISH_PATTERNS.iter() {
                for capture in pattern.captures_iter(&body_lower) {
                    let phrase = normalize_phrase(&capture[1]);
                    if phrase.is_empty() {
                        continue;
                    }
                    let acc = wish_acc.entry(phrase).or_insert(WishAccumulator {
                        mentions: 0,
                        quotes: Vec::new(),
                    });
                    acc.mentions += 1;
                    acc.quotes.push(truncate(body, MAX_QUOTE_CHARS));
                }
            }
        }

        let mut defects: Vec<DefectSignal> = defect_acc
            .into_iter()
            .map(|(name, mut acc)| {
                // Shortest matches preferred to limit quote length.
                acc.quotes.sort_by_key(|q| q.len());
                acc.quotes.truncate(MAX_QUOTES);
                let frequency_factor =
                    (2.0 * acc.frequency as f64 / negative_count.max(1) as f64).min(1.0);
                DefectSignal {
                    defect_type: defect_types[name],
                    frequency: acc.frequency,
                    severity_score: (acc.base_weight * frequency_factor).min(1.0),
                    example_quotes: acc.quotes,
                    reviews_scanned: reviews.len() as i32,
                    negative_reviews_scanned: negative_count,
                }
            })
            .collect();

        // Severity descending, then frequency, then lexical order.
        defects.sort_by(|a, b| {
            b.severity_score
                .partial_cmp(&a.severity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.frequency.cmp(&a.frequency))
                .then(a.defect_type.as_str().cmp(b.defect_type.as_str()))
        });

        let mut wishes: Vec<FeatureRequest> = wish_acc
            .into_iter()
            .map(|(phrase, mut acc)| {
                acc.quotes.sort_by_key(|q| q.len());
                acc.quotes.truncate(MAX_QUOTES);
                FeatureRequest {
                    phrase,
                    mentions: acc.mentions,
                    confidence: (acc.mentions as f64 / 10.0).min(1.0),
                    source_quotes: acc.quotes,
                }
            })
            .collect();
        wishes.sort_by(|a, b| b.mentions.cmp(&a.mentions).then(a.phrase.cmp(&b.phrase)));

        let improvement_score = improvement_score(&defects, &wishes, matched_reviews, negative_count);
        let dominant_pain = defects.first().map(|d| d.defect_type);

        ExtractionOutcome {
            dominant_pain,
            improvement_score,
            reviews_analyzed: reviews.len() as i32,
            negative_reviews_analyzed: negative_count,
            reviews_ready: negative_count as i64 >= self.reviews_ready_floor,
            analyzed_review_ids: negatives.iter().map(|r| r.review_id.clone()).collect(),
            defects,
            wishes,
        }
    }
}

/// Deterministic 0..1 improvement score:
/// frequency-weighted mean of the top five severities, scaled by defect
/// coverage, plus a capped wish bonus.
fn improvement_score(
    defects: &[DefectSignal],
    wishes: &[FeatureRequest],
    matched_reviews: i32,
    negative_count: i32,
) -> f64 {
    let coverage = matched_reviews as f64 / negative_count.max(1) as f64;

    let top = &defects[..defects.len().min(TOP_DEFECTS)];
    let weight_sum: f64 = top.iter().map(|d| d.frequency as f64).sum();
    let weighted_avg = if weight_sum > 0.0 {
        top.iter()
            .map(|d| d.severity_score * d.frequency as f64)
            .sum::<f64>()
            / weight_sum
    } else {
        0.0
    };
    let defect_score = weighted_avg * (0.5 + 0.5 * coverage);

    let strong_wishes = wishes.iter().filter(|w| w.mentions >= 3).count();
    let wish_bonus = (0.1 * strong_wishes as f64).min(0.2);

    (defect_score + wish_bonus).min(1.0)
}

/// The sentence containing the keyword, as the verbatim example quote.
fn quote_for(body: &str, keyword: &str) -> String {
    for sentence in body.split(['.', '!', '?']) {
        if sentence.to_lowercase().contains(keyword) {
            return truncate(sentence.trim(), MAX_QUOTE_CHARS);
        }
    }
    truncate(body.trim(), MAX_QUOTE_CHARS)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn review(id: &str, rating: f64, body: &str) -> Review {
        Review {
            review_id: id.to_string(),
            asin: Asin::parse("B01ABCD234").unwrap(),
            title: None,
            body: Some(body.to_string()),
            rating: Some(rating),
            verified: true,
            review_date: None,
            captured_at: Utc::now(),
            analyzed_at: None,
        }
    }

    fn extractor(lexicon: &DefectLexicon) -> ReviewExtractor<'_> {
        ReviewExtractor::new(lexicon, 20)
    }

    #[test]
    fn single_keyword_per_type_yields_base_weight_scaled_by_negatives() {
        let lexicon = DefectLexicon::standard();
        // One review matching exactly two types, three more negatives with
        // no matches: N = 4, frequency factor = min(1, 2/4) = 0.5.
        let reviews = vec![
            review("r1", 2.0, "It slips off the dash and the arm cracked."),
            review("r2", 1.0, "Not worth the money at all."),
            review("r3", 2.0, "Disappointed with this one."),
            review("r4", 3.0, "Mediocre product overall."),
        ];
        let outcome = extractor(&lexicon).extract(&reviews);

        assert_eq!(outcome.defects.len(), 2);
        for signal in &outcome.defects {
            assert_eq!(signal.frequency, 1);
            let base = lexicon.base_weight(signal.defect_type).unwrap();
            assert!((signal.severity_score - base * 0.5).abs() < 1e-9);
            assert_eq!(signal.negative_reviews_scanned, 4);
        }
    }

    #[test]
    fn single_negative_review_gets_full_base_weight() {
        let lexicon = DefectLexicon::standard();
        let reviews = vec![review("r1", 1.0, "Stopped working on day two.")];
        let outcome = extractor(&lexicon).extract(&reviews);

        assert_eq!(outcome.defects.len(), 1);
        let signal = &outcome.defects[0];
        assert_eq!(signal.defect_type, DefectType::MechanicalFailure);
        // frequency factor = min(1, 2/1) = 1
        assert!((signal.severity_score - 0.90).abs() < 1e-9);
    }

    #[test]
    fn positive_and_bodyless_reviews_are_excluded() {
        let lexicon = DefectLexicon::standard();
        let mut no_body = review("r2", 1.0, "");
        no_body.body = None;
        let reviews = vec![
            review("r1", 5.0, "It slips but I love it anyway."),
            no_body,
            review("r3", 2.0, "   "),
        ];
        let outcome = extractor(&lexicon).extract(&reviews);
        assert_eq!(outcome.negative_reviews_analyzed, 0);
        assert!(outcome.defects.is_empty());
        assert_eq!(outcome.reviews_analyzed, 3);
    }

    #[test]
    fn dominant_pain_is_highest_aggregated_severity() {
        let lexicon = DefectLexicon::standard();
        // durability in both reviews saturates its frequency factor and
        // lands at 0.75; heat issue appears once and stays below it.
        let reviews = vec![
            review("r1", 2.0, "The clip cracked and it overheats badly."),
            review("r2", 1.0, "Mine snapped within a week."),
        ];
        let outcome = extractor(&lexicon).extract(&reviews);
        assert_eq!(outcome.dominant_pain, Some(DefectType::Durability));
    }

    #[test]
    fn wish_mentions_aggregate_by_normalized_phrase() {
        let lexicon = DefectLexicon::standard();
        let reviews = vec![
            review("r1", 2.0, "i wish it had a longer cable"),
            review("r2", 3.0, "honestly it needs a longer cable"),
            review("r3", 2.0, "i wish it had a longer cable for my desk"),
        ];
        let outcome = extractor(&lexicon).extract(&reviews);
        let wish = outcome
            .wishes
            .iter()
            .find(|w| w.phrase == "longer cable")
            .expect("phrase aggregated");
        assert_eq!(wish.mentions, 2);
        assert!((wish.confidence - 0.2).abs() < 1e-9);
    }

    #[test]
    fn improvement_score_combines_defects_coverage_and_wishes() {
        let lexicon = DefectLexicon::standard();
        // Every negative review matches mechanical failure: coverage 1,
        // frequency factor saturates, severity 0.90. Three wish mentions
        // add 0.1.
        let reviews = vec![
            review("r1", 1.0, "Stopped working. needs a stronger spring"),
            review("r2", 2.0, "Stopped working fast. needs a stronger spring"),
            review("r3", 1.0, "Mine also stopped working, needs a stronger spring"),
        ];
        let outcome = extractor(&lexicon).extract(&reviews);
        // defect_score = 0.90 * (0.5 + 0.5 * 1.0) = 0.90; bonus 0.1
        assert!((outcome.improvement_score - 1.0).abs() < 1e-9);
        assert!(!outcome.reviews_ready);
    }

    #[test]
    fn reviews_ready_needs_twenty_negatives() {
        let lexicon = DefectLexicon::standard();
        let reviews: Vec<Review> = (0..20)
            .map(|i| review(&format!("r{i}"), 2.0, "it rattles a lot"))
            .collect();
        let outcome = extractor(&lexicon).extract(&reviews);
        assert!(outcome.reviews_ready);
        assert_eq!(outcome.negative_reviews_analyzed, 20);
    }

    #[test]
    fn quotes_prefer_shortest_matches_and_cap_at_three() {
        let lexicon = DefectLexicon::standard();
        let reviews = vec![
            review("r1", 2.0, "This product rattles all the time when driving on any road surface whatsoever."),
            review("r2", 1.0, "It rattles."),
            review("r3", 2.0, "Rattles on the highway quite a bit."),
            review("r4", 1.0, "Arrived fine but it rattles in the mount."),
        ];
        let outcome = extractor(&lexicon).extract(&reviews);
        let signal = &outcome.defects[0];
        assert_eq!(signal.example_quotes.len(), 3);
        assert_eq!(signal.example_quotes[0], "It rattles");
    }
}
