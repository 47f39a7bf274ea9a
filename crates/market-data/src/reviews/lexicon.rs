//! Fixed defect lexicon and wish patterns.
//!
//! The defect set is closed: each type owns a base severity weight and a
//! keyword list matched as case-insensitive substrings over the review
//! body. Changing the table requires a version bump so run snapshots stay
//! comparable.

use crate::reviews::model::DefectType;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Bumped whenever the keyword table or wish patterns change.
pub const LEXICON_VERSION: u32 = 1;

/// One lexicon entry: defect type, base severity weight, keywords.
#[derive(Debug, Clone, Serialize)]
pub struct LexiconEntry {
    pub defect_type: DefectType,
    pub base_weight: f64,
    pub keywords: Vec<&'static str>,
}

/// The frozen defect lexicon handed to the extractor by reference.
#[derive(Debug, Clone, Serialize)]
pub struct DefectLexicon {
    pub version: u32,
    pub entries: Vec<LexiconEntry>,
}

impl DefectLexicon {
    /// The standard table. Base weights are part of the scoring contract.
    pub fn standard() -> Self {
        let entries = vec![
            LexiconEntry {
                defect_type: DefectType::MechanicalFailure,
                base_weight: 0.90,
                keywords: vec![
                    "stopped working",
                    "quit working",
                    "broke after",
                    "dead on arrival",
                    "defective",
                    "motor died",
                    "won't turn on",
                    "no longer works",
                ],
            },
            LexiconEntry {
                defect_type: DefectType::PoorGrip,
                base_weight: 0.85,
                keywords: vec![
                    "slips",
                    "slippery",
                    "slides off",
                    "won't stay",
                    "doesn't stay",
                    "falls off",
                    "no grip",
                    "loses grip",
                ],
            },
            LexiconEntry {
                defect_type: DefectType::Durability,
                base_weight: 0.75,
                keywords: vec![
                    "fell apart",
                    "wore out",
                    "cracked",
                    "snapped",
                    "flimsy",
                    "cheaply made",
                    "didn't last",
                    "tore",
                ],
            },
            LexiconEntry {
                defect_type: DefectType::CompatibilityIssue,
                base_weight: 0.70,
                keywords: vec![
                    "not compatible",
                    "incompatible",
                    "doesn't work with",
                    "doesn't fit my",
                    "wrong model",
                ],
            },
            LexiconEntry {
                defect_type: DefectType::HeatIssue,
                base_weight: 0.65,
                keywords: vec![
                    "overheats",
                    "gets hot",
                    "too hot",
                    "burning smell",
                    "melted",
                ],
            },
            LexiconEntry {
                defect_type: DefectType::InstallationIssue,
                base_weight: 0.60,
                keywords: vec![
                    "hard to install",
                    "difficult to install",
                    "confusing instructions",
                    "couldn't assemble",
                    "missing screws",
                    "impossible to mount",
                ],
            },
            LexiconEntry {
                defect_type: DefectType::VibrationNoise,
                base_weight: 0.55,
                keywords: vec![
                    "rattles",
                    "noisy",
                    "vibrates",
                    "squeaks",
                    "buzzing",
                    "humming sound",
                ],
            },
            LexiconEntry {
                defect_type: DefectType::MaterialQuality,
                base_weight: 0.50,
                keywords: vec![
                    "cheap plastic",
                    "feels cheap",
                    "thin material",
                    "low quality",
                    "poor quality",
                ],
            },
            LexiconEntry {
                defect_type: DefectType::SizeFit,
                base_weight: 0.40,
                keywords: vec![
                    "too small",
                    "too big",
                    "too large",
                    "runs small",
                    "runs large",
                    "wrong size",
                ],
            },
        ];
        Self {
            version: LEXICON_VERSION,
            entries,
        }
    }

    /// Defect types whose keywords occur in the (lowercased) body.
    pub fn matches(&self, body_lower: &str) -> Vec<(DefectType, f64, &'static str)> {
        let mut hits = Vec::new();
        for entry in &self.entries {
            if let Some(keyword) = entry
                .keywords
                .iter()
                .find(|keyword| body_lower.contains(*keyword))
            {
                hits.push((entry.defect_type, entry.base_weight, *keyword));
            }
        }
        hits
    }

    pub fn base_weight(&self, defect_type: DefectType) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.defect_type == defect_type)
            .map(|e| e.base_weight)
    }
}

/// The six wish patterns. Each captures the requested feature tail.
pub static WISH_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"i wish (?:it|this|they) (?:had|was|were|came with) ([^.!?,;]{3,60})",
        r"would be (?:great|nice|better) if (?:it|this|they) (?:had|was|were|came with)? ?([^.!?,;]{3,60})",
        r"needs? a(?:n)? ([^.!?,;]{3,60})",
        r"should have (?:a |an |the )?([^.!?,;]{3,60})",
        r"missing (?:a |an |the )?([^.!?,;]{3,60})",
        r"if only it had (?:a |an |the )?([^.!?,;]{3,60})",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("wish pattern compiles"))
    .collect()
});

/// Edge stop words trimmed from captured wish phrases.
const PHRASE_STOP_WORDS: &[&str] = &[
    "a", "an", "the", "some", "more", "really", "just", "very", "also", "too",
];

/// Normalizes a captured wish tail: lowercase, collapse whitespace, trim
/// edge stop words.
pub fn normalize_phrase(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let words: Vec<&str> = lowered.split_whitespace().collect();
    let start = words
        .iter()
        .position(|w| !PHRASE_STOP_WORDS.contains(w))
        .unwrap_or(words.len());
    let end = words
        .iter()
        .rposition(|w| !PHRASE_STOP_WORDS.contains(w))
        .map(|i| i + 1)
        .unwrap_or(start);
    words[start..end].join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_weights_match_the_scoring_contract() {
        let lexicon = DefectLexicon::standard();
        let expect = [
            (DefectType::MechanicalFailure, 0.90),
            (DefectType::PoorGrip, 0.85),
            (DefectType::Durability, 0.75),
            (DefectType::CompatibilityIssue, 0.70),
            (DefectType::HeatIssue, 0.65),
            (DefectType::InstallationIssue, 0.60),
            (DefectType::VibrationNoise, 0.55),
            (DefectType::MaterialQuality, 0.50),
            (DefectType::SizeFit, 0.40),
        ];
        for (defect_type, weight) in expect {
            assert_eq!(lexicon.base_weight(defect_type), Some(weight));
        }
        assert_eq!(lexicon.entries.len(), 9);
    }

    #[test]
    fn one_review_can_match_multiple_types() {
        let lexicon = DefectLexicon::standard();
        let hits = lexicon.matches("the mount slips constantly and the clamp cracked in a week");
        let types: Vec<DefectType> = hits.iter().map(|(t, _, _)| *t).collect();
        assert!(types.contains(&DefectType::PoorGrip));
        assert!(types.contains(&DefectType::Durability));
    }

    #[test]
    fn normalize_phrase_trims_stop_words() {
        assert_eq!(normalize_phrase("a longer    Cable really"), "longer cable");
        assert_eq!(normalize_phrase("the the a"), "");
    }

    #[test]
    fn wish_patterns_capture_tails() {
        let body = "great mount but i wish it had a longer arm. also needs a quick release button";
        let mut captures = Vec::new();
        for pattern in WISH_PATTERNS.iter() {
            for cap in pattern.captures_iter(body) {
                captures.push(normalize_phrase(&cap[1]));
            }
        }
        assert!(captures.contains(&"longer arm".to_string()));
        assert!(captures.contains(&"quick release button".to_string()));
    }
}
