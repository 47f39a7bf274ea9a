//! Review intelligence: deterministic extraction of defect signals from a
//! fixed lexicon and wish requests from regex patterns, aggregated into a
//! per-product improvement profile.

pub mod extractor;
pub mod lexicon;
pub mod model;
pub mod repository;

pub use extractor::{ExtractionOutcome, ReviewExtractor};
pub use lexicon::{DefectLexicon, LEXICON_VERSION};
pub use model::{
    DefectSignal, DefectType, FeatureRequest, ImprovementProfile, NewReview, Review,
};
pub use repository::{PostgresReviewRepository, ReviewRepository};
