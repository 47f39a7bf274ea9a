//! Deterministic opportunity scoring: five capped base-score components, a
//! four-factor time multiplier, window classification, and economic value
//! estimates, persisted as one immutable artifact per `(run, product)`.

pub mod economics;
pub mod model;
pub mod repository;
pub mod scorer;

pub use model::{
    ComponentBreakdown, ComponentScore, EconomicEstimates, OpportunityArtifact, ScoringInputs,
    TimeFactors, REJECTION_NO_WINDOW,
};
pub use repository::{ArtifactRepository, PostgresArtifactRepository};
pub use scorer::OpportunityScorer;
