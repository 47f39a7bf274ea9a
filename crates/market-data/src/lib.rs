//! # Market Data
//!
//! Catalog and time-series store for marketplace product observations,
//! plus the deterministic layers built on top of it: the snapshot delta and
//! event engine, the review-signal extractor, the opportunity scorer and
//! the shortlist selector.

pub mod catalog;
pub mod events;
pub mod reviews;
pub mod scoring;
pub mod shortlist;
pub mod snapshots;

pub use catalog::{CatalogRepository, PostgresCatalogRepository, Product, ProductUpsert};
pub use events::{EventRepository, PostgresEventRepository};
pub use reviews::{
    DefectLexicon, PostgresReviewRepository, ReviewExtractor, ReviewRepository,
};
pub use scoring::{
    ArtifactRepository, OpportunityArtifact, OpportunityScorer, PostgresArtifactRepository,
    ScoringInputs,
};
pub use shortlist::{
    assign_ranks, PostgresShortlistRepository, ShortlistRepository, ShortlistSelector,
};
pub use snapshots::{NewSnapshot, PostgresSnapshotRepository, Snapshot, SnapshotRepository};

