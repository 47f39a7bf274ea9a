//! Shortlist selection: threshold gates, deterministic ordering, stability
//! accounting against the previous snapshot, and freeze/active semantics.

pub mod model;
pub mod repository;
pub mod selector;

pub use model::{NewShortlistSnapshot, ShortlistEntry, ShortlistSnapshot};
pub use repository::{PostgresShortlistRepository, ShortlistRepository};
pub use selector::{assign_ranks, SelectionOutcome, ShortlistSelector};
