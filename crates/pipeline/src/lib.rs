//! Controlled run orchestrator: the end-to-end ingestion, scoring and
//! shortlist pipeline with budget enforcement, data-quality gates, freeze
//! semantics and an immutable per-run audit trail.

pub mod audit;
pub mod dq;
pub mod ingest;
pub mod orchestrator;
pub mod run;

pub use audit::AuditWriter;
pub use dq::{error_rate, evaluate_dq, resolve_status, DqReport};
pub use orchestrator::{Orchestrator, RunOptions, RunReport};
pub use run::{PipelineRun, PostgresRunRepository, RunRepository};
