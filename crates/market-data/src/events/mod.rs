//! Snapshot delta events: one row per material change along the price,
//! sales-rank or stock axis, deduplicated on the
//! `(asin, snapshot_before_at, snapshot_after_at)` triple.

pub mod engine;
pub mod model;
pub mod repository;

pub use model::{NewPriceEvent, NewRankEvent, NewStockEvent, PriceEvent, RankEvent, StockEvent};
pub use repository::{EventRepository, PostgresEventRepository};
