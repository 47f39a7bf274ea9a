pub mod config;
pub mod database;
pub mod error;
pub mod types;

pub use config::{Config, DatabaseConfig, IngestionConfig, ScoringConfig, ShortlistConfig};
pub use database::DatabasePool;
pub use error::{Error, ErrorKind, Result};
pub use types::*;

// Re-export commonly used types from dependencies
pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;
