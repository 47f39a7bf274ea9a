use nicheradar_core::{Config, DatabasePool};
use nicheradar_market_data::catalog::{CatalogRepository, PostgresCatalogRepository};
use nicheradar_market_data::scoring::{ArtifactRepository, PostgresArtifactRepository};
use nicheradar_market_data::shortlist::{PostgresShortlistRepository, ShortlistRepository};
use nicheradar_pipeline::{PostgresRunRepository, RunRepository};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: DatabasePool,
    pub catalog: Arc<dyn CatalogRepository>,
    pub artifacts: Arc<dyn ArtifactRepository>,
    pub shortlists: Arc<dyn ShortlistRepository>,
    pub runs: Arc<dyn RunRepository>,
}

impl AppState {
    pub fn new(config: Config, db: DatabasePool) -> Self {
        Self {
            catalog: Arc::new(PostgresCatalogRepository::new(db.clone())),
            artifacts: Arc::new(PostgresArtifactRepository::new(db.clone())),
            shortlists: Arc::new(PostgresShortlistRepository::new(db.clone())),
            runs: Arc::new(PostgresRunRepository::new(db.clone())),
            config,
            db,
        }
    }
}
