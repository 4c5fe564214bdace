use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::{
    config::Config,
    infrastructure::sqlite_database::SqliteRepository,
    recommendation_interface::RecommendationInterface,
    services::RecommendationService,
};

#[derive(Clone)]
pub struct AppState {
    pub recommendation_interface: RecommendationInterface,
    pub service: Arc<RecommendationService>,
    pub store: SqliteRepository,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        config.recommender.validate()?;

        // Initialize database
        let store = SqliteRepository::connect(&config.database.url, config.database.max_connections).await?;
        Ok(Self::with_store(store, config))
    }

    /// Wires the service around an already initialized store.
    pub fn with_store(store: SqliteRepository, config: Config) -> Self {
        let service = Arc::new(RecommendationService::new(
            Arc::new(store.clone()),
            config.recommender.clone(),
        ));
        let recommendation_interface = RecommendationInterface::new(service.clone(), store.clone());

        Self {
            recommendation_interface,
            service,
            store,
            config,
        }
    }

    /// Builds the first snapshot and starts the periodic rebuild.
    pub async fn start_background_refresh(&self) -> anyhow::Result<JoinHandle<()>> {
        let snapshots = self.service.snapshots();
        let snapshot = snapshots.rebuild().await?;
        info!(
            version = snapshot.version,
            posts = snapshot.posts.len(),
            "Initial scoring snapshot ready"
        );
        Ok(snapshots.spawn_refresh_task(self.config.recommender.snapshot_refresh_interval()))
    }
}
