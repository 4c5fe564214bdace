// Infrastructure modules
pub mod database;         // Repository trait
pub mod sqlite_database;  // SQLite store
pub mod snapshot;         // Versioned scoring snapshots
pub mod cache;            // Last-good ranking cache
pub mod single_flight;    // Request de-duplication
pub mod monitoring;       // Recommendation metrics

// Re-export infrastructure components
pub use database::InteractionRepository;
pub use sqlite_database::{NewPost, SqliteRepository};
pub use snapshot::{ScoringSnapshot, SnapshotSettings, SnapshotStore};
pub use cache::{Cache, CachedRanking, RankingCache};
pub use single_flight::SingleFlight;
pub use monitoring::{MetricsCollector, RecommendationMetrics, RequestOutcome};
