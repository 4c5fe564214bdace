// Scoring Snapshot - versioned, immutable view of the data the engines score against
//
// Readers clone an `Arc<ScoringSnapshot>` and keep it for the whole request.
// A single writer (rebuild or incremental append) swaps in a new Arc, so an
// in-flight request never observes a half-updated matrix.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::{InteractionWeighting, RecommenderConfig};
use crate::core::PostId;
use crate::error::AppResult;
use crate::infrastructure::database::InteractionRepository;
use crate::infrastructure::monitoring::MetricsCollector;
use crate::models::{Follow, Interaction, InteractionKind, Post, PostFilter};
use crate::recommender::{ContentBoosts, ContentCorpus, FollowGraph, InteractionMatrix};

#[derive(Debug, Clone, Copy)]
pub struct SnapshotSettings {
    pub weighting: InteractionWeighting,
    pub boosts: ContentBoosts,
}

impl From<&RecommenderConfig> for SnapshotSettings {
    fn from(config: &RecommenderConfig) -> Self {
        Self {
            weighting: config.interaction_weighting,
            boosts: ContentBoosts {
                location: config.location_boost,
                category: config.category_boost,
            },
        }
    }
}

/// Everything one request needs, frozen at `version`.
#[derive(Debug, Clone)]
pub struct ScoringSnapshot {
    pub version: u64,
    /// Time of the full rebuild; popularity decay is measured against it.
    pub built_at: DateTime<Utc>,
    pub matrix: Arc<InteractionMatrix>,
    pub corpus: Arc<ContentCorpus>,
    pub posts: Arc<BTreeMap<PostId, Post>>,
    pub follows: Arc<FollowGraph>,
}

impl ScoringSnapshot {
    pub fn empty(weighting: InteractionWeighting) -> Self {
        Self {
            version: 0,
            built_at: Utc::now(),
            matrix: Arc::new(InteractionMatrix::new(weighting)),
            corpus: Arc::new(ContentCorpus::default()),
            posts: Arc::new(BTreeMap::new()),
            follows: Arc::new(FollowGraph::default()),
        }
    }

    pub fn build(
        version: u64,
        built_at: DateTime<Utc>,
        interactions: &[Interaction],
        posts: Vec<Post>,
        follows: &[Follow],
        settings: SnapshotSettings,
    ) -> Self {
        let matrix = InteractionMatrix::build(interactions, settings.weighting);
        let corpus = ContentCorpus::build(&posts, settings.boosts);
        let posts = posts.into_iter().map(|post| (post.id, post)).collect();
        Self {
            version,
            built_at,
            matrix: Arc::new(matrix),
            corpus: Arc::new(corpus),
            posts: Arc::new(posts),
            follows: Arc::new(FollowGraph::build(follows)),
        }
    }

    pub fn post(&self, post_id: PostId) -> Option<&Post> {
        self.posts.get(&post_id)
    }
}

pub struct SnapshotStore {
    repository: Arc<dyn InteractionRepository>,
    settings: SnapshotSettings,
    current: RwLock<Arc<ScoringSnapshot>>,
    writer: Mutex<()>,
    stale: AtomicBool,
    metrics: Arc<MetricsCollector>,
}

impl SnapshotStore {
    /// Starts with an empty, stale snapshot; the first reader triggers the build.
    pub fn new(
        repository: Arc<dyn InteractionRepository>,
        settings: SnapshotSettings,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            repository,
            settings,
            current: RwLock::new(Arc::new(ScoringSnapshot::empty(settings.weighting))),
            writer: Mutex::new(()),
            stale: AtomicBool::new(true),
            metrics,
        }
    }

    /// The snapshot to score one request against, rebuilding first if stale.
    ///
    /// A failed rebuild is returned to the caller only when no snapshot has
    /// ever been built; otherwise the previous snapshot keeps serving.
    pub async fn current(&self) -> AppResult<Arc<ScoringSnapshot>> {
        if self.stale.load(Ordering::Acquire) {
            let _writer = self.writer.lock().await;
            if self.stale.load(Ordering::Acquire) {
                if let Err(e) = self.rebuild_locked().await {
                    let previous = self.current.read().await.clone();
                    if previous.version == 0 {
                        return Err(e);
                    }
                    warn!(
                        error = %e,
                        version = previous.version,
                        "Snapshot rebuild failed, serving previous snapshot"
                    );
                    return Ok(previous);
                }
            }
        }
        Ok(self.current.read().await.clone())
    }

    /// Unconditional full rebuild from the repository.
    pub async fn rebuild(&self) -> AppResult<Arc<ScoringSnapshot>> {
        let _writer = self.writer.lock().await;
        self.rebuild_locked().await
    }

    #[instrument(skip(self))]
    async fn rebuild_locked(&self) -> AppResult<Arc<ScoringSnapshot>> {
        // Cleared before reading so a write racing with the reads re-marks it.
        self.stale.store(false, Ordering::Release);

        let loaded = async {
            let interactions = self.repository.list_interactions().await?;
            let posts = self.repository.list_posts(&PostFilter::all()).await?;
            let follows = self.repository.list_follows().await?;
            AppResult::Ok((interactions, posts, follows))
        }
        .await;

        let (interactions, posts, follows) = match loaded {
            Ok(data) => data,
            Err(e) => {
                self.stale.store(true, Ordering::Release);
                return Err(e);
            }
        };

        let version = self.current.read().await.version + 1;
        let settings = self.settings;
        let snapshot = tokio::task::spawn_blocking(move || {
            ScoringSnapshot::build(version, Utc::now(), &interactions, posts, &follows, settings)
        })
        .await?;

        info!(
            version,
            users = snapshot.matrix.user_count(),
            posts = snapshot.posts.len(),
            vocabulary = snapshot.corpus.vocabulary_size(),
            "Scoring snapshot rebuilt"
        );

        let snapshot = Arc::new(snapshot);
        *self.current.write().await = snapshot.clone();
        self.metrics.record_snapshot_rebuild().await;
        Ok(snapshot)
    }

    /// Marks the snapshot stale; the next reader rebuilds it.
    pub fn invalidate(&self) {
        self.stale.store(true, Ordering::Release);
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    /// Appends one interaction to a copy of the current matrix and publishes
    /// it as a new version. Interactions on posts the snapshot does not know
    /// yet mark it stale instead.
    #[instrument(skip(self, interaction), fields(user_id = %interaction.user_id, post_id = %interaction.post_id))]
    pub async fn record_interaction(&self, interaction: &Interaction) -> AppResult<u64> {
        let _writer = self.writer.lock().await;
        let previous = self.current.read().await.clone();

        if !previous.posts.contains_key(&interaction.post_id) {
            debug!("Interaction on unknown post, marking snapshot stale");
            self.stale.store(true, Ordering::Release);
            return Ok(previous.version);
        }

        let mut matrix = (*previous.matrix).clone();
        matrix.add(interaction);

        let mut posts = (*previous.posts).clone();
        if let Some(post) = posts.get_mut(&interaction.post_id) {
            match interaction.kind {
                InteractionKind::Like => post.likes += 1,
                InteractionKind::Comment => post.comments += 1,
                InteractionKind::Share => post.shares += 1,
            }
        }

        let next = ScoringSnapshot {
            version: previous.version + 1,
            built_at: previous.built_at,
            matrix: Arc::new(matrix),
            corpus: previous.corpus.clone(),
            posts: Arc::new(posts),
            follows: previous.follows.clone(),
        };
        let version = next.version;
        *self.current.write().await = Arc::new(next);

        debug!(version, "Interaction appended to snapshot");
        Ok(version)
    }

    /// Periodic full rebuild. Failures are logged and retried next tick.
    pub fn spawn_refresh_task(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = self.rebuild().await {
                    warn!(error = %e, "Periodic snapshot rebuild failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::UserId;
    use crate::infrastructure::sqlite_database::{NewPost, SqliteRepository};

    async fn seeded() -> (SqliteRepository, UserId, PostId) {
        let repo = SqliteRepository::new_in_memory().await.unwrap();
        let author = repo.create_user("asha", &["beach"], Some("Mumbai")).await.unwrap();
        let post = repo
            .create_post(NewPost {
                author_id: author,
                location: Some("Goa".to_string()),
                category: Some("beach".to_string()),
                caption: Some("Sunset at Baga".to_string()),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        (repo, author, post)
    }

    fn store(repo: &SqliteRepository) -> SnapshotStore {
        SnapshotStore::new(
            Arc::new(repo.clone()),
            SnapshotSettings::from(&RecommenderConfig::default()),
            Arc::new(MetricsCollector::new()),
        )
    }

    #[tokio::test]
    async fn test_first_read_builds_snapshot() {
        let (repo, _, post) = seeded().await;
        let store = store(&repo);
        assert!(store.is_stale());

        let snapshot = store.current().await.unwrap();
        assert_eq!(snapshot.version, 1);
        assert!(snapshot.post(post).is_some());
        assert!(!store.is_stale());
    }

    #[tokio::test]
    async fn test_incremental_append_keeps_old_snapshot_intact() {
        let (repo, _, post) = seeded().await;
        let reader = repo.create_user("ravi", &[], None).await.unwrap();
        let store = store(&repo);
        let before = store.current().await.unwrap();

        let interaction = repo
            .record_interaction(reader, post, InteractionKind::Like, Utc::now())
            .await
            .unwrap();
        let version = store.record_interaction(&interaction).await.unwrap();

        let after = store.current().await.unwrap();
        assert_eq!(version, before.version + 1);
        assert_eq!(after.version, version);
        assert!(after.matrix.has_interactions(reader));
        assert_eq!(after.post(post).unwrap().likes, 1);
        assert!(!before.matrix.has_interactions(reader));
        assert_eq!(before.post(post).unwrap().likes, 0);
    }

    #[tokio::test]
    async fn test_invalidate_triggers_rebuild_with_new_posts() {
        let (repo, author, _) = seeded().await;
        let store = store(&repo);
        store.current().await.unwrap();

        let fresh = repo
            .create_post(NewPost {
                author_id: author,
                location: Some("Jaipur".to_string()),
                category: Some("culture".to_string()),
                caption: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        assert!(store.current().await.unwrap().post(fresh).is_none());

        store.invalidate();
        let rebuilt = store.current().await.unwrap();
        assert_eq!(rebuilt.version, 2);
        assert!(rebuilt.post(fresh).is_some());
    }
}
