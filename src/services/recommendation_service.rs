// RecommendationService - runs one recommendation request against one snapshot
// Sits between the HTTP layer and the scoring engines

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::config::RecommenderConfig;
use crate::core::{PostId, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::cache::RankingCache;
use crate::infrastructure::database::InteractionRepository;
use crate::infrastructure::monitoring::{MetricsCollector, RecommendationMetrics, RequestOutcome};
use crate::infrastructure::single_flight::SingleFlight;
use crate::infrastructure::snapshot::{ScoringSnapshot, SnapshotSettings, SnapshotStore};
use crate::models::{
    Algorithm, DestinationRecommendation, Interaction, PopularPost, Recommendation,
    RecommendationExplanation, RecommendationStats, SimilarPost, SuggestedFollow,
};
use crate::recommender::explanation::post_strategy;
use crate::recommender::{
    explain, popularity_ranking, CollaborativeEngine, ContentEngine, DestinationRanker,
    FeedAssembler, FollowSuggester, HybridRanker, HybridWeights, RankedPost,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FeedKey {
    user_id: UserId,
    limit: usize,
    session_excludes: Vec<PostId>,
}

pub struct RecommendationService {
    repository: Arc<dyn InteractionRepository>,
    snapshots: Arc<SnapshotStore>,
    config: RecommenderConfig,
    collaborative: CollaborativeEngine,
    ranker: HybridRanker,
    assembler: FeedAssembler,
    ranking_cache: RankingCache,
    in_flight: SingleFlight<FeedKey, Vec<Recommendation>>,
    metrics: Arc<MetricsCollector>,
}

impl RecommendationService {
    pub fn new(repository: Arc<dyn InteractionRepository>, config: RecommenderConfig) -> Self {
        let metrics = Arc::new(MetricsCollector::new());
        let snapshots = Arc::new(SnapshotStore::new(
            repository.clone(),
            SnapshotSettings::from(&config),
            metrics.clone(),
        ));

        Self {
            repository,
            snapshots,
            collaborative: CollaborativeEngine::new(config.k_neighbors),
            ranker: HybridRanker::new(HybridWeights {
                collaborative: config.collaborative_weight,
                content: config.content_weight,
            }),
            assembler: FeedAssembler::new(
                config.max_consecutive_attribute,
                config.popularity_half_life_hours,
            ),
            ranking_cache: RankingCache::new(config.ranking_cache_capacity),
            in_flight: SingleFlight::new(),
            metrics,
            config,
        }
    }

    pub fn snapshots(&self) -> Arc<SnapshotStore> {
        self.snapshots.clone()
    }

    pub fn config(&self) -> &RecommenderConfig {
        &self.config
    }

    pub async fn get_recommendations(
        self: &Arc<Self>,
        user_id: UserId,
        limit: usize,
    ) -> AppResult<Vec<Recommendation>> {
        self.get_recommendations_excluding(user_id, limit, &[]).await
    }

    /// Personalized feed for the user. `session_excludes` are posts already
    /// rendered to the user in this session.
    ///
    /// Never fails for lack of personalization: cold-start users get content
    /// or popularity entries. Only store read failures are returned.
    #[instrument(skip(self, session_excludes), fields(excludes = session_excludes.len()))]
    pub async fn get_recommendations_excluding(
        self: &Arc<Self>,
        user_id: UserId,
        limit: usize,
        session_excludes: &[PostId],
    ) -> AppResult<Vec<Recommendation>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut session_excludes = session_excludes.to_vec();
        session_excludes.sort();
        session_excludes.dedup();

        let key = FeedKey {
            user_id,
            limit,
            session_excludes: session_excludes.clone(),
        };
        let this = Arc::clone(self);
        let (result, shared) = self
            .in_flight
            .run(key, move || async move {
                this.compute_feed(user_id, limit, session_excludes).await
            })
            .await;

        if shared {
            self.metrics.record_shared_flight().await;
        }
        result
    }

    async fn compute_feed(
        &self,
        user_id: UserId,
        limit: usize,
        session_excludes: Vec<PostId>,
    ) -> AppResult<Vec<Recommendation>> {
        let started = Instant::now();
        let outcome = self.try_compute_feed(user_id, limit, session_excludes).await;

        match &outcome {
            Ok((feed, outcome)) => {
                self.metrics
                    .record_request(*outcome, started.elapsed(), feed.iter().map(|r| &r.algorithm))
                    .await;
            }
            Err(_) => {
                self.metrics
                    .record_request(RequestOutcome::Failed, started.elapsed(), std::iter::empty())
                    .await;
            }
        }

        outcome.map(|(feed, _)| feed)
    }

    async fn try_compute_feed(
        &self,
        user_id: UserId,
        limit: usize,
        session_excludes: Vec<PostId>,
    ) -> AppResult<(Vec<Recommendation>, RequestOutcome)> {
        let snapshot = self.snapshots.current().await?;
        // Scoring reads the snapshot row so history, matrix and corpus share one
        // version. Exclusions also take the live store rows, which may be newer.
        let history = snapshot.matrix.interacted_posts(user_id);
        let mut seen = self.repository.list_user_interactions(user_id).await?;
        seen.extend_from_slice(&history);
        let excluded = Self::exclusions(&snapshot, user_id, &seen, &session_excludes);
        let cold_start = history.is_empty();

        let scoring = self.score(snapshot.clone(), user_id, history, &excluded);
        let (ranked, outcome) = match tokio::time::timeout(self.config.request_timeout(), scoring).await {
            Ok(ranked) => {
                let ranked = ranked?;
                self.ranking_cache
                    .store(user_id, snapshot.version, ranked.clone())
                    .await;
                let outcome = if cold_start {
                    RequestOutcome::ColdStart
                } else {
                    RequestOutcome::Scored
                };
                (ranked, outcome)
            }
            Err(_) => {
                let cached = self.ranking_cache.get(user_id).await;
                self.metrics.record_cache_lookup(cached.is_some()).await;
                warn!(
                    user_id = %user_id,
                    timeout_ms = self.config.request_timeout_ms,
                    cached_version = ?cached.as_ref().map(|c| c.snapshot_version),
                    "Scoring timed out, serving fallback ranking"
                );
                let ranked = cached.map(|c| c.ranked).unwrap_or_default();
                (ranked, RequestOutcome::TimedOut)
            }
        };

        let feed = self
            .assembler
            .assemble(ranked, &snapshot.posts, &excluded, limit, snapshot.built_at);

        info!(
            user_id = %user_id,
            snapshot_version = snapshot.version,
            returned = feed.len(),
            algorithm = feed.first().map(|r| r.algorithm.as_str()).unwrap_or("none"),
            cold_start,
            "Recommendations served"
        );
        Ok((feed, outcome))
    }

    /// Own posts, everything the user interacted with and the session excludes.
    fn exclusions(
        snapshot: &ScoringSnapshot,
        user_id: UserId,
        history: &[PostId],
        session_excludes: &[PostId],
    ) -> BTreeSet<PostId> {
        snapshot
            .posts
            .values()
            .filter(|post| post.author_id == user_id)
            .map(|post| post.id)
            .chain(history.iter().copied())
            .chain(session_excludes.iter().copied())
            .collect()
    }

    /// Collaborative and content scoring run concurrently on blocking workers,
    /// then the hybrid ranker merges them.
    async fn score(
        &self,
        snapshot: Arc<ScoringSnapshot>,
        user_id: UserId,
        history: Vec<PostId>,
        excluded: &BTreeSet<PostId>,
    ) -> AppResult<Vec<RankedPost>> {
        let candidates: BTreeMap<PostId, DateTime<Utc>> = snapshot
            .posts
            .values()
            .filter(|post| !excluded.contains(&post.id))
            .map(|post| (post.id, post.created_at))
            .collect();
        let candidate_ids: Vec<PostId> = candidates.keys().copied().collect();

        let collaborative_task = {
            let snapshot = snapshot.clone();
            let engine = self.collaborative.clone();
            tokio::task::spawn_blocking(move || engine.score(&snapshot.matrix, user_id))
        };
        let content_task = {
            let snapshot = snapshot.clone();
            tokio::task::spawn_blocking(move || {
                ContentEngine::score(&snapshot.corpus, &history, &candidate_ids)
            })
        };

        let (collaborative, content) = tokio::try_join!(collaborative_task, content_task)?;
        Ok(self.ranker.rank(&collaborative, &content, &candidates))
    }

    /// Most popular posts overall, decayed by age.
    #[instrument(skip(self))]
    pub async fn get_popular_posts(&self, limit: usize) -> AppResult<Vec<PopularPost>> {
        let snapshot = self.snapshots.current().await?;
        let mut ranked = popularity_ranking(
            snapshot.posts.values(),
            &BTreeSet::new(),
            snapshot.built_at,
            self.config.popularity_half_life_hours,
        );
        ranked.truncate(limit);

        Ok(ranked
            .into_iter()
            .map(|entry| PopularPost {
                post_id: entry.post_id,
                score: entry.score,
                algorithm: Algorithm::PopularityBased,
            })
            .collect())
    }

    async fn require_user(&self, user_id: UserId) -> AppResult<()> {
        if self.repository.get_user(user_id).await?.is_none() {
            return Err(AppError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_recommendation_stats(&self, user_id: UserId) -> AppResult<RecommendationStats> {
        self.require_user(user_id).await?;

        let snapshot = self.snapshots.current().await?;
        let history = self.repository.list_user_interactions(user_id).await?;
        let excluded = Self::exclusions(&snapshot, user_id, &history, &[]);
        let posts_created = snapshot
            .posts
            .values()
            .filter(|post| post.author_id == user_id)
            .count();
        let candidate_pool_size = snapshot
            .posts
            .keys()
            .filter(|post_id| !excluded.contains(post_id))
            .count();
        let is_cold_start = history.is_empty();
        let neighbors = self.collaborative.neighbors(&snapshot.matrix, user_id).len();

        Ok(RecommendationStats {
            user_id,
            interaction_count: history.len(),
            is_cold_start,
            candidate_pool_size,
            posts_created,
            snapshot_version: snapshot.version,
            strategy: post_strategy(snapshot.matrix.interacted_posts(user_id).len(), neighbors),
        })
    }

    /// Unexplored locations for the user, best match first.
    #[instrument(skip(self))]
    pub async fn get_destination_recommendations(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> AppResult<Vec<DestinationRecommendation>> {
        self.require_user(user_id).await?;

        let snapshot = self.snapshots.current().await?;
        let engine = self.collaborative.clone();
        let destinations = tokio::task::spawn_blocking(move || {
            DestinationRanker::new(&engine).recommend(
                &snapshot.corpus,
                &snapshot.matrix,
                &snapshot.posts,
                user_id,
                limit,
            )
        })
        .await?;

        info!(
            user_id = %user_id,
            returned = destinations.len(),
            algorithm = destinations.first().map(|d| d.algorithm.as_str()).unwrap_or("none"),
            "Destination recommendations served"
        );
        Ok(destinations)
    }

    #[instrument(skip(self))]
    pub async fn get_recommendation_explanation(
        &self,
        user_id: UserId,
    ) -> AppResult<RecommendationExplanation> {
        self.require_user(user_id).await?;

        let snapshot = self.snapshots.current().await?;
        Ok(explain(
            &snapshot.matrix,
            &snapshot.posts,
            &snapshot.follows,
            &self.collaborative,
            user_id,
            snapshot.version,
        ))
    }

    #[instrument(skip(self))]
    pub async fn get_suggested_follows(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> AppResult<Vec<SuggestedFollow>> {
        let snapshot = self.snapshots.current().await?;
        let engine = self.collaborative.clone();
        let suggestions = tokio::task::spawn_blocking(move || {
            FollowSuggester::new(&engine).suggest(&snapshot.matrix, &snapshot.follows, user_id, limit)
        })
        .await?;

        info!(user_id = %user_id, returned = suggestions.len(), "Follow suggestions served");
        Ok(suggestions)
    }

    #[instrument(skip(self))]
    pub async fn get_similar_posts(&self, post_id: PostId, limit: usize) -> AppResult<Vec<SimilarPost>> {
        let snapshot = self.snapshots.current().await?;
        let similar = ContentEngine::similar_posts(&snapshot.corpus, post_id)
            .ok_or_else(|| AppError::NotFound(format!("Post {} not found", post_id)))?;

        Ok(similar
            .into_iter()
            .take(limit)
            .map(|(post_id, score)| SimilarPost {
                post_id,
                score,
                algorithm: Algorithm::ContentBasedFiltering,
            })
            .collect())
    }

    /// Folds a freshly stored interaction into the live snapshot.
    pub async fn record_interaction(&self, interaction: &Interaction) -> AppResult<u64> {
        let version = self.snapshots.record_interaction(interaction).await?;
        Ok(version)
    }

    /// Forces the next request to rebuild from the store.
    pub fn invalidate(&self) {
        self.snapshots.invalidate();
    }

    pub async fn metrics(&self) -> RecommendationMetrics {
        let mut metrics = self.metrics.get_metrics_snapshot().await;
        metrics.cached_rankings = self.ranking_cache.len().await;
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::sqlite_database::{NewPost, SqliteRepository};
    use crate::models::InteractionKind;

    async fn repository_with_shared_likes() -> (SqliteRepository, UserId) {
        let repo = SqliteRepository::new_in_memory().await.unwrap();
        let author = repo.create_user("author", &[], None).await.unwrap();
        let a = repo.create_user("a", &[], None).await.unwrap();
        let b = repo.create_user("b", &[], None).await.unwrap();

        let mut posts = Vec::new();
        for (location, caption) in [("Manali", "snow trek"), ("Manali", "pine hike"), ("Goa", "beach shack")] {
            let post = repo
                .create_post(NewPost {
                    author_id: author,
                    location: Some(location.to_string()),
                    category: None,
                    caption: Some(caption.to_string()),
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
            posts.push(post);
        }
        for post in &posts {
            repo.record_interaction(a, *post, InteractionKind::Like, Utc::now()).await.unwrap();
        }
        for post in &posts[..2] {
            repo.record_interaction(b, *post, InteractionKind::Like, Utc::now()).await.unwrap();
        }
        (repo, b)
    }

    #[tokio::test]
    async fn test_timeout_serves_last_good_ranking() {
        let (repo, user) = repository_with_shared_likes().await;
        let mut service = Arc::new(RecommendationService::new(
            Arc::new(repo),
            RecommenderConfig::default(),
        ));

        let fresh = service.get_recommendations(user, 10).await.unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].algorithm, Algorithm::CollaborativeFiltering);

        Arc::get_mut(&mut service).unwrap().config.request_timeout_ms = 0;
        let degraded = service.get_recommendations(user, 10).await.unwrap();
        assert_eq!(degraded, fresh);

        let metrics = service.metrics().await;
        assert_eq!(metrics.timeouts, 1);
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.cache_misses, 0);
        assert_eq!(metrics.popularity_fallbacks, 0);
        assert_eq!(metrics.cached_rankings, 1);
    }
}
