// Recommendation Interface - HTTP access to the recommendation service
// Reads go through the service; interaction writes hit the store first and are
// then folded into the live snapshot. Removals mark the snapshot for rebuild.

use axum::{
    extract::{Path as AxumPath, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    core::{PostId, UserId},
    error::{AppError, AppResult},
    infrastructure::sqlite_database::SqliteRepository,
    models::InteractionKind,
    services::RecommendationService,
};

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;

#[derive(Clone)]
pub struct RecommendationInterface {
    service: Arc<RecommendationService>,
    store: SqliteRepository,
}

impl RecommendationInterface {
    pub fn new(service: Arc<RecommendationService>, store: SqliteRepository) -> Self {
        Self { service, store }
    }

    pub fn service(&self) -> Arc<RecommendationService> {
        self.service.clone()
    }

    pub async fn recommendations(
        &self,
        user_id: UserId,
        limit: usize,
        exclude: &[PostId],
    ) -> AppResult<Json<Value>> {
        let recommendations = self
            .service
            .get_recommendations_excluding(user_id, limit, exclude)
            .await?;
        Ok(Json(json!({
            "user_id": user_id,
            "count": recommendations.len(),
            "recommendations": recommendations,
        })))
    }

    pub async fn destinations(&self, user_id: UserId, limit: usize) -> AppResult<Json<Value>> {
        let destinations = self.service.get_destination_recommendations(user_id, limit).await?;
        Ok(Json(json!({
            "user_id": user_id,
            "count": destinations.len(),
            "destinations": destinations,
        })))
    }

    pub async fn explanation(&self, user_id: UserId) -> AppResult<Json<Value>> {
        let explanation = self.service.get_recommendation_explanation(user_id).await?;
        Ok(Json(json!(explanation)))
    }

    pub async fn recommendation_stats(&self, user_id: UserId) -> AppResult<Json<Value>> {
        let stats = self.service.get_recommendation_stats(user_id).await?;
        Ok(Json(json!(stats)))
    }

    pub async fn suggested_follows(&self, user_id: UserId, limit: usize) -> AppResult<Json<Value>> {
        let suggestions = self.service.get_suggested_follows(user_id, limit).await?;
        Ok(Json(json!({
            "user_id": user_id,
            "count": suggestions.len(),
            "suggestions": suggestions,
        })))
    }

    pub async fn popular_posts(&self, limit: usize) -> AppResult<Json<Value>> {
        let posts = self.service.get_popular_posts(limit).await?;
        Ok(Json(json!({
            "count": posts.len(),
            "posts": posts,
        })))
    }

    pub async fn similar_posts(&self, post_id: PostId, limit: usize) -> AppResult<Json<Value>> {
        let similar = self.service.get_similar_posts(post_id, limit).await?;
        Ok(Json(json!({
            "post_id": post_id,
            "count": similar.len(),
            "similar_posts": similar,
        })))
    }

    pub async fn record_interaction(
        &self,
        user_id: UserId,
        post_id: PostId,
        kind: InteractionKind,
    ) -> AppResult<Json<Value>> {
        let interaction = self
            .store
            .record_interaction(user_id, post_id, kind, Utc::now())
            .await?;
        let snapshot_version = self.service.record_interaction(&interaction).await?;
        Ok(Json(json!({
            "user_id": interaction.user_id,
            "post_id": interaction.post_id,
            "kind": interaction.kind,
            "created_at": interaction.created_at,
            "snapshot_version": snapshot_version,
        })))
    }

    /// Deletes the user's interactions of `kind` on the post. The matrix only
    /// grows incrementally, so a removal forces the next read to rebuild.
    pub async fn remove_interaction(
        &self,
        user_id: UserId,
        post_id: PostId,
        kind: InteractionKind,
    ) -> AppResult<Json<Value>> {
        if !self.store.delete_interaction(user_id, post_id, kind).await? {
            return Err(AppError::NotFound(format!(
                "No {} by user {} on post {}",
                kind, user_id, post_id
            )));
        }
        self.service.invalidate();
        Ok(Json(json!({
            "user_id": user_id,
            "post_id": post_id,
            "kind": kind,
            "removed": true,
        })))
    }

    pub fn invalidate_snapshot(&self) -> AppResult<Json<Value>> {
        self.service.invalidate();
        Ok(Json(json!({"invalidated": true})))
    }

    pub async fn metrics(&self) -> AppResult<Json<Value>> {
        Ok(Json(json!(self.service.metrics().await)))
    }
}

#[derive(Deserialize)]
pub struct RecommendationsQuery {
    pub limit: Option<usize>,
    /// Comma separated post ids already shown in this session
    pub exclude: Option<String>,
}

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct RecordInteractionRequest {
    pub user_id: i64,
    pub post_id: i64,
    pub kind: String,
}

fn parse_limit(limit: Option<usize>) -> AppResult<usize> {
    match limit.unwrap_or(DEFAULT_LIMIT) {
        0 => Err(AppError::BadRequest("limit must be at least 1".to_string())),
        n if n > MAX_LIMIT => Err(AppError::BadRequest(format!(
            "limit must be at most {}",
            MAX_LIMIT
        ))),
        n => Ok(n),
    }
}

fn parse_excludes(raw: Option<&str>) -> AppResult<Vec<PostId>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<i64>()
                .map(PostId::new)
                .map_err(|_| AppError::BadRequest(format!("Invalid post id in exclude: {}", id)))
        })
        .collect()
}

// HTTP Handlers

pub async fn get_recommendations_handler(
    State(api): State<RecommendationInterface>,
    AxumPath(user_id): AxumPath<i64>,
    Query(params): Query<RecommendationsQuery>,
) -> Result<Json<Value>, AppError> {
    let limit = parse_limit(params.limit)?;
    let exclude = parse_excludes(params.exclude.as_deref())?;
    api.recommendations(UserId::new(user_id), limit, &exclude).await
}

pub async fn get_destinations_handler(
    State(api): State<RecommendationInterface>,
    AxumPath(user_id): AxumPath<i64>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Value>, AppError> {
    let limit = parse_limit(params.limit)?;
    api.destinations(UserId::new(user_id), limit).await
}

pub async fn get_explanation_handler(
    State(api): State<RecommendationInterface>,
    AxumPath(user_id): AxumPath<i64>,
) -> Result<Json<Value>, AppError> {
    api.explanation(UserId::new(user_id)).await
}

pub async fn get_recommendation_stats_handler(
    State(api): State<RecommendationInterface>,
    AxumPath(user_id): AxumPath<i64>,
) -> Result<Json<Value>, AppError> {
    api.recommendation_stats(UserId::new(user_id)).await
}

pub async fn get_suggested_follows_handler(
    State(api): State<RecommendationInterface>,
    AxumPath(user_id): AxumPath<i64>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Value>, AppError> {
    let limit = parse_limit(params.limit)?;
    api.suggested_follows(UserId::new(user_id), limit).await
}

pub async fn get_popular_posts_handler(
    State(api): State<RecommendationInterface>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Value>, AppError> {
    let limit = parse_limit(params.limit)?;
    api.popular_posts(limit).await
}

pub async fn get_similar_posts_handler(
    State(api): State<RecommendationInterface>,
    AxumPath(post_id): AxumPath<i64>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Value>, AppError> {
    let limit = parse_limit(params.limit)?;
    api.similar_posts(PostId::new(post_id), limit).await
}

pub async fn record_interaction_handler(
    State(api): State<RecommendationInterface>,
    Json(req): Json<RecordInteractionRequest>,
) -> Result<Json<Value>, AppError> {
    let kind: InteractionKind = req.kind.parse()?;
    api.record_interaction(UserId::new(req.user_id), PostId::new(req.post_id), kind)
        .await
}

pub async fn remove_interaction_handler(
    State(api): State<RecommendationInterface>,
    Json(req): Json<RecordInteractionRequest>,
) -> Result<Json<Value>, AppError> {
    let kind: InteractionKind = req.kind.parse()?;
    api.remove_interaction(UserId::new(req.user_id), PostId::new(req.post_id), kind)
        .await
}

pub async fn invalidate_snapshot_handler(
    State(api): State<RecommendationInterface>,
) -> Result<Json<Value>, AppError> {
    api.invalidate_snapshot()
}

pub async fn get_metrics_handler(
    State(api): State<RecommendationInterface>,
) -> Result<Json<Value>, AppError> {
    api.metrics().await
}

pub fn create_recommendation_router(api: RecommendationInterface) -> Router {
    Router::new()
        .route("/users/{id}/recommendations", get(get_recommendations_handler))
        .route("/users/{id}/recommendation-stats", get(get_recommendation_stats_handler))
        .route("/users/{id}/suggested-follows", get(get_suggested_follows_handler))
        .route("/users/{id}/destinations", get(get_destinations_handler))
        .route("/users/{id}/explanation", get(get_explanation_handler))
        .route("/feed/popular", get(get_popular_posts_handler))
        .route("/posts/{id}/similar", get(get_similar_posts_handler))
        .route(
            "/interactions",
            post(record_interaction_handler).delete(remove_interaction_handler),
        )
        .route("/snapshot/invalidate", post(invalidate_snapshot_handler))
        .route("/metrics", get(get_metrics_handler))
        .with_state(api)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_bounds() {
        assert_eq!(parse_limit(None).unwrap(), DEFAULT_LIMIT);
        assert_eq!(parse_limit(Some(5)).unwrap(), 5);
        assert!(parse_limit(Some(0)).is_err());
        assert!(parse_limit(Some(MAX_LIMIT + 1)).is_err());
    }

    #[test]
    fn test_exclude_list_parsing() {
        assert_eq!(
            parse_excludes(Some("3, 7,,9")).unwrap(),
            vec![PostId::new(3), PostId::new(7), PostId::new(9)]
        );
        assert!(parse_excludes(None).unwrap().is_empty());
        assert!(parse_excludes(Some("3,x")).is_err());
    }
}
