// Interaction Repository - read access to users, posts, interactions and follows
// The store itself belongs to the CRUD layer; the recommender only reads from it.

use async_trait::async_trait;

use crate::core::{PostId, UserId};
use crate::error::AppResult;
use crate::models::{Follow, Interaction, Post, PostFilter, User};

/// Read-only accessor over the authoritative tables.
///
/// Every derived structure the recommender builds (matrix, content vectors)
/// is computed from what this trait returns. Implementations propagate
/// storage failures as-is; the recommender never retries them.
#[async_trait]
pub trait InteractionRepository: Send + Sync {
    /// Every interaction recorded, in any order.
    async fn list_interactions(&self) -> AppResult<Vec<Interaction>>;

    /// Posts matching the filter, with their engagement counters.
    async fn list_posts(&self, filter: &PostFilter) -> AppResult<Vec<Post>>;

    /// Post ids the user has interacted with. A post appears once per interaction.
    async fn list_user_interactions(&self, user_id: UserId) -> AppResult<Vec<PostId>>;

    async fn list_follows(&self) -> AppResult<Vec<Follow>>;

    async fn get_user(&self, user_id: UserId) -> AppResult<Option<User>>;
}
