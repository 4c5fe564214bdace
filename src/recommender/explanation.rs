// Recommendation explanation - which strategy serves a user, and why

use std::collections::{BTreeMap, BTreeSet};

use crate::core::{PostId, UserId};
use crate::models::{Algorithm, Post, RecommendationExplanation};
use crate::recommender::collaborative::CollaborativeEngine;
use crate::recommender::follows::FollowGraph;
use crate::recommender::matrix::InteractionMatrix;

/// Feed strategy for a user with `interactions` engaged posts and
/// `neighbors` collaborative neighbors.
pub fn post_strategy(interactions: usize, neighbors: usize) -> Algorithm {
    match (interactions, neighbors) {
        (0, _) => Algorithm::PopularityBased,
        (_, 0) => Algorithm::ContentBasedFiltering,
        _ => Algorithm::Hybrid,
    }
}

fn follow_strategy(neighbors: usize) -> Algorithm {
    if neighbors == 0 {
        Algorithm::PopularityBased
    } else {
        Algorithm::CollaborativeFiltering
    }
}

fn destination_strategy(locations_explored: usize, neighbors: usize) -> Algorithm {
    match (locations_explored, neighbors) {
        (0, _) => Algorithm::PopularityBased,
        (_, 0) => Algorithm::ContentBasedFiltering,
        _ => Algorithm::Hybrid,
    }
}

fn describe(strategy: Algorithm) -> &'static str {
    match strategy {
        Algorithm::PopularityBased => {
            "No interactions yet, so recommendations follow what is popular across the platform"
        }
        Algorithm::ContentBasedFiltering => {
            "Recommendations match the locations, categories and captions of posts you engaged with"
        }
        Algorithm::CollaborativeFiltering | Algorithm::Hybrid => {
            "Recommendations blend travelers with similar history and the content of posts you engaged with"
        }
    }
}

pub fn explain(
    matrix: &InteractionMatrix,
    posts: &BTreeMap<PostId, Post>,
    follows: &FollowGraph,
    engine: &CollaborativeEngine,
    user_id: UserId,
    snapshot_version: u64,
) -> RecommendationExplanation {
    let history = matrix.interacted_posts(user_id);
    let neighbor_count = engine.neighbors(matrix, user_id).len();

    let engaged: Vec<&Post> = history.iter().filter_map(|post_id| posts.get(post_id)).collect();
    let locations: BTreeSet<&str> = engaged.iter().filter_map(|p| p.location.as_deref()).collect();
    let categories: BTreeSet<&str> = engaged.iter().filter_map(|p| p.category.as_deref()).collect();

    let post_strategy = post_strategy(history.len(), neighbor_count);

    RecommendationExplanation {
        user_id,
        interaction_count: history.len(),
        post_strategy,
        follow_strategy: follow_strategy(neighbor_count),
        destination_strategy: destination_strategy(locations.len(), neighbor_count),
        description: describe(post_strategy).to_string(),
        neighbor_count,
        locations_explored: locations.len(),
        categories_explored: categories.len(),
        following_count: follows.followees(user_id).count(),
        follower_count: follows.follower_count(user_id),
        snapshot_version,
    }
}
