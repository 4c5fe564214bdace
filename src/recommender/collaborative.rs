// Collaborative Engine - user-user k-NN over the interaction matrix

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::core::{PostId, UserId};
use crate::recommender::matrix::{dot, norm, InteractionMatrix};

/// A user sharing at least one interacted post with the target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub user_id: UserId,
    pub similarity: f64,
    pub overlap: usize,
}

#[derive(Debug, Clone)]
pub struct CollaborativeEngine {
    k_neighbors: usize,
}

impl CollaborativeEngine {
    pub fn new(k_neighbors: usize) -> Self {
        Self { k_neighbors }
    }

    /// Cosine similarity of two user rows. `None` when the users share no
    /// post or either row is all zero.
    pub fn similarity(matrix: &InteractionMatrix, u: UserId, v: UserId) -> Option<(f64, usize)> {
        let row_u = matrix.row(u)?;
        let row_v = matrix.row(v)?;
        let (product, overlap) = dot(row_u, row_v);
        if overlap == 0 {
            return None;
        }
        let denominator = norm(row_u) * norm(row_v);
        if denominator == 0.0 {
            return None;
        }
        Some((product / denominator, overlap))
    }

    /// Top-k neighbors ordered by similarity, then overlap, then lower user id.
    pub fn neighbors(&self, matrix: &InteractionMatrix, user_id: UserId) -> Vec<Neighbor> {
        let Some(row) = matrix.row(user_id) else {
            return Vec::new();
        };

        let candidates: BTreeSet<UserId> = row
            .keys()
            .flat_map(|post_id| matrix.engaged_users(*post_id))
            .filter(|other| *other != user_id)
            .collect();

        let mut neighbors: Vec<Neighbor> = candidates
            .into_iter()
            .filter_map(|other| {
                Self::similarity(matrix, user_id, other).map(|(similarity, overlap)| Neighbor {
                    user_id: other,
                    similarity,
                    overlap,
                })
            })
            .collect();

        neighbors.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| b.overlap.cmp(&a.overlap))
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        neighbors.truncate(self.k_neighbors);
        neighbors
    }

    /// Neighbor-weighted scores for posts the user has not interacted with.
    ///
    /// Posts no neighbor touched are absent from the result rather than zero.
    /// A user without interactions gets an empty map.
    pub fn score(&self, matrix: &InteractionMatrix, user_id: UserId) -> BTreeMap<PostId, f64> {
        let Some(own_row) = matrix.row(user_id).filter(|row| !row.is_empty()) else {
            debug!(user_id = %user_id, "No interactions, collaborative scoring skipped");
            return BTreeMap::new();
        };

        let neighbors = self.neighbors(matrix, user_id);
        let denominator: f64 = neighbors.iter().map(|n| n.similarity.abs()).sum();
        if denominator == 0.0 {
            return BTreeMap::new();
        }

        let mut numerators: BTreeMap<PostId, f64> = BTreeMap::new();
        for neighbor in &neighbors {
            let Some(neighbor_row) = matrix.row(neighbor.user_id) else {
                continue;
            };
            for (post_id, value) in neighbor_row {
                if own_row.contains_key(post_id) {
                    continue;
                }
                *numerators.entry(*post_id).or_insert(0.0) += neighbor.similarity * value;
            }
        }

        debug!(
            user_id = %user_id,
            neighbors = neighbors.len(),
            scored_posts = numerators.len(),
            "Collaborative scores computed"
        );

        numerators
            .into_iter()
            .filter(|(_, numerator)| *numerator > 0.0)
            .map(|(post_id, numerator)| (post_id, numerator / denominator))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InteractionWeighting;
    use crate::models::{Interaction, InteractionKind};
    use chrono::Utc;

    fn matrix(pairs: &[(i64, i64)]) -> InteractionMatrix {
        let interactions: Vec<Interaction> = pairs
            .iter()
            .map(|(user, post)| Interaction {
                user_id: UserId::new(*user),
                post_id: PostId::new(*post),
                kind: InteractionKind::Like,
                created_at: Utc::now(),
            })
            .collect();
        InteractionMatrix::build(&interactions, InteractionWeighting::Binary)
    }

    #[test]
    fn test_similarity_is_symmetric() {
        let m = matrix(&[(1, 1), (1, 2), (1, 3), (2, 2), (2, 3), (2, 4), (2, 5), (3, 5)]);
        for (u, v) in [(1, 2), (2, 3), (1, 3)] {
            let uv = CollaborativeEngine::similarity(&m, UserId::new(u), UserId::new(v));
            let vu = CollaborativeEngine::similarity(&m, UserId::new(v), UserId::new(u));
            assert_eq!(uv, vu);
        }
        assert!(CollaborativeEngine::similarity(&m, UserId::new(1), UserId::new(3)).is_none());
    }

    #[test]
    fn test_shared_history_scores_unseen_post() {
        // A and B share P1, P2; A also saw P3.
        let m = matrix(&[(1, 1), (1, 2), (1, 3), (2, 1), (2, 2)]);
        let engine = CollaborativeEngine::new(50);
        let scores = engine.score(&m, UserId::new(2));

        assert_eq!(scores.len(), 1);
        let p3 = scores[&PostId::new(3)];
        assert!(p3 > 0.0);
        assert!((p3 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cold_start_returns_empty_map() {
        let m = matrix(&[(1, 1), (2, 1)]);
        let engine = CollaborativeEngine::new(50);
        assert!(engine.score(&m, UserId::new(99)).is_empty());
    }

    #[test]
    fn test_users_without_overlap_are_not_neighbors() {
        let m = matrix(&[(1, 1), (2, 2), (3, 1), (3, 3)]);
        let engine = CollaborativeEngine::new(50);
        let neighbors = engine.neighbors(&m, UserId::new(1));
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].user_id, UserId::new(3));

        // Post 2 only belongs to a non-neighbor, so it is omitted entirely.
        let scores = engine.score(&m, UserId::new(1));
        assert!(!scores.contains_key(&PostId::new(2)));
        assert!(scores.contains_key(&PostId::new(3)));
    }

    #[test]
    fn test_neighbor_ties_break_on_overlap_then_id() {
        // Users 2 and 3 are identical to each other relative to user 1.
        let m = matrix(&[(1, 1), (1, 2), (3, 1), (3, 2), (2, 1), (2, 2), (4, 1)]);
        let engine = CollaborativeEngine::new(2);
        let neighbors = engine.neighbors(&m, UserId::new(1));
        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors[0].user_id, UserId::new(2));
        assert_eq!(neighbors[1].user_id, UserId::new(3));
        assert!((neighbors[0].similarity - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_scores_stay_within_unit_interval_for_binary_matrix() {
        let m = matrix(&[(1, 1), (1, 2), (2, 1), (2, 3), (3, 2), (3, 3), (3, 4)]);
        let engine = CollaborativeEngine::new(50);
        for score in engine.score(&m, UserId::new(1)).values() {
            assert!(*score > 0.0 && *score <= 1.0);
        }
    }
}
