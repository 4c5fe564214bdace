// Suggested follows - who similar travelers follow

use std::collections::{BTreeMap, BTreeSet};

use crate::core::UserId;
use crate::models::{Algorithm, Follow, SuggestedFollow};
use crate::recommender::collaborative::CollaborativeEngine;
use crate::recommender::matrix::InteractionMatrix;

/// Adjacency view over the follow edges of a snapshot.
#[derive(Debug, Clone, Default)]
pub struct FollowGraph {
    followees: BTreeMap<UserId, BTreeSet<UserId>>,
    follower_counts: BTreeMap<UserId, usize>,
}

impl FollowGraph {
    pub fn build(follows: &[Follow]) -> Self {
        let mut graph = Self::default();
        for follow in follows {
            if follow.follower_id == follow.followee_id {
                continue;
            }
            if graph
                .followees
                .entry(follow.follower_id)
                .or_default()
                .insert(follow.followee_id)
            {
                *graph.follower_counts.entry(follow.followee_id).or_insert(0) += 1;
            }
        }
        graph
    }

    pub fn followees(&self, user_id: UserId) -> impl Iterator<Item = UserId> + '_ {
        self.followees
            .get(&user_id)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    pub fn is_following(&self, follower: UserId, followee: UserId) -> bool {
        self.followees
            .get(&follower)
            .is_some_and(|set| set.contains(&followee))
    }

    pub fn follower_count(&self, user_id: UserId) -> usize {
        self.follower_counts.get(&user_id).copied().unwrap_or(0)
    }

    pub fn edge_count(&self) -> usize {
        self.follower_counts.values().sum()
    }
}

pub struct FollowSuggester<'a> {
    engine: &'a CollaborativeEngine,
}

impl<'a> FollowSuggester<'a> {
    pub fn new(engine: &'a CollaborativeEngine) -> Self {
        Self { engine }
    }

    /// Accounts followed by the user's nearest neighbors, weighted by
    /// neighbor similarity. Falls back to the most-followed accounts when the
    /// user has no neighbors or they follow nobody new.
    pub fn suggest(
        &self,
        matrix: &InteractionMatrix,
        graph: &FollowGraph,
        user_id: UserId,
        limit: usize,
    ) -> Vec<SuggestedFollow> {
        let eligible = |candidate: UserId| candidate != user_id && !graph.is_following(user_id, candidate);

        let mut weights: BTreeMap<UserId, (f64, usize)> = BTreeMap::new();
        for neighbor in self.engine.neighbors(matrix, user_id) {
            for followee in graph.followees(neighbor.user_id).filter(|c| eligible(*c)) {
                let entry = weights.entry(followee).or_insert((0.0, 0));
                entry.0 += neighbor.similarity;
                entry.1 += 1;
            }
        }

        let weights: Vec<(UserId, f64, usize)> = weights
            .into_iter()
            .filter(|(_, (weight, _))| *weight > 0.0)
            .map(|(id, (weight, count))| (id, weight, count))
            .collect();

        if weights.is_empty() {
            return Self::most_followed(graph, user_id, limit);
        }

        let max = weights.iter().map(|(_, w, _)| *w).fold(0.0, f64::max);
        let mut suggestions: Vec<SuggestedFollow> = weights
            .into_iter()
            .map(|(candidate, weight, count)| SuggestedFollow {
                user_id: candidate,
                score: weight / max,
                algorithm: Algorithm::CollaborativeFiltering,
                recommendation_reason: format!("Followed by {} travelers with similar taste", count),
            })
            .collect();
        sort_suggestions(&mut suggestions);
        suggestions.truncate(limit);
        suggestions
    }

    pub fn most_followed(graph: &FollowGraph, user_id: UserId, limit: usize) -> Vec<SuggestedFollow> {
        let max = graph.follower_counts.values().copied().max().unwrap_or(0);
        if max == 0 {
            return Vec::new();
        }

        let mut suggestions: Vec<SuggestedFollow> = graph
            .follower_counts
            .iter()
            .filter(|(candidate, count)| {
                **candidate != user_id && **count > 0 && !graph.is_following(user_id, **candidate)
            })
            .map(|(candidate, count)| SuggestedFollow {
                user_id: *candidate,
                score: *count as f64 / max as f64,
                algorithm: Algorithm::PopularityBased,
                recommendation_reason: format!("Popular traveler with {} followers", count),
            })
            .collect();
        sort_suggestions(&mut suggestions);
        suggestions.truncate(limit);
        suggestions
    }
}

fn sort_suggestions(suggestions: &mut [SuggestedFollow]) {
    suggestions.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.user_id.cmp(&b.user_id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InteractionWeighting;
    use crate::core::PostId;
    use crate::models::{Interaction, InteractionKind};
    use chrono::Utc;

    fn follow(a: i64, b: i64) -> Follow {
        Follow {
            follower_id: UserId::new(a),
            followee_id: UserId::new(b),
        }
    }

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
    fn test_neighbors_followees_are_suggested() {
        let m = matrix(&[(1, 10), (1, 11), (2, 10), (2, 11), (3, 12)]);
        let graph = FollowGraph::build(&[follow(2, 5), follow(2, 1), follow(3, 6), follow(1, 7), follow(2, 7)]);
        let engine = CollaborativeEngine::new(50);
        let suggestions = FollowSuggester::new(&engine).suggest(&m, &graph, UserId::new(1), 10);

        let ids: Vec<i64> = suggestions.iter().map(|s| s.user_id.value()).collect();
        assert_eq!(ids, vec![5]);
        assert_eq!(suggestions[0].algorithm, Algorithm::CollaborativeFiltering);
        assert_eq!(suggestions[0].score, 1.0);
    }

    #[test]
    fn test_cold_start_falls_back_to_most_followed() {
        let m = matrix(&[(1, 10)]);
        let graph = FollowGraph::build(&[follow(1, 3), follow(2, 3), follow(4, 3), follow(1, 2), follow(4, 2), follow(3, 4)]);
        let engine = CollaborativeEngine::new(50);
        let suggestions = FollowSuggester::new(&engine).suggest(&m, &graph, UserId::new(9), 2);

        let ids: Vec<i64> = suggestions.iter().map(|s| s.user_id.value()).collect();
        assert_eq!(ids, vec![3, 2]);
        assert!(suggestions.iter().all(|s| s.algorithm == Algorithm::PopularityBased));
        assert_eq!(suggestions[0].recommendation_reason, "Popular traveler with 3 followers");
    }

    #[test]
    fn test_graph_ignores_duplicates_and_self_edges() {
        let graph = FollowGraph::build(&[follow(1, 2), follow(1, 2), follow(3, 3)]);
        assert_eq!(graph.follower_count(UserId::new(2)), 1);
        assert_eq!(graph.follower_count(UserId::new(3)), 0);
        assert_eq!(graph.edge_count(), 1);
    }
}
