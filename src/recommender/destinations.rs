// Destination recommendations - unexplored locations ranked by content fit,
// boosted where similar travelers already engage

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::core::{PostId, UserId};
use crate::models::{Algorithm, DestinationRecommendation, Post};
use crate::recommender::collaborative::CollaborativeEngine;
use crate::recommender::content::{ContentCorpus, ContentEngine};
use crate::recommender::matrix::InteractionMatrix;

/// Nearest neighbors whose engagement boosts a destination.
const BOOST_NEIGHBORS: usize = 5;
const BOOST_PER_POST: f64 = 0.1;
const MAX_BOOST: f64 = 2.0;

#[derive(Debug, Default)]
struct LocationTally<'p> {
    category: Option<&'p str>,
    post_count: usize,
    interactions: u64,
    similarity_sum: f64,
}

/// Groups posts by location, skipping posts without one and locations in `excluded`.
fn tally<'p, F>(
    posts: &'p BTreeMap<PostId, Post>,
    excluded: &BTreeSet<&str>,
    mut similarity: F,
) -> BTreeMap<&'p str, LocationTally<'p>>
where
    F: FnMut(&Post) -> f64,
{
    let mut tallies: BTreeMap<&str, LocationTally> = BTreeMap::new();
    for post in posts.values() {
        let Some(location) = post.location.as_deref() else {
            continue;
        };
        if excluded.contains(location) {
            continue;
        }
        let entry = tallies.entry(location).or_default();
        if entry.post_count == 0 {
            entry.category = post.category.as_deref();
        }
        entry.post_count += 1;
        entry.interactions += post.total_interactions();
        entry.similarity_sum += similarity(post);
    }
    tallies
}

fn sort_destinations(destinations: &mut [DestinationRecommendation]) {
    destinations.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.location.cmp(&b.location))
    });
}

/// Locations ordered by total engagement, then post count, then name.
pub fn popular_destinations(
    posts: &BTreeMap<PostId, Post>,
    excluded: &BTreeSet<&str>,
    limit: usize,
) -> Vec<DestinationRecommendation> {
    let tallies = tally(posts, excluded, |_| 0.0);
    let max = tallies.values().map(|t| t.interactions).max().unwrap_or(0);

    let mut destinations: Vec<DestinationRecommendation> = tallies
        .into_iter()
        .map(|(location, t)| DestinationRecommendation {
            location: location.to_string(),
            category: t.category.map(str::to_string),
            score: if max > 0 { t.interactions as f64 / max as f64 } else { 0.0 },
            post_count: t.post_count,
            interaction_count: t.interactions,
            algorithm: Algorithm::PopularityBased,
            recommendation_reason: format!("Popular destination with {} interactions", t.interactions),
        })
        .collect();

    destinations.sort_by(|a, b| {
        b.interaction_count
            .cmp(&a.interaction_count)
            .then_with(|| b.post_count.cmp(&a.post_count))
            .then_with(|| a.location.cmp(&b.location))
    });
    destinations.truncate(limit);
    destinations
}

pub struct DestinationRanker<'a> {
    engine: &'a CollaborativeEngine,
}

impl<'a> DestinationRanker<'a> {
    pub fn new(engine: &'a CollaborativeEngine) -> Self {
        Self { engine }
    }

    /// Locations the user has not engaged with, scored by the mean content
    /// similarity of their posts to the user's interests. Locations the
    /// nearest neighbors engaged with get up to `MAX_BOOST` extra before the
    /// scores are scaled so the best destination is 1. Users without any
    /// explored location, or whose interests match nothing, get popular
    /// destinations instead.
    pub fn recommend(
        &self,
        corpus: &ContentCorpus,
        matrix: &InteractionMatrix,
        posts: &BTreeMap<PostId, Post>,
        user_id: UserId,
        limit: usize,
    ) -> Vec<DestinationRecommendation> {
        let history = matrix.interacted_posts(user_id);
        let explored: BTreeSet<&str> = history
            .iter()
            .filter_map(|post_id| posts.get(post_id))
            .filter_map(|post| post.location.as_deref())
            .collect();
        if explored.is_empty() {
            return popular_destinations(posts, &explored, limit);
        }

        let interest = ContentEngine::interest_vector(corpus, &history);
        let tallies = tally(posts, &explored, |post| {
            corpus
                .vector(post.id)
                .map(|vector| interest.cosine(vector))
                .unwrap_or(0.0)
        });

        let mut neighbor_engagement: BTreeMap<&str, usize> = BTreeMap::new();
        for neighbor in self.engine.neighbors(matrix, user_id).into_iter().take(BOOST_NEIGHBORS) {
            for post_id in matrix.interacted_posts(neighbor.user_id) {
                if let Some(location) = posts.get(&post_id).and_then(|p| p.location.as_deref()) {
                    *neighbor_engagement.entry(location).or_insert(0) += 1;
                }
            }
        }

        let scored: Vec<(&str, LocationTally, f64, f64)> = tallies
            .into_iter()
            .filter_map(|(location, t)| {
                let content = t.similarity_sum / t.post_count as f64;
                if content <= 0.0 {
                    return None;
                }
                let boost = neighbor_engagement
                    .get(location)
                    .map_or(0.0, |count| (*count as f64 * BOOST_PER_POST).min(MAX_BOOST));
                Some((location, t, content, boost))
            })
            .collect();

        if scored.is_empty() {
            debug!(user_id = %user_id, "No destination matches interests, using popular destinations");
            return popular_destinations(posts, &explored, limit);
        }

        let max = scored
            .iter()
            .map(|(_, _, content, boost)| content + boost)
            .fold(0.0, f64::max);

        let mut destinations: Vec<DestinationRecommendation> = scored
            .into_iter()
            .map(|(location, t, content, boost)| {
                let (algorithm, recommendation_reason) = if boost > 0.0 {
                    (Algorithm::Hybrid, "Popular among travelers like you".to_string())
                } else {
                    (
                        Algorithm::ContentBasedFiltering,
                        "Matches the places you explored".to_string(),
                    )
                };
                DestinationRecommendation {
                    location: location.to_string(),
                    category: t.category.map(str::to_string),
                    score: ((content + boost) / max).clamp(0.0, 1.0),
                    post_count: t.post_count,
                    interaction_count: t.interactions,
                    algorithm,
                    recommendation_reason,
                }
            })
            .collect();

        sort_destinations(&mut destinations);
        destinations.truncate(limit);
        destinations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InteractionWeighting;
    use crate::models::{Interaction, InteractionKind};
    use crate::recommender::content::ContentBoosts;
    use chrono::Utc;

    fn post(id: i64, location: &str, category: &str, caption: &str, likes: u64) -> Post {
        Post {
            id: PostId::new(id),
            author_id: UserId::new(100),
            location: Some(location.to_string()),
            category: Some(category.to_string()),
            caption: Some(caption.to_string()),
            created_at: Utc::now(),
            likes,
            comments: 0,
            shares: 0,
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

    fn pool() -> BTreeMap<PostId, Post> {
        [
            post(1, "Manali", "mountain", "snow trek", 2),
            post(2, "Manali", "mountain", "pine forest hike", 0),
            post(3, "Ladakh", "mountain", "snow pass trek", 1),
            post(4, "Goa", "beach", "shack sunset", 0),
            post(5, "Spiti", "mountain", "monastery snow trek", 0),
        ]
        .into_iter()
        .map(|p| (p.id, p))
        .collect()
    }

    #[test]
    fn test_neighbor_engagement_boosts_destination() {
        let posts = pool();
        let all: Vec<Post> = posts.values().cloned().collect();
        let corpus = ContentCorpus::build(&all, ContentBoosts::default());
        // User 1 explored Manali; neighbor 2 also went to Ladakh.
        let m = matrix(&[(1, 1), (2, 1), (2, 3)]);
        let engine = CollaborativeEngine::new(50);

        let destinations = DestinationRanker::new(&engine).recommend(&corpus, &m, &posts, UserId::new(1), 10);
        let names: Vec<&str> = destinations.iter().map(|d| d.location.as_str()).collect();

        assert!(!names.contains(&"Manali"));
        assert!(!names.contains(&"Goa"));
        assert_eq!(names[0], "Ladakh");
        assert_eq!(destinations[0].algorithm, Algorithm::Hybrid);
        assert_eq!(destinations[0].score, 1.0);
        let spiti = destinations.iter().find(|d| d.location == "Spiti").unwrap();
        assert_eq!(spiti.algorithm, Algorithm::ContentBasedFiltering);
        assert!(spiti.score > 0.0 && spiti.score < 1.0);
    }

    #[test]
    fn test_unexplored_user_gets_popular_destinations() {
        let posts = pool();
        let all: Vec<Post> = posts.values().cloned().collect();
        let corpus = ContentCorpus::build(&all, ContentBoosts::default());
        let engine = CollaborativeEngine::new(50);

        let destinations =
            DestinationRanker::new(&engine).recommend(&corpus, &matrix(&[]), &posts, UserId::new(9), 3);
        let names: Vec<&str> = destinations.iter().map(|d| d.location.as_str()).collect();
        assert_eq!(names, vec!["Manali", "Ladakh", "Goa"]);
        assert_eq!(destinations[0].score, 1.0);
        assert_eq!(destinations[0].post_count, 2);
        assert!(destinations.iter().all(|d| d.algorithm == Algorithm::PopularityBased));
    }

    #[test]
    fn test_no_content_match_falls_back_to_unexplored_popular() {
        let posts: BTreeMap<PostId, Post> = [
            post(1, "Goa", "beach", "coconut", 0),
            post(2, "Jaipur", "historical", "fort", 4),
        ]
        .into_iter()
        .map(|p| (p.id, p))
        .collect();
        let all: Vec<Post> = posts.values().cloned().collect();
        let corpus = ContentCorpus::build(&all, ContentBoosts::default());
        let engine = CollaborativeEngine::new(50);

        let destinations =
            DestinationRanker::new(&engine).recommend(&corpus, &matrix(&[(1, 1)]), &posts, UserId::new(1), 5);
        assert_eq!(destinations.len(), 1);
        assert_eq!(destinations[0].location, "Jaipur");
        assert_eq!(destinations[0].algorithm, Algorithm::PopularityBased);
    }
}
