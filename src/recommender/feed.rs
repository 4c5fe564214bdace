// Feed Assembler - exclusions, popularity fallback, diversity cap, reasons

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

use crate::core::PostId;
use crate::models::{Algorithm, Post, Recommendation};
use crate::recommender::hybrid::{compare_ranked, RankedPost};

/// Engagement weighted by kind and halved every `half_life_hours` of age.
/// Age is measured against `now`; posts dated in the future count as new.
pub fn popularity_score(post: &Post, now: DateTime<Utc>, half_life_hours: f64) -> f64 {
    let engagement = post.likes as f64 + 2.0 * post.comments as f64 + 3.0 * post.shares as f64;
    let age_hours = ((now - post.created_at).num_seconds() as f64 / 3600.0).max(0.0);
    engagement * 0.5f64.powf(age_hours / half_life_hours)
}

/// Every post not in `excluded`, ordered by decayed popularity scaled so the
/// most popular post scores 1.
pub fn popularity_ranking<'a, I>(
    posts: I,
    excluded: &BTreeSet<PostId>,
    now: DateTime<Utc>,
    half_life_hours: f64,
) -> Vec<RankedPost>
where
    I: IntoIterator<Item = &'a Post>,
{
    let raw: Vec<(&Post, f64)> = posts
        .into_iter()
        .filter(|post| !excluded.contains(&post.id))
        .map(|post| (post, popularity_score(post, now, half_life_hours)))
        .collect();

    let max = raw.iter().map(|(_, score)| *score).fold(0.0, f64::max);

    let mut ranked: Vec<RankedPost> = raw
        .into_iter()
        .map(|(post, score)| RankedPost {
            post_id: post.id,
            score: if max > 0.0 { score / max } else { 0.0 },
            algorithm: Algorithm::PopularityBased,
            created_at: post.created_at,
        })
        .collect();
    ranked.sort_by(compare_ranked);
    ranked
}

/// Human-readable explanation for an entry.
pub fn recommendation_reason(algorithm: Algorithm, post: Option<&Post>) -> String {
    match algorithm {
        Algorithm::Hybrid => "Popular with users who share your interests".to_string(),
        Algorithm::CollaborativeFiltering => "Travelers with similar taste liked this".to_string(),
        Algorithm::ContentBasedFiltering => match post.and_then(|p| p.location.as_deref()) {
            Some(location) => format!("Similar to places you explored, like {}", location),
            None => "Similar to posts you engaged with".to_string(),
        },
        Algorithm::PopularityBased => match post {
            Some(post) => format!("Trending now with {} interactions", post.total_interactions()),
            None => "Trending now".to_string(),
        },
    }
}

#[derive(Debug, Clone)]
pub struct FeedAssembler {
    max_consecutive: usize,
    half_life_hours: f64,
}

impl FeedAssembler {
    pub fn new(max_consecutive: usize, half_life_hours: f64) -> Self {
        Self {
            max_consecutive,
            half_life_hours,
        }
    }

    /// Produces the final feed from the ranked list.
    ///
    /// `posts` is the candidate pool the popularity fallback draws from when
    /// nothing personalized survives the exclusions. `now` is the reference
    /// time for popularity decay.
    pub fn assemble(
        &self,
        ranked: Vec<RankedPost>,
        posts: &BTreeMap<PostId, Post>,
        excluded: &BTreeSet<PostId>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Vec<Recommendation> {
        let mut remaining: Vec<RankedPost> = ranked
            .into_iter()
            .filter(|entry| !excluded.contains(&entry.post_id))
            .collect();

        if remaining.is_empty() {
            remaining = popularity_ranking(posts.values(), excluded, now, self.half_life_hours);
            debug!(
                candidates = remaining.len(),
                "Personalized ranking empty, using popularity fallback"
            );
        }

        let mut feed = self.diversify(remaining, posts);
        feed.truncate(limit);

        feed.into_iter()
            .map(|entry| {
                let post = posts.get(&entry.post_id);
                Recommendation {
                    post_id: entry.post_id,
                    score: entry.score,
                    algorithm: entry.algorithm,
                    recommendation_reason: recommendation_reason(entry.algorithm, post),
                }
            })
            .collect()
    }

    /// Reorders so that no more than `max_consecutive` adjacent entries share a
    /// location or a category. A violating entry waits until placing it no
    /// longer breaks the cap; whatever never fits is appended in order.
    pub fn diversify(&self, ranked: Vec<RankedPost>, posts: &BTreeMap<PostId, Post>) -> Vec<RankedPost> {
        let mut output: Vec<RankedPost> = Vec::with_capacity(ranked.len());
        let mut deferred: VecDeque<RankedPost> = VecDeque::new();

        for entry in ranked {
            if self.fits(&output, &entry, posts) {
                output.push(entry);
                self.place_deferred(&mut output, &mut deferred, posts);
            } else {
                deferred.push_back(entry);
            }
        }

        self.place_deferred(&mut output, &mut deferred, posts);
        output.extend(deferred);
        output
    }

    fn place_deferred(
        &self,
        output: &mut Vec<RankedPost>,
        deferred: &mut VecDeque<RankedPost>,
        posts: &BTreeMap<PostId, Post>,
    ) {
        while let Some(idx) = deferred
            .iter()
            .position(|entry| self.fits(output, entry, posts))
        {
            if let Some(entry) = deferred.remove(idx) {
                output.push(entry);
            }
        }
    }

    fn fits(&self, output: &[RankedPost], entry: &RankedPost, posts: &BTreeMap<PostId, Post>) -> bool {
        let Some(post) = posts.get(&entry.post_id) else {
            return true;
        };
        let location_ok = post.location.as_deref().map_or(true, |location| {
            trailing_run(output, posts, location, |p: &Post| p.location.as_deref()) < self.max_consecutive
        });
        let category_ok = post.category.as_deref().map_or(true, |category| {
            trailing_run(output, posts, category, |p: &Post| p.category.as_deref()) < self.max_consecutive
        });

        location_ok && category_ok
    }
}

/// Number of entries at the end of `output` whose attribute equals `value`.
fn trailing_run<F>(output: &[RankedPost], posts: &BTreeMap<PostId, Post>, value: &str, attribute: F) -> usize
where
    F: Fn(&Post) -> Option<&str>,
{
    output
        .iter()
        .rev()
        .take_while(|placed| {
            posts
                .get(&placed.post_id)
                .and_then(|p| attribute(p))
                .is_some_and(|other| other == value)
        })
        .count()
}
