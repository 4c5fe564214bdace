// Hybrid Ranker - blends normalized collaborative and content signals

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::core::PostId;
use crate::models::Algorithm;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridWeights {
    pub collaborative: f64,
    pub content: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            collaborative: 0.6,
            content: 0.4,
        }
    }
}

/// Per-candidate signals. `None` means the engine produced no signal for the
/// post, which is distinct from a score of zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    pub post_id: PostId,
    pub collab_score: Option<f64>,
    pub content_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedPost {
    pub post_id: PostId,
    pub score: f64,
    pub algorithm: Algorithm,
    pub created_at: DateTime<Utc>,
}

/// Min-max normalization into [0, 1]. A map whose values are all equal
/// cannot be stretched, so its raw values are only clamped.
pub fn normalize(scores: &BTreeMap<PostId, f64>) -> BTreeMap<PostId, f64> {
    let mut values = scores.values().copied();
    let Some(first) = values.next() else {
        return BTreeMap::new();
    };
    let (min, max) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let range = max - min;

    scores
        .iter()
        .map(|(post_id, value)| {
            let normalized = if range > 0.0 {
                (value - min) / range
            } else {
                value.clamp(0.0, 1.0)
            };
            (*post_id, normalized)
        })
        .collect()
}

impl ScoredCandidate {
    /// Final score and tag, or `None` when neither engine had a signal.
    pub fn blend(&self, weights: HybridWeights) -> Option<(f64, Algorithm)> {
        match (self.collab_score, self.content_score) {
            (Some(collab), Some(content)) => Some((
                weights.collaborative * collab + weights.content * content,
                Algorithm::Hybrid,
            )),
            (Some(collab), None) => Some((collab, Algorithm::CollaborativeFiltering)),
            (None, Some(content)) => Some((content, Algorithm::ContentBasedFiltering)),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HybridRanker {
    weights: HybridWeights,
}

impl HybridRanker {
    pub fn new(weights: HybridWeights) -> Self {
        Self { weights }
    }

    /// Joins both score maps over the candidate set. Content similarities of
    /// exactly zero are dropped before normalization as carrying no signal.
    pub fn candidates(
        collaborative: &BTreeMap<PostId, f64>,
        content: &BTreeMap<PostId, f64>,
        candidate_ids: &[PostId],
    ) -> Vec<ScoredCandidate> {
        let pool: BTreeSet<PostId> = candidate_ids.iter().copied().collect();
        let collaborative: BTreeMap<PostId, f64> = collaborative
            .iter()
            .filter(|(post_id, _)| pool.contains(post_id))
            .map(|(k, v)| (*k, *v))
            .collect();
        let content: BTreeMap<PostId, f64> = content
            .iter()
            .filter(|(post_id, score)| **score > 0.0 && pool.contains(post_id))
            .map(|(k, v)| (*k, *v))
            .collect();

        let collaborative = normalize(&collaborative);
        let content = normalize(&content);

        candidate_ids
            .iter()
            .map(|post_id| ScoredCandidate {
                post_id: *post_id,
                collab_score: collaborative.get(post_id).copied(),
                content_score: content.get(post_id).copied(),
            })
            .collect()
    }

    /// Ranks candidates by final score, newer posts first on ties, then by id.
    pub fn rank(
        &self,
        collaborative: &BTreeMap<PostId, f64>,
        content: &BTreeMap<PostId, f64>,
        candidates: &BTreeMap<PostId, DateTime<Utc>>,
    ) -> Vec<RankedPost> {
        let candidate_ids: Vec<PostId> = candidates.keys().copied().collect();
        let mut ranked: Vec<RankedPost> = Self::candidates(collaborative, content, &candidate_ids)
            .into_iter()
            .filter_map(|candidate| {
                let (score, algorithm) = candidate.blend(self.weights)?;
                Some(RankedPost {
                    post_id: candidate.post_id,
                    score: score.clamp(0.0, 1.0),
                    algorithm,
                    created_at: candidates[&candidate.post_id],
                })
            })
            .collect();

        ranked.sort_by(compare_ranked);
        ranked
    }
}

pub(crate) fn compare_ranked(a: &RankedPost, b: &RankedPost) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.post_id.cmp(&b.post_id))
}
