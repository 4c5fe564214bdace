// Content Engine - TF-IDF post vectors with location/category boosting
//
// A post's document is its caption tokens followed by the tokens of its
// location and category. Weights are tf * ln(N / df) over the whole post
// corpus; location tokens are then multiplied by the location boost and
// category tokens by the category boost.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

use crate::core::PostId;
use crate::models::Post;
use crate::recommender::tokenizer::{tokenize, tokenize_opt};

pub type TermId = u32;

/// Sparse vector with entries sorted by term id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    entries: Vec<(TermId, f64)>,
}

impl SparseVector {
    pub fn from_map(map: BTreeMap<TermId, f64>) -> Self {
        Self {
            entries: map.into_iter().filter(|(_, w)| *w != 0.0).collect(),
        }
    }

    pub fn get(&self, term: TermId) -> f64 {
        self.entries
            .binary_search_by_key(&term, |(t, _)| *t)
            .map(|idx| self.entries[idx].1)
            .unwrap_or(0.0)
    }

    pub fn is_zero(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TermId, f64)> + '_ {
        self.entries.iter().copied()
    }

    pub fn dot(&self, other: &SparseVector) -> f64 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.entries.len() && j < other.entries.len() {
            let (ta, wa) = self.entries[i];
            let (tb, wb) = other.entries[j];
            if ta < tb {
                i += 1;
            } else if ta > tb {
                j += 1;
            } else {
                sum += wa * wb;
                i += 1;
                j += 1;
            }
        }
        sum
    }

    pub fn norm(&self) -> f64 {
        self.entries.iter().map(|(_, w)| w * w).sum::<f64>().sqrt()
    }

    /// Cosine similarity clamped to [0, 1]. Zero when either side is the zero vector.
    pub fn cosine(&self, other: &SparseVector) -> f64 {
        if self.is_zero() || other.is_zero() {
            return 0.0;
        }
        let denominator = self.norm() * other.norm();
        if denominator == 0.0 {
            return 0.0;
        }
        (self.dot(other) / denominator).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContentBoosts {
    pub location: f64,
    pub category: f64,
}

impl Default for ContentBoosts {
    fn default() -> Self {
        Self {
            location: 5.0,
            category: 4.0,
        }
    }
}

/// Boosted TF-IDF vectors for every post in the corpus.
#[derive(Debug, Clone, Default)]
pub struct ContentCorpus {
    vocabulary: HashMap<String, TermId>,
    document_frequency: Vec<usize>,
    vectors: BTreeMap<PostId, SparseVector>,
}

struct Document {
    post_id: PostId,
    counts: BTreeMap<TermId, usize>,
    length: usize,
    location_terms: BTreeSet<TermId>,
    category_terms: BTreeSet<TermId>,
}

impl ContentCorpus {
    pub fn build(posts: &[Post], boosts: ContentBoosts) -> Self {
        let mut ordered: Vec<&Post> = posts.iter().collect();
        ordered.sort_by_key(|post| post.id);

        let mut vocabulary: HashMap<String, TermId> = HashMap::new();
        let mut document_frequency: Vec<usize> = Vec::new();
        let mut documents = Vec::with_capacity(ordered.len());

        for post in ordered {
            let mut intern = |token: String| -> TermId {
                let next = vocabulary.len() as TermId;
                *vocabulary.entry(token).or_insert_with(|| {
                    document_frequency.push(0);
                    next
                })
            };

            let caption_tokens = tokenize_opt(post.caption.as_deref());
            let location_tokens = tokenize_opt(post.location.as_deref());
            let category_tokens = tokenize_opt(post.category.as_deref());
            let length = caption_tokens.len() + location_tokens.len() + category_tokens.len();

            let mut counts: BTreeMap<TermId, usize> = BTreeMap::new();
            let mut location_terms = BTreeSet::new();
            let mut category_terms = BTreeSet::new();

            for token in caption_tokens {
                *counts.entry(intern(token)).or_insert(0) += 1;
            }
            for token in location_tokens {
                let term = intern(token);
                location_terms.insert(term);
                *counts.entry(term).or_insert(0) += 1;
            }
            for token in category_tokens {
                let term = intern(token);
                category_terms.insert(term);
                *counts.entry(term).or_insert(0) += 1;
            }

            for term in counts.keys() {
                document_frequency[*term as usize] += 1;
            }

            documents.push(Document {
                post_id: post.id,
                counts,
                length,
                location_terms,
                category_terms,
            });
        }

        let corpus_size = documents.len() as f64;
        let vectors = documents
            .into_iter()
            .map(|doc| {
                let mut weights = BTreeMap::new();
                for (term, count) in &doc.counts {
                    let tf = *count as f64 / doc.length as f64;
                    let idf = (corpus_size / document_frequency[*term as usize] as f64).ln();
                    let mut weight = tf * idf;
                    if doc.location_terms.contains(term) {
                        weight *= boosts.location;
                    }
                    if doc.category_terms.contains(term) {
                        weight *= boosts.category;
                    }
                    weights.insert(*term, weight);
                }
                (doc.post_id, SparseVector::from_map(weights))
            })
            .collect();

        debug!(
            posts = corpus_size as usize,
            vocabulary = vocabulary.len(),
            "Content corpus built"
        );

        Self {
            vocabulary,
            document_frequency,
            vectors,
        }
    }

    pub fn vector(&self, post_id: PostId) -> Option<&SparseVector> {
        self.vectors.get(&post_id)
    }

    pub fn term_id(&self, token: &str) -> Option<TermId> {
        tokenize(token)
            .first()
            .and_then(|normalized| self.vocabulary.get(normalized))
            .copied()
    }

    pub fn document_frequency(&self, token: &str) -> usize {
        self.term_id(token)
            .map(|term| self.document_frequency[term as usize])
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContentEngine;

impl ContentEngine {
    /// Mean of the vectors of every distinct post in the history. Posts
    /// unknown to the corpus are skipped; an empty history is the zero vector.
    pub fn interest_vector(corpus: &ContentCorpus, history: &[PostId]) -> SparseVector {
        let distinct: BTreeSet<PostId> = history.iter().copied().collect();
        let mut sum: BTreeMap<TermId, f64> = BTreeMap::new();
        let mut counted = 0usize;

        for post_id in distinct {
            if let Some(vector) = corpus.vector(post_id) {
                for (term, weight) in vector.iter() {
                    *sum.entry(term).or_insert(0.0) += weight;
                }
                counted += 1;
            }
        }

        if counted == 0 {
            return SparseVector::default();
        }

        let divisor = counted as f64;
        SparseVector::from_map(sum.into_iter().map(|(t, w)| (t, w / divisor)).collect())
    }

    /// Cosine similarity of each candidate to the user's interest vector.
    /// Every candidate gets a score; zero history scores everything 0.
    pub fn score(
        corpus: &ContentCorpus,
        history: &[PostId],
        candidates: &[PostId],
    ) -> BTreeMap<PostId, f64> {
        let interest = Self::interest_vector(corpus, history);
        candidates
            .iter()
            .map(|post_id| {
                let similarity = corpus
                    .vector(*post_id)
                    .map(|vector| interest.cosine(vector))
                    .unwrap_or(0.0);
                (*post_id, similarity)
            })
            .collect()
    }

    /// Posts most similar in content to `post_id`, excluding itself and zero similarities.
    pub fn similar_posts(corpus: &ContentCorpus, post_id: PostId) -> Option<Vec<(PostId, f64)>> {
        let target = corpus.vector(post_id)?;
        let mut similar: Vec<(PostId, f64)> = corpus
            .vectors
            .iter()
            .filter(|(other, _)| **other != post_id)
            .map(|(other, vector)| (*other, target.cosine(vector)))
            .filter(|(_, similarity)| *similarity > 0.0)
            .collect();
        similar.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Some(similar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::UserId;
    use chrono::Utc;

    fn post(id: i64, caption: Option<&str>, location: Option<&str>, category: Option<&str>) -> Post {
        Post {
            id: PostId::new(id),
            author_id: UserId::new(100),
            location: location.map(str::to_string),
            category: category.map(str::to_string),
            caption: caption.map(str::to_string),
            created_at: Utc::now(),
            likes: 0,
            comments: 0,
            shares: 0,
        }
    }

    #[test]
    fn test_tfidf_weights_and_location_boost() {
        let posts = vec![
            post(1, Some("sunset beach"), Some("Goa"), None),
            post(2, Some("mountain trek"), None, None),
        ];
        let corpus = ContentCorpus::build(&posts, ContentBoosts::default());
        let v1 = corpus.vector(PostId::new(1)).unwrap();

        // Three tokens in post 1, every term unique to it: idf = ln(2).
        let base = (1.0 / 3.0) * 2f64.ln();
        let sunset = corpus.term_id("sunset").unwrap();
        let goa = corpus.term_id("Goa").unwrap();
        assert!((v1.get(sunset) - base).abs() < 1e-12);
        assert!((v1.get(goa) - base * 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_category_boost_and_shared_terms() {
        let posts = vec![
            post(1, Some("beach day"), None, Some("beach")),
            post(2, Some("beach hut"), None, None),
            post(3, Some("city lights"), None, None),
        ];
        let corpus = ContentCorpus::build(&posts, ContentBoosts::default());
        let v1 = corpus.vector(PostId::new(1)).unwrap();
        let beach = corpus.term_id("beach").unwrap();

        // "beach" appears twice in post 1's document and in 2 of 3 posts.
        let expected = (2.0 / 3.0) * (3.0f64 / 2.0).ln() * 4.0;
        assert!((v1.get(beach) - expected).abs() < 1e-12);
        assert_eq!(corpus.document_frequency("beach"), 2);
    }

    #[test]
    fn test_term_in_every_post_has_zero_weight() {
        let posts = vec![
            post(1, Some("travel goa"), None, None),
            post(2, Some("travel kerala"), None, None),
        ];
        let corpus = ContentCorpus::build(&posts, ContentBoosts::default());
        let travel = corpus.term_id("travel").unwrap();
        assert_eq!(corpus.vector(PostId::new(1)).unwrap().get(travel), 0.0);
    }

    #[test]
    fn test_zero_history_scores_zero() {
        let posts = vec![post(1, Some("a b"), None, None), post(2, Some("c d"), None, None)];
        let corpus = ContentCorpus::build(&posts, ContentBoosts::default());
        let scores = ContentEngine::score(&corpus, &[], &[PostId::new(1), PostId::new(2)]);
        assert_eq!(scores.len(), 2);
        assert!(scores.values().all(|s| *s == 0.0));
    }

    #[test]
    fn test_similar_history_scores_higher() {
        let posts = vec![
            post(1, Some("snorkeling coral reef"), Some("Andaman"), Some("beach")),
            post(2, Some("coral reef diving"), Some("Andaman"), Some("beach")),
            post(3, Some("snowy peaks trek"), Some("Manali"), Some("mountains")),
        ];
        let corpus = ContentCorpus::build(&posts, ContentBoosts::default());
        let scores = ContentEngine::score(&corpus, &[PostId::new(1)], &[PostId::new(2), PostId::new(3)]);

        assert!(scores[&PostId::new(2)] > scores[&PostId::new(3)]);
        assert!(scores.values().all(|s| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn test_caption_less_post_still_has_vector() {
        let posts = vec![
            post(1, None, Some("Goa"), Some("beach")),
            post(2, Some("backwaters houseboat"), Some("Kerala"), Some("nature")),
        ];
        let corpus = ContentCorpus::build(&posts, ContentBoosts::default());
        assert!(!corpus.vector(PostId::new(1)).unwrap().is_zero());

        let malformed = vec![post(1, None, None, None), post(2, Some("x"), None, None)];
        let corpus = ContentCorpus::build(&malformed, ContentBoosts::default());
        assert!(corpus.vector(PostId::new(1)).unwrap().is_zero());
    }

    #[test]
    fn test_interest_vector_is_mean_of_distinct_posts() {
        let posts = vec![
            post(1, Some("alpha"), None, None),
            post(2, Some("beta"), None, None),
            post(3, Some("gamma"), None, None),
        ];
        let corpus = ContentCorpus::build(&posts, ContentBoosts::default());
        let interest = ContentEngine::interest_vector(
            &corpus,
            &[PostId::new(1), PostId::new(1), PostId::new(2)],
        );
        let alpha = corpus.term_id("alpha").unwrap();
        let expected = 3f64.ln() / 2.0;
        assert!((interest.get(alpha) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_similar_posts_excludes_self() {
        let posts = vec![
            post(1, Some("coral reef"), None, None),
            post(2, Some("coral beach"), None, None),
            post(3, Some("desert camel"), None, None),
        ];
        let corpus = ContentCorpus::build(&posts, ContentBoosts::default());
        let similar = ContentEngine::similar_posts(&corpus, PostId::new(1)).unwrap();
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].0, PostId::new(2));
        assert!(ContentEngine::similar_posts(&corpus, PostId::new(42)).is_none());
    }
}
