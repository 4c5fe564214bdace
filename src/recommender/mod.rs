// Scoring engines. Everything here is pure computation over one snapshot.

pub mod collaborative;
pub mod content;
pub mod destinations;
pub mod explanation;
pub mod feed;
pub mod follows;
pub mod hybrid;
pub mod matrix;
pub mod tokenizer;

pub use collaborative::{CollaborativeEngine, Neighbor};
pub use content::{ContentBoosts, ContentCorpus, ContentEngine, SparseVector};
pub use destinations::DestinationRanker;
pub use explanation::explain;
pub use feed::{popularity_ranking, popularity_score, FeedAssembler};
pub use follows::{FollowGraph, FollowSuggester};
pub use hybrid::{HybridRanker, HybridWeights, RankedPost, ScoredCandidate};
pub use matrix::InteractionMatrix;
