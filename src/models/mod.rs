// Domain records read from the interaction store, and the records handed back to callers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::core::{PostId, UserId};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Like,
    Comment,
    Share,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Like => "like",
            InteractionKind::Comment => "comment",
            InteractionKind::Share => "share",
        }
    }
}

impl FromStr for InteractionKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "like" => Ok(InteractionKind::Like),
            "comment" => Ok(InteractionKind::Comment),
            "share" => Ok(InteractionKind::Share),
            _ => Err(AppError::Validation(format!("Unknown interaction kind: {}", s))),
        }
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub interests: BTreeSet<String>,
    pub home_location: Option<String>,
}

/// A post as seen by the scoring pipeline, with its engagement counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    pub location: Option<String>,
    pub category: Option<String>,
    pub caption: Option<String>,
    pub created_at: DateTime<Utc>,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
}

impl Post {
    pub fn total_interactions(&self) -> u64 {
        self.likes + self.comments + self.shares
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: UserId,
    pub post_id: PostId,
    pub kind: InteractionKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Follow {
    pub follower_id: UserId,
    pub followee_id: UserId,
}

/// Filter applied when listing posts from the store.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub author_id: Option<UserId>,
    pub exclude_author_id: Option<UserId>,
    pub limit: Option<usize>,
}

impl PostFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_author(author_id: UserId) -> Self {
        Self {
            author_id: Some(author_id),
            ..Self::default()
        }
    }
}

/// How much personalization went into an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Hybrid,
    CollaborativeFiltering,
    ContentBasedFiltering,
    PopularityBased,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Hybrid => "hybrid",
            Algorithm::CollaborativeFiltering => "collaborative_filtering",
            Algorithm::ContentBasedFiltering => "content_based_filtering",
            Algorithm::PopularityBased => "popularity_based",
        }
    }

    pub fn is_personalized(&self) -> bool {
        !matches!(self, Algorithm::PopularityBased)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub post_id: PostId,
    pub score: f64,
    pub algorithm: Algorithm,
    pub recommendation_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopularPost {
    pub post_id: PostId,
    pub score: f64,
    pub algorithm: Algorithm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationStats {
    pub user_id: UserId,
    pub interaction_count: usize,
    pub is_cold_start: bool,
    pub candidate_pool_size: usize,
    pub posts_created: usize,
    pub snapshot_version: u64,
    pub strategy: Algorithm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedFollow {
    pub user_id: UserId,
    pub score: f64,
    pub algorithm: Algorithm,
    pub recommendation_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarPost {
    pub post_id: PostId,
    pub score: f64,
    pub algorithm: Algorithm,
}

/// A location the user has not engaged with yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationRecommendation {
    pub location: String,
    /// Category of the earliest post at the location
    pub category: Option<String>,
    pub score: f64,
    pub post_count: usize,
    pub interaction_count: u64,
    pub algorithm: Algorithm,
    pub recommendation_reason: String,
}

/// How each kind of recommendation is currently produced for a user, and
/// the data backing that choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationExplanation {
    pub user_id: UserId,
    pub interaction_count: usize,
    pub post_strategy: Algorithm,
    pub follow_strategy: Algorithm,
    pub destination_strategy: Algorithm,
    pub description: String,
    pub neighbor_count: usize,
    pub locations_explored: usize,
    pub categories_explored: usize,
    pub following_count: usize,
    pub follower_count: usize,
    pub snapshot_version: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interaction_kind_parsing() {
        assert_eq!("LIKE".parse::<InteractionKind>().unwrap(), InteractionKind::Like);
        assert_eq!("share".parse::<InteractionKind>().unwrap(), InteractionKind::Share);
        assert!("save".parse::<InteractionKind>().is_err());
    }

    #[test]
    fn test_algorithm_tags_serialize_snake_case() {
        let json = serde_json::to_string(&Algorithm::ContentBasedFiltering).unwrap();
        assert_eq!(json, "\"content_based_filtering\"");
        assert_eq!(Algorithm::PopularityBased.to_string(), "popularity_based");
        assert!(!Algorithm::PopularityBased.is_personalized());
    }
}
