// Sample data generator - travel users, located posts, interactions and follows

use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::{
    core::{PostId, UserId},
    error::{AppError, AppResult},
    infrastructure::sqlite_database::{NewPost, SqliteRepository},
    models::InteractionKind,
};

/// (location, category) pairs posts are drawn from.
pub const DESTINATIONS: &[(&str, &str)] = &[
    ("Goa", "beach"),
    ("Kerala Backwaters", "nature"),
    ("Rajasthan", "historical"),
    ("Kashmir", "mountain"),
    ("Mumbai", "city"),
    ("Delhi", "city"),
    ("Manali", "mountain"),
    ("Rishikesh", "spiritual"),
    ("Agra", "historical"),
    ("Hampi", "historical"),
    ("Ladakh", "mountain"),
    ("Udaipur", "historical"),
    ("Dubai", "city"),
    ("Thailand", "beach"),
    ("Singapore", "city"),
    ("London", "city"),
    ("Paris", "city"),
    ("Maldives", "beach"),
    ("Nepal", "mountain"),
    ("Sri Lanka", "beach"),
];

const TRAVEL_TAGS: &[&str] = &[
    "adventure", "beach", "culture", "food", "nature", "photography", "backpacking", "luxury",
    "wildlife", "mountains", "sunset", "architecture", "spiritual", "heritage", "festivals",
    "street food",
];

const FIRST_NAMES: &[&str] = &[
    "arjun", "priya", "rahul", "ananya", "rohan", "kavya", "aman", "shreya", "vikram", "riya",
    "aditya", "neha", "karan", "pooja", "meera", "isha",
];

const LAST_NAMES: &[&str] = &[
    "sharma", "gupta", "singh", "kumar", "patel", "shah", "mehta", "verma", "chopra",
];

const HOME_CITIES: &[&str] = &[
    "Mumbai", "Delhi", "Bangalore", "Pune", "Chennai", "Hyderabad", "Kolkata", "Jaipur",
];

const CAPTION_TEMPLATES: &[&str] = &[
    "Magical sunset at {}! India never fails to amaze #IncredibleIndia",
    "Just reached {} and I'm speechless! #wanderlust",
    "The beauty of {} is beyond imagination... #traveldiaries",
    "Missing {} already... next trip planning mode ON! #TravelBug",
    "Food, culture, heritage - {} has my heart!",
    "Solo trip to {}! Sometimes you need to get lost to find yourself",
    "Squad trip to {}! These memories will last forever #FriendsTrip",
    "Heritage walk in {}! Our history is so rich",
    "Street food hunting in {}! Foodie heaven #StreetFood",
];

#[derive(Debug, Clone)]
pub struct SeedConfig {
    pub users: usize,
    pub posts: usize,
    pub interactions: usize,
    pub follows: usize,
    /// Share of posts created without a caption (pure media)
    pub media_only_ratio: f64,
    pub seed: u64,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            users: 100,
            posts: 500,
            interactions: 2_000,
            follows: 800,
            media_only_ratio: 0.05,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub users: usize,
    pub posts: usize,
    pub interactions: usize,
    pub follows: usize,
}

fn pick<'a, T>(rng: &mut StdRng, items: &'a [T]) -> &'a T {
    &items[rng.random_range(0..items.len())]
}

/// Fills the store with synthetic travel data. The same seed always yields
/// the same dataset on an empty store.
pub async fn seed_sample_data(store: &SqliteRepository, config: &SeedConfig) -> AppResult<SeedSummary> {
    if config.users == 0 {
        return Err(AppError::Validation("At least one user is required".to_string()));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut summary = SeedSummary::default();
    let now = Utc::now();

    let mut user_ids: Vec<UserId> = Vec::with_capacity(config.users);
    for i in 0..config.users {
        let username = format!(
            "{}_{}_{}",
            pick(&mut rng, FIRST_NAMES),
            pick(&mut rng, LAST_NAMES),
            i
        );
        let interests: Vec<&str> = (0..rng.random_range(2..5))
            .map(|_| *pick(&mut rng, TRAVEL_TAGS))
            .collect();
        let home = *pick(&mut rng, HOME_CITIES);
        user_ids.push(store.create_user(&username, &interests, Some(home)).await?);
        summary.users += 1;
    }

    let mut posts: Vec<(PostId, UserId)> = Vec::with_capacity(config.posts);
    for _ in 0..config.posts {
        let author_id = *pick(&mut rng, &user_ids);
        let (location, category) = *pick(&mut rng, DESTINATIONS);
        let caption = if rng.random_bool(config.media_only_ratio.clamp(0.0, 1.0)) {
            None
        } else {
            Some(pick(&mut rng, CAPTION_TEMPLATES).replace("{}", location))
        };
        let created_at = now - Duration::hours(rng.random_range(0..24 * 60));

        let post_id = store
            .create_post(NewPost {
                author_id,
                location: Some(location.to_string()),
                category: Some(category.to_string()),
                caption,
                created_at,
            })
            .await?;
        posts.push((post_id, author_id));
        summary.posts += 1;
    }

    if !posts.is_empty() {
        for _ in 0..config.interactions {
            let user_id = *pick(&mut rng, &user_ids);
            let (post_id, author_id) = *pick(&mut rng, &posts);
            if user_id == author_id {
                continue;
            }
            let kind = match rng.random_range(0..100) {
                0..=64 => InteractionKind::Like,
                65..=89 => InteractionKind::Comment,
                _ => InteractionKind::Share,
            };
            let at = now - Duration::minutes(rng.random_range(0..60 * 24 * 30));
            match store.record_interaction(user_id, post_id, kind, at).await {
                Ok(_) => summary.interactions += 1,
                // Repeated like on the same post
                Err(AppError::Validation(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    for _ in 0..config.follows {
        let follower = *pick(&mut rng, &user_ids);
        let followee = *pick(&mut rng, &user_ids);
        if follower == followee {
            continue;
        }
        store.follow(follower, followee).await?;
        summary.follows += 1;
    }

    info!(
        users = summary.users,
        posts = summary.posts,
        interactions = summary.interactions,
        follows = summary.follows,
        "Sample data generated"
    );
    Ok(summary)
}
