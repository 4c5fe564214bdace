use tracing_subscriber::EnvFilter;

use travel_recommender::{
    config::Config,
    data_seeder::{seed_sample_data, SeedConfig},
    infrastructure::sqlite_database::SqliteRepository,
};

fn env_or(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let defaults = SeedConfig::default();
    let seed_config = SeedConfig {
        users: env_or("SEED_USERS", defaults.users),
        posts: env_or("SEED_POSTS", defaults.posts),
        interactions: env_or("SEED_INTERACTIONS", defaults.interactions),
        follows: env_or("SEED_FOLLOWS", defaults.follows),
        seed: env_or("SEED_RNG", defaults.seed as usize) as u64,
        ..defaults
    };

    println!("🚀 Generating sample travel data into {}", config.database.url);
    let store = SqliteRepository::connect(&config.database.url, config.database.max_connections).await?;
    let summary = seed_sample_data(&store, &seed_config).await?;

    println!("✅ Sample data generation complete");
    println!("   Users:        {}", summary.users);
    println!("   Posts:        {}", summary.posts);
    println!("   Interactions: {}", summary.interactions);
    println!("   Follows:      {}", summary.follows);

    Ok(())
}
