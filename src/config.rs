use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub recommender: RecommenderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// How a (user, post) cell of the interaction matrix is filled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum InteractionWeighting {
    /// Any interaction sets the cell to 1.
    Binary,
    /// The cell is the sum of the kind weights of every interaction on it.
    Weighted { like: f64, comment: f64, share: f64 },
}

impl InteractionWeighting {
    pub fn weighted_default() -> Self {
        InteractionWeighting::Weighted {
            like: 1.0,
            comment: 2.0,
            share: 3.0,
        }
    }
}

/// Tunables of the scoring pipeline. Defaults reproduce the production blend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommenderConfig {
    pub collaborative_weight: f64,
    pub content_weight: f64,
    pub location_boost: f64,
    pub category_boost: f64,
    pub k_neighbors: usize,
    pub popularity_half_life_hours: f64,
    /// Longest allowed run of consecutive entries sharing a location or category.
    pub max_consecutive_attribute: usize,
    pub request_timeout_ms: u64,
    pub ranking_cache_capacity: usize,
    pub snapshot_refresh_secs: u64,
    pub interaction_weighting: InteractionWeighting,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            collaborative_weight: 0.6,
            content_weight: 0.4,
            location_boost: 5.0,
            category_boost: 4.0,
            k_neighbors: 50,
            popularity_half_life_hours: 24.0,
            max_consecutive_attribute: 2,
            request_timeout_ms: 2_000,
            ranking_cache_capacity: 1_024,
            snapshot_refresh_secs: 300,
            interaction_weighting: InteractionWeighting::Binary,
        }
    }
}

impl RecommenderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn snapshot_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_refresh_secs)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.collaborative_weight < 0.0 || self.content_weight < 0.0 {
            return Err(AppError::ConfigurationError(
                "Blend weights must be non-negative".to_string(),
            ));
        }
        let sum = self.collaborative_weight + self.content_weight;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(AppError::ConfigurationError(format!(
                "Blend weights must sum to 1.0 (got {})",
                sum
            )));
        }
        if self.location_boost <= 0.0 || self.category_boost <= 0.0 {
            return Err(AppError::ConfigurationError(
                "Boost multipliers must be positive".to_string(),
            ));
        }
        if self.k_neighbors == 0 {
            return Err(AppError::ConfigurationError(
                "k_neighbors must be at least 1".to_string(),
            ));
        }
        if self.popularity_half_life_hours <= 0.0 {
            return Err(AppError::ConfigurationError(
                "Popularity half-life must be positive".to_string(),
            ));
        }
        if self.max_consecutive_attribute == 0 {
            return Err(AppError::ConfigurationError(
                "max_consecutive_attribute must be at least 1".to_string(),
            ));
        }
        if self.snapshot_refresh_secs == 0 {
            return Err(AppError::ConfigurationError(
                "snapshot_refresh_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let interaction_weighting = match env::var("RECOMMENDER_INTERACTION_WEIGHTING")
            .unwrap_or_else(|_| "binary".to_string())
            .to_lowercase()
            .as_str()
        {
            "weighted" => InteractionWeighting::weighted_default(),
            "binary" => InteractionWeighting::Binary,
            other => anyhow::bail!("Unknown interaction weighting: {}", other),
        };

        let config = Self {
            collaborative_weight: env_or("RECOMMENDER_COLLABORATIVE_WEIGHT", defaults.collaborative_weight),
            content_weight: env_or("RECOMMENDER_CONTENT_WEIGHT", defaults.content_weight),
            location_boost: env_or("RECOMMENDER_LOCATION_BOOST", defaults.location_boost),
            category_boost: env_or("RECOMMENDER_CATEGORY_BOOST", defaults.category_boost),
            k_neighbors: env_or("RECOMMENDER_K_NEIGHBORS", defaults.k_neighbors),
            popularity_half_life_hours: env_or(
                "RECOMMENDER_POPULARITY_HALF_LIFE_HOURS",
                defaults.popularity_half_life_hours,
            ),
            max_consecutive_attribute: env_or(
                "RECOMMENDER_MAX_CONSECUTIVE_ATTRIBUTE",
                defaults.max_consecutive_attribute,
            ),
            request_timeout_ms: env_or("RECOMMENDER_REQUEST_TIMEOUT_MS", defaults.request_timeout_ms),
            ranking_cache_capacity: env_or(
                "RECOMMENDER_RANKING_CACHE_CAPACITY",
                defaults.ranking_cache_capacity,
            ),
            snapshot_refresh_secs: env_or(
                "RECOMMENDER_SNAPSHOT_REFRESH_SECS",
                defaults.snapshot_refresh_secs,
            ),
            interaction_weighting,
        };
        config.validate()?;
        Ok(config)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite:data/travel_recommender.db".to_string()),
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", 5),
            },
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("SERVER_PORT", 3000),
            },
            recommender: RecommenderConfig::from_env()?,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RecommenderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.k_neighbors, 50);
        assert_eq!(config.interaction_weighting, InteractionWeighting::Binary);
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let config = RecommenderConfig {
            collaborative_weight: 0.7,
            content_weight: 0.4,
            ..RecommenderConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AppError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let config = RecommenderConfig {
            collaborative_weight: 1.2,
            content_weight: -0.2,
            ..RecommenderConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
