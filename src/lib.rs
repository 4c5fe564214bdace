// Travel Recommender - hybrid collaborative/content feed recommendations

// Core types and primitives
pub mod core;

// Domain records and output records
pub mod models;

// Storage, snapshots, caching and metrics
pub mod infrastructure;

// Scoring engines
pub mod recommender;

// Request orchestration
pub mod services;

// HTTP surface
pub mod recommendation_interface;
pub mod app_state;

// Common utilities
pub mod config;
pub mod error;
pub mod data_seeder;

// Re-exports for convenience
pub use error::{AppError, AppResult};
