// Core types and primitives

pub mod strong_types;

pub use strong_types::{PostId, UserId};
