//! PawMatch swipe ledger - swipe decisions, entitlements and compatibility
//!
//! This library records each user's decision about a candidate pet,
//! gates privileged actions (super-likes, rewinds) behind subscription
//! allowances and purchased credits, and scores compatibility with a
//! remote scorer backed by a deterministic local fallback.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{
    CompatibilityEngine, EntitlementResolver, SwipeError, SwipeProcessor, UsageCounterService,
};
pub use models::{CompatibilityResult, FeatureKind, Profile, SwipeAction};
pub use services::{InMemoryStore, PostgresStore, SwipeStore};
