// Model exports
pub mod compatibility;
pub mod domain;
pub mod requests;
pub mod responses;

pub use compatibility::{
    CompatibilityBreakdown, CompatibilityResult, Provenance, RemoteBreakdown, RemoteScoreResponse,
};
pub use domain::{
    CounterKind, CreditKind, EntitlementRecord, FeatureFlags, FeatureKind, Intent, LifetimeStats,
    MatchRecord, PetSize, Profile, SubscriptionTier, SwipeAction, SwipeRecord, UsageCounter,
};
pub use requests::{CompatibilityRequest, CreditGrantRequest, RewindRequest, SubmitSwipeRequest};
pub use responses::{
    CreditGrantResponse, ErrorResponse, HealthResponse, RewindResponse, SwipeResponse,
    UsageResponse, UsageSnapshot,
};
