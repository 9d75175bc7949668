// Core algorithm exports
pub mod compatibility;
pub mod entitlements;
pub mod error;
pub mod fallback;
pub mod period;
pub mod processor;
pub mod usage;

pub use compatibility::{normalize_remote, CompatibilityEngine, CompatibilityError};
pub use entitlements::{
    decide, Authorization, AuthorizationView, Decision, Denial, DenialReason, EntitlementGate,
    EntitlementPolicy, EntitlementResolver, Funding, Grant, TierPlan,
};
pub use error::SwipeError;
pub use fallback::{fallback_score, summarize, Signals, DEFAULT_AGE_SPAN};
pub use period::{Clock, ManualClock, PeriodPolicy, SystemClock};
pub use processor::{RewindOutcome, SwipeOutcome, SwipeProcessor};
pub use usage::UsageCounterService;
