use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Pet profile as supplied by the profile store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "profileId")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub species: String,
    #[serde(default)]
    pub breed: Option<String>,
    #[serde(rename = "ageYears")]
    pub age_years: f64,
    pub size: PetSize,
    #[serde(rename = "traitTags", default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub intent: Intent,
    #[serde(rename = "isActive", default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool { true }

/// Size class of a pet, ordered from smallest to largest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PetSize {
    Tiny,
    Small,
    Medium,
    Large,
    Giant,
}

impl PetSize {
    pub fn ordinal(self) -> u8 {
        match self {
            PetSize::Tiny => 0,
            PetSize::Small => 1,
            PetSize::Medium => 2,
            PetSize::Large => 3,
            PetSize::Giant => 4,
        }
    }
}

/// What the owner is looking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    #[default]
    Playdate,
    Companionship,
    Adoption,
    Breeding,
}

/// A swipe decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeAction {
    Like,
    Pass,
    #[serde(rename = "superlike")]
    SuperLike,
}

impl SwipeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            SwipeAction::Like => "like",
            SwipeAction::Pass => "pass",
            SwipeAction::SuperLike => "superlike",
        }
    }

    /// Likes and super-likes count towards a mutual match
    pub fn is_positive(self) -> bool {
        matches!(self, SwipeAction::Like | SwipeAction::SuperLike)
    }
}

impl fmt::Display for SwipeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for action strings outside `like|pass|superlike`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAction(pub String);

impl FromStr for SwipeAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "like" => Ok(SwipeAction::Like),
            "pass" => Ok(SwipeAction::Pass),
            "superlike" | "super_like" | "super-like" => Ok(SwipeAction::SuperLike),
            _ => Err(UnknownAction(s.to_string())),
        }
    }
}

/// One entry of a user's swipe ledger.
///
/// Everything except `retracted_at` is fixed at append time. A rewind sets
/// `retracted_at`, which makes the candidate swipeable again while keeping
/// the entry for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwipeRecord {
    pub id: Uuid,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "candidateId")]
    pub candidate_id: String,
    pub action: SwipeAction,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    pub matched: bool,
    #[serde(rename = "retractedAt", default)]
    pub retracted_at: Option<DateTime<Utc>>,
}

impl SwipeRecord {
    pub fn new(user_id: &str, candidate_id: &str, action: SwipeAction, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            candidate_id: candidate_id.to_string(),
            action,
            created_at: at,
            matched: false,
            retracted_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.retracted_at.is_none()
    }
}

/// Mutual like between two users, keyed by the unordered pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub user_low: String,
    pub user_high: String,
    pub created_at: DateTime<Utc>,
}

impl MatchRecord {
    pub fn new(a: &str, b: &str, at: DateTime<Utc>) -> Self {
        let (low, high) = ordered_pair(a, b);
        Self {
            user_low: low.to_string(),
            user_high: high.to_string(),
            created_at: at,
        }
    }

    pub fn involves(&self, a: &str, b: &str) -> bool {
        let (low, high) = ordered_pair(a, b);
        self.user_low == low && self.user_high == high
    }
}

pub fn ordered_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Subscription tier supplied by billing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    #[serde(rename = "none")]
    Free,
    Premium,
    Gold,
}

impl SubscriptionTier {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionTier::Free => "none",
            SubscriptionTier::Premium => "premium",
            SubscriptionTier::Gold => "gold",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" | "free" => Some(SubscriptionTier::Free),
            "premium" => Some(SubscriptionTier::Premium),
            "gold" => Some(SubscriptionTier::Gold),
            _ => None,
        }
    }
}

/// Per-feature flags granted by the subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlags {
    #[serde(default)]
    pub unlimited_likes: bool,
    #[serde(default)]
    pub unlimited_rewinds: bool,
}

/// Purchasable credit types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CreditKind {
    SuperLikes,
    Boosts,
    Rewinds,
}

impl CreditKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CreditKind::SuperLikes => "superLikes",
            CreditKind::Boosts => "boosts",
            CreditKind::Rewinds => "rewinds",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "superLikes" => Some(CreditKind::SuperLikes),
            "boosts" => Some(CreditKind::Boosts),
            "rewinds" => Some(CreditKind::Rewinds),
            _ => None,
        }
    }
}

/// User entitlement record.
///
/// Subscription fields are owned by billing and only read here; the
/// credit balances are mutated by the entitlement resolver.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementRecord {
    #[serde(default)]
    pub tier: SubscriptionTier,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub flags: FeatureFlags,
    #[serde(default)]
    pub balances: HashMap<CreditKind, u32>,
}

impl EntitlementRecord {
    pub fn subscribed(tier: SubscriptionTier, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            tier,
            active: true,
            expires_at,
            ..Self::default()
        }
    }

    pub fn has_active_subscription(&self, now: DateTime<Utc>) -> bool {
        self.tier != SubscriptionTier::Free
            && self.active
            && self.expires_at.map_or(true, |exp| exp > now)
    }

    pub fn balance(&self, credit: CreditKind) -> u32 {
        self.balances.get(&credit).copied().unwrap_or(0)
    }
}

/// Privileged actions gated by entitlements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    #[serde(rename = "superlike")]
    SuperLike,
    Rewind,
}

impl FeatureKind {
    pub fn credit(self) -> CreditKind {
        match self {
            FeatureKind::SuperLike => CreditKind::SuperLikes,
            FeatureKind::Rewind => CreditKind::Rewinds,
        }
    }

    pub fn counter(self) -> CounterKind {
        match self {
            FeatureKind::SuperLike => CounterKind::SuperLikes,
            FeatureKind::Rewind => CounterKind::Rewinds,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeatureKind::SuperLike => "superlike",
            FeatureKind::Rewind => "rewind",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "superlike" | "super_like" | "super-like" => Some(FeatureKind::SuperLike),
            "rewind" => Some(FeatureKind::Rewind),
            _ => None,
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Periodic usage counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CounterKind {
    Swipes,
    SuperLikes,
    Rewinds,
}

impl CounterKind {
    pub const ALL: [CounterKind; 3] = [
        CounterKind::Swipes,
        CounterKind::SuperLikes,
        CounterKind::Rewinds,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CounterKind::Swipes => "swipes",
            CounterKind::SuperLikes => "superLikes",
            CounterKind::Rewinds => "rewinds",
        }
    }
}

/// Stored counter state for one (user, kind)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounter {
    pub kind: CounterKind,
    pub used: u32,
    #[serde(rename = "periodStart")]
    pub period_start: DateTime<Utc>,
}

/// Lifetime analytics counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifetimeStats {
    pub swipes: i64,
    pub likes: i64,
    pub passes: i64,
    pub super_likes: i64,
    pub matches: i64,
    pub rewinds: i64,
}

impl LifetimeStats {
    pub fn apply(&mut self, delta: &LifetimeStats) {
        self.swipes += delta.swipes;
        self.likes += delta.likes;
        self.passes += delta.passes;
        self.super_likes += delta.super_likes;
        self.matches += delta.matches;
        self.rewinds += delta.rewinds;
    }

    /// Delta for one swipe of the given action; `sign` is 1 to record, -1 to undo
    pub fn for_swipe(action: SwipeAction, sign: i64) -> Self {
        let mut delta = LifetimeStats {
            swipes: sign,
            ..Self::default()
        };
        match action {
            SwipeAction::Like => delta.likes = sign,
            SwipeAction::Pass => delta.passes = sign,
            SwipeAction::SuperLike => delta.super_likes = sign,
        }
        delta
    }
}
