use serde::{Deserialize, Serialize};
use validator::Validate;

/// Request to record a swipe decision
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitSwipeRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "user_id", rename = "userId")]
    pub user_id: String,
    #[validate(length(min = 1))]
    #[serde(alias = "candidate_id", rename = "candidateId")]
    pub candidate_id: String,
    /// Parsed later so an unknown value surfaces as `InvalidAction`
    #[validate(length(min = 1))]
    pub action: String,
}

/// Request to undo the most recent swipe
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RewindRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "user_id", rename = "userId")]
    pub user_id: String,
}

/// Request to score two profiles
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CompatibilityRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "profile_a", rename = "profileA")]
    pub profile_a: String,
    #[validate(length(min = 1))]
    #[serde(alias = "profile_b", rename = "profileB")]
    pub profile_b: String,
}

/// Credit top-up issued by the purchase flow after a completed checkout
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreditGrantRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "user_id", rename = "userId")]
    pub user_id: String,
    /// `superLikes`, `boosts` or `rewinds`
    #[validate(length(min = 1))]
    pub credit: String,
    #[validate(range(min = 1, max = 10000))]
    pub amount: u32,
}
