use crate::core::entitlements::{Denial, DenialReason};
use crate::models::domain::UnknownAction;
use crate::models::FeatureKind;
use crate::services::{ProfileError, StoreError};
use thiserror::Error;

/// Outcome of a failed swipe, rewind or entitlement request.
///
/// Everything except `Profiles` and `Store` is a business outcome the
/// caller is expected to branch on; those two are infrastructure failures
/// to be retried at a higher level.
#[derive(Debug, Error)]
pub enum SwipeError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{user_id} already decided on {candidate_id}")]
    AlreadyDecided { user_id: String, candidate_id: String },

    #[error("{feature} denied: {}", reason.as_str())]
    EntitlementDenied {
        feature: FeatureKind,
        reason: DenialReason,
        balance: Option<u32>,
    },

    #[error("Nothing to rewind")]
    NothingToRewind,

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Profile lookup failed: {0}")]
    Profiles(#[from] ProfileError),

    #[error("Storage failure: {0}")]
    Store(#[from] StoreError),
}

impl From<Denial> for SwipeError {
    fn from(denial: Denial) -> Self {
        SwipeError::EntitlementDenied {
            feature: denial.feature,
            reason: denial.reason,
            balance: denial.balance,
        }
    }
}

impl From<UnknownAction> for SwipeError {
    fn from(err: UnknownAction) -> Self {
        SwipeError::InvalidAction(format!("unknown action '{}'", err.0))
    }
}

impl SwipeError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            SwipeError::NotFound(_) => "notFound",
            SwipeError::AlreadyDecided { .. } => "alreadyDecided",
            SwipeError::EntitlementDenied { .. } => "entitlementDenied",
            SwipeError::NothingToRewind => "nothingToRewind",
            SwipeError::InvalidAction(_) => "invalidAction",
            SwipeError::Profiles(_) => "profileSourceUnavailable",
            SwipeError::Store(_) => "storageUnavailable",
        }
    }

    /// Infrastructure failures, as opposed to business outcomes
    pub fn is_fatal(&self) -> bool {
        matches!(self, SwipeError::Profiles(_) | SwipeError::Store(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denial_conversion_keeps_balance() {
        let err: SwipeError = Denial {
            feature: FeatureKind::SuperLike,
            reason: DenialReason::InsufficientBalance,
            balance: Some(0),
        }
        .into();
        assert!(matches!(
            err,
            SwipeError::EntitlementDenied {
                reason: DenialReason::InsufficientBalance,
                balance: Some(0),
                ..
            }
        ));
        assert_eq!(err.to_string(), "superlike denied: insufficientBalance");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_unknown_action_is_invalid() {
        let err: SwipeError = "boop".parse::<crate::models::SwipeAction>().unwrap_err().into();
        assert_eq!(err.code(), "invalidAction");
    }
}
