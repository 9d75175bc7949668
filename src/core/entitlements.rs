use crate::core::usage::UsageCounterService;
use crate::models::{CreditKind, EntitlementRecord, FeatureKind, SubscriptionTier};
use crate::services::{StoreError, SwipeTxn};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Allowances granted by one subscription tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TierPlan {
    pub super_likes_per_period: u32,
    pub rewinds_per_period: u32,
    pub unlimited_super_likes: bool,
    pub unlimited_rewinds: bool,
}

impl TierPlan {
    pub fn allowance(&self, feature: FeatureKind) -> u32 {
        match feature {
            FeatureKind::SuperLike => self.super_likes_per_period,
            FeatureKind::Rewind => self.rewinds_per_period,
        }
    }

    pub fn unlimited(&self, feature: FeatureKind) -> bool {
        match feature {
            FeatureKind::SuperLike => self.unlimited_super_likes,
            FeatureKind::Rewind => self.unlimited_rewinds,
        }
    }
}

/// Plans for the paid tiers; users without an active subscription have no plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitlementPolicy {
    pub premium: TierPlan,
    pub gold: TierPlan,
}

impl EntitlementPolicy {
    pub fn plan(&self, tier: SubscriptionTier) -> Option<&TierPlan> {
        match tier {
            SubscriptionTier::Free => None,
            SubscriptionTier::Premium => Some(&self.premium),
            SubscriptionTier::Gold => Some(&self.gold),
        }
    }
}

impl Default for EntitlementPolicy {
    fn default() -> Self {
        Self {
            premium: TierPlan {
                super_likes_per_period: 5,
                rewinds_per_period: 5,
                unlimited_super_likes: false,
                unlimited_rewinds: false,
            },
            gold: TierPlan {
                super_likes_per_period: 10,
                rewinds_per_period: 0,
                unlimited_super_likes: false,
                unlimited_rewinds: true,
            },
        }
    }
}

/// Which source pays for an authorized action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Funding {
    Unlimited,
    Allowance,
    Balance,
}

/// Machine-readable denial reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DenialReason {
    PremiumRequired,
    InsufficientBalance,
}

impl DenialReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DenialReason::PremiumRequired => "premiumRequired",
            DenialReason::InsufficientBalance => "insufficientBalance",
        }
    }
}

/// Outcome of the pure entitlement decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow(Funding),
    Deny { reason: DenialReason, balance: Option<u32> },
}

/// Decide how (or whether) a privileged action can be paid for.
///
/// 1. unlimited flag of an active subscription
/// 2. periodic allowance of an active subscription, while `used` is below it
/// 3. purchased credits
/// 4. deny: `premiumRequired` without an active subscription, else
///    `insufficientBalance` with the (zero) balance
pub fn decide(
    record: &EntitlementRecord,
    policy: &EntitlementPolicy,
    feature: FeatureKind,
    used: u32,
    now: DateTime<Utc>,
) -> Decision {
    let plan = if record.has_active_subscription(now) {
        policy.plan(record.tier)
    } else {
        None
    };

    if let Some(plan) = plan {
        let flag = match feature {
            FeatureKind::SuperLike => record.flags.unlimited_likes,
            FeatureKind::Rewind => record.flags.unlimited_rewinds,
        };
        if flag || plan.unlimited(feature) {
            return Decision::Allow(Funding::Unlimited);
        }
        if used < plan.allowance(feature) {
            return Decision::Allow(Funding::Allowance);
        }
    }

    let balance = record.balance(feature.credit());
    if balance > 0 {
        return Decision::Allow(Funding::Balance);
    }

    match plan {
        None => Decision::Deny {
            reason: DenialReason::PremiumRequired,
            balance: None,
        },
        Some(_) => Decision::Deny {
            reason: DenialReason::InsufficientBalance,
            balance: Some(balance),
        },
    }
}

/// Permission to perform one privileged action.
///
/// Only [`EntitlementGate::authorize`] creates grants, and `consume` takes
/// them by value, so each authorization pays for exactly one action.
#[derive(Debug)]
pub struct Grant {
    txn_id: Uuid,
    user_id: String,
    feature: FeatureKind,
    funding: Funding,
    /// Purchased balance at authorization time
    balance: u32,
}

impl Grant {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn feature(&self) -> FeatureKind {
        self.feature
    }

    pub fn funding(&self) -> Funding {
        self.funding
    }
}

/// Refusal to perform a privileged action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub feature: FeatureKind,
    pub reason: DenialReason,
    pub balance: Option<u32>,
}

#[derive(Debug)]
pub enum Authorization {
    Allowed(Grant),
    Denied(Denial),
}

impl Authorization {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Authorization::Allowed(_))
    }

    pub fn view(&self) -> AuthorizationView {
        match self {
            Authorization::Allowed(grant) => AuthorizationView {
                allowed: true,
                reason: None,
                remaining_balance: Some(grant.balance),
                funding: Some(grant.funding),
            },
            Authorization::Denied(denial) => AuthorizationView {
                allowed: false,
                reason: Some(denial.reason),
                remaining_balance: denial.balance,
                funding: None,
            },
        }
    }
}

/// Serializable form of an authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationView {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenialReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_balance: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funding: Option<Funding>,
}

/// Entitlement check and deduction, both inside the caller's unit of work
#[async_trait]
pub trait EntitlementGate: Send + Sync {
    async fn authorize(
        &self,
        txn: &mut dyn SwipeTxn,
        user_id: &str,
        feature: FeatureKind,
        now: DateTime<Utc>,
    ) -> Result<Authorization, StoreError>;

    async fn consume(
        &self,
        txn: &mut dyn SwipeTxn,
        grant: Grant,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Add purchased credits after a completed checkout
    async fn grant_credits(
        &self,
        txn: &mut dyn SwipeTxn,
        user_id: &str,
        credit: CreditKind,
        amount: u32,
    ) -> Result<u32, StoreError> {
        let balance = txn.adjust_balance(user_id, credit, i64::from(amount)).await?;
        tracing::info!(
            "Granted {} {} credits to {} (balance {})",
            amount,
            credit.as_str(),
            user_id,
            balance
        );
        Ok(balance)
    }
}

/// Default gate: subscription record, usage counters and credit balances
#[derive(Clone)]
pub struct EntitlementResolver {
    policy: EntitlementPolicy,
    usage: UsageCounterService,
}

impl EntitlementResolver {
    pub fn new(policy: EntitlementPolicy, usage: UsageCounterService) -> Self {
        Self { policy, usage }
    }

    pub fn policy(&self) -> &EntitlementPolicy {
        &self.policy
    }
}

#[async_trait]
impl EntitlementGate for EntitlementResolver {
    async fn authorize(
        &self,
        txn: &mut dyn SwipeTxn,
        user_id: &str,
        feature: FeatureKind,
        now: DateTime<Utc>,
    ) -> Result<Authorization, StoreError> {
        let record = txn.entitlement(user_id).await?;
        let used = self.usage.get_in(txn, user_id, feature.counter(), now).await?.used;
        let balance = record.balance(feature.credit());

        match decide(&record, &self.policy, feature, used, now) {
            Decision::Allow(funding) => {
                tracing::debug!("Authorized {} for {} via {:?}", feature, user_id, funding);
                Ok(Authorization::Allowed(Grant {
                    txn_id: txn.id(),
                    user_id: user_id.to_string(),
                    feature,
                    funding,
                    balance,
                }))
            }
            Decision::Deny { reason, balance } => {
                tracing::debug!("Denied {} for {}: {}", feature, user_id, reason.as_str());
                Ok(Authorization::Denied(Denial { feature, reason, balance }))
            }
        }
    }

    async fn consume(
        &self,
        txn: &mut dyn SwipeTxn,
        grant: Grant,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if grant.txn_id != txn.id() {
            return Err(StoreError::Invariant(format!(
                "{} grant for {} was issued by another unit of work",
                grant.feature, grant.user_id
            )));
        }

        match grant.funding {
            Funding::Unlimited => {}
            Funding::Allowance => {
                self.usage
                    .increment_in(txn, &grant.user_id, grant.feature.counter(), now)
                    .await?;
            }
            Funding::Balance => {
                txn.adjust_balance(&grant.user_id, grant.feature.credit(), -1).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::period::{ManualClock, PeriodPolicy};
    use crate::models::CounterKind;
    use crate::services::{InMemoryStore, SwipeStore};
    use chrono::Duration;
    use std::sync::Arc;

    fn premium() -> EntitlementRecord {
        EntitlementRecord::subscribed(SubscriptionTier::Premium, None)
    }

    #[test]
    fn test_unlimited_flag_wins() {
        let mut record = premium();
        record.flags.unlimited_likes = true;
        let policy = EntitlementPolicy::default();
        let decision = decide(&record, &policy, FeatureKind::SuperLike, 99, Utc::now());
        assert_eq!(decision, Decision::Allow(Funding::Unlimited));
    }

    #[test]
    fn test_allowance_then_balance_then_deny() {
        let policy = EntitlementPolicy::default();
        let now = Utc::now();
        let mut record = premium();

        assert_eq!(
            decide(&record, &policy, FeatureKind::SuperLike, 4, now),
            Decision::Allow(Funding::Allowance)
        );
        assert_eq!(
            decide(&record, &policy, FeatureKind::SuperLike, 5, now),
            Decision::Deny {
                reason: DenialReason::InsufficientBalance,
                balance: Some(0)
            }
        );

        record.balances.insert(CreditKind::SuperLikes, 1);
        assert_eq!(
            decide(&record, &policy, FeatureKind::SuperLike, 5, now),
            Decision::Allow(Funding::Balance)
        );
    }

    #[test]
    fn test_no_subscription_requires_premium() {
        let policy = EntitlementPolicy::default();
        let now = Utc::now();
        let mut record = EntitlementRecord::default();
        record.flags.unlimited_likes = true;

        assert_eq!(
            decide(&record, &policy, FeatureKind::SuperLike, 0, now),
            Decision::Deny {
                reason: DenialReason::PremiumRequired,
                balance: None
            }
        );

        // Purchased credits work without a subscription
        record.balances.insert(CreditKind::SuperLikes, 2);
        assert_eq!(
            decide(&record, &policy, FeatureKind::SuperLike, 0, now),
            Decision::Allow(Funding::Balance)
        );
    }

    #[test]
    fn test_expired_subscription_treated_as_none() {
        let now = Utc::now();
        let record =
            EntitlementRecord::subscribed(SubscriptionTier::Gold, Some(now - Duration::hours(1)));
        assert_eq!(
            decide(&record, &EntitlementPolicy::default(), FeatureKind::Rewind, 0, now),
            Decision::Deny {
                reason: DenialReason::PremiumRequired,
                balance: None
            }
        );
    }

    #[test]
    fn test_gold_rewinds_unlimited() {
        let record = EntitlementRecord::subscribed(SubscriptionTier::Gold, None);
        assert_eq!(
            decide(&record, &EntitlementPolicy::default(), FeatureKind::Rewind, 1000, Utc::now()),
            Decision::Allow(Funding::Unlimited)
        );
    }

    fn resolver(store: Arc<dyn SwipeStore>) -> EntitlementResolver {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let usage = UsageCounterService::new(store, clock, PeriodPolicy::weekly());
        EntitlementResolver::new(EntitlementPolicy::default(), usage)
    }

    #[tokio::test]
    async fn test_consume_deducts_from_single_source() {
        let store = Arc::new(InMemoryStore::new());
        let mut record = premium();
        record.balances.insert(CreditKind::SuperLikes, 3);
        store.put_entitlement("u1", record).await;
        let gate = resolver(store.clone());
        let now = Utc::now();

        let mut txn = store.begin(&["u1"]).await.unwrap();
        let authorization = gate
            .authorize(txn.as_mut(), "u1", FeatureKind::SuperLike, now)
            .await
            .unwrap();
        let grant = match authorization {
            Authorization::Allowed(grant) => grant,
            Authorization::Denied(d) => panic!("unexpected denial {:?}", d),
        };
        assert_eq!(grant.funding(), Funding::Allowance);
        gate.consume(txn.as_mut(), grant, now).await.unwrap();
        txn.commit().await.unwrap();

        let snapshot = store.snapshot("u1").await;
        assert_eq!(snapshot.entitlement.balance(CreditKind::SuperLikes), 3);
        assert_eq!(snapshot.counters[&CounterKind::SuperLikes].used, 1);
    }

    #[tokio::test]
    async fn test_grant_bound_to_unit_of_work() {
        let store = Arc::new(InMemoryStore::new());
        let mut record = EntitlementRecord::default();
        record.balances.insert(CreditKind::Rewinds, 1);
        store.put_entitlement("u1", record).await;
        let gate = resolver(store.clone());
        let now = Utc::now();

        let grant = {
            let mut txn = store.begin(&["u1"]).await.unwrap();
            match gate.authorize(txn.as_mut(), "u1", FeatureKind::Rewind, now).await.unwrap() {
                Authorization::Allowed(grant) => grant,
                Authorization::Denied(d) => panic!("unexpected denial {:?}", d),
            }
        };

        let mut other = store.begin(&["u1"]).await.unwrap();
        let err = gate.consume(other.as_mut(), grant, now).await.unwrap_err();
        assert!(matches!(err, StoreError::Invariant(_)));
    }

    #[tokio::test]
    async fn test_authorization_view() {
        let store = Arc::new(InMemoryStore::new());
        let gate = resolver(store.clone());
        let mut txn = store.begin(&["u1"]).await.unwrap();
        let view = gate
            .authorize(txn.as_mut(), "u1", FeatureKind::SuperLike, Utc::now())
            .await
            .unwrap()
            .view();
        assert!(!view.allowed);
        assert_eq!(view.reason, Some(DenialReason::PremiumRequired));
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["reason"], "premiumRequired");
    }
}
