use crate::core::entitlements::{Authorization, AuthorizationView, EntitlementGate, Funding, Grant};
use crate::core::error::SwipeError;
use crate::core::period::Clock;
use crate::core::usage::UsageCounterService;
use crate::models::{
    CounterKind, CreditKind, FeatureKind, LifetimeStats, MatchRecord, SwipeAction, SwipeRecord,
    UsageResponse,
};
use crate::services::{MatchNotifier, ProfileStore, StoreError, SwipeStore, SwipeTxn};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Attempts to pin the rewind target before giving up on a busy ledger
const REWIND_ATTEMPTS: usize = 3;

/// Result of a recorded swipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwipeOutcome {
    pub matched: bool,
}

/// Result of a rewind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewindOutcome {
    pub restored_candidate_id: String,
}

/// Swipe ledger orchestrator
///
/// # Swipe pipeline
/// 1. Validate the pair against the profile source
/// 2. Lock both users' partitions (one unit of work)
/// 3. Idempotency check on the active (user, candidate) record
/// 4. Entitlement authorization for privileged actions
/// 5. Ledger append, entitlement consumption, counters, analytics, match
/// 6. Commit, then notify on a mutual like
///
/// Nothing from steps 3-5 is visible unless step 6 commits.
pub struct SwipeProcessor {
    store: Arc<dyn SwipeStore>,
    profiles: Arc<dyn ProfileStore>,
    gate: Arc<dyn EntitlementGate>,
    usage: UsageCounterService,
    notifier: Arc<dyn MatchNotifier>,
    clock: Arc<dyn Clock>,
}

impl SwipeProcessor {
    pub fn new(
        store: Arc<dyn SwipeStore>,
        profiles: Arc<dyn ProfileStore>,
        gate: Arc<dyn EntitlementGate>,
        usage: UsageCounterService,
        notifier: Arc<dyn MatchNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            profiles,
            gate,
            usage,
            notifier,
            clock,
        }
    }

    /// Record a swipe given as a raw action string
    pub async fn submit_swipe_str(
        &self,
        user_id: &str,
        candidate_id: &str,
        action: &str,
    ) -> Result<SwipeOutcome, SwipeError> {
        let action: SwipeAction = action.parse()?;
        self.submit_swipe(user_id, candidate_id, action).await
    }

    /// Record a user's decision about a candidate
    pub async fn submit_swipe(
        &self,
        user_id: &str,
        candidate_id: &str,
        action: SwipeAction,
    ) -> Result<SwipeOutcome, SwipeError> {
        if user_id == candidate_id {
            return Err(SwipeError::InvalidAction("cannot swipe on own profile".to_string()));
        }
        self.require_profiles(user_id, candidate_id).await?;

        let now = self.clock.now();
        let mut txn = self.store.begin(&[user_id, candidate_id]).await?;

        if txn.active_swipe(user_id, candidate_id).await?.is_some() {
            tracing::debug!("Duplicate swipe {} -> {}", user_id, candidate_id);
            return Err(already_decided(user_id, candidate_id));
        }

        let grant = if action == SwipeAction::SuperLike {
            Some(self.authorize(txn.as_mut(), user_id, FeatureKind::SuperLike, now).await?)
        } else {
            None
        };

        // Mutual like: the candidate already holds an active positive decision about us
        let matched = action.is_positive()
            && txn
                .active_swipe(candidate_id, user_id)
                .await?
                .is_some_and(|r| r.action.is_positive());

        let mut record = SwipeRecord::new(user_id, candidate_id, action, now);
        record.matched = matched;
        txn.append_swipe(&record).await.map_err(|e| match e {
            StoreError::Conflict(_) => already_decided(user_id, candidate_id),
            other => SwipeError::Store(other),
        })?;

        if let Some(grant) = grant {
            self.consume(txn.as_mut(), grant, now).await?;
        }
        self.usage
            .increment_in(txn.as_mut(), user_id, CounterKind::Swipes, now)
            .await?;

        let mut delta = LifetimeStats::for_swipe(action, 1);
        if matched {
            txn.create_match(&MatchRecord::new(user_id, candidate_id, now)).await?;
            txn.adjust_stats(candidate_id, &match_delta(1)).await?;
            delta.matches = 1;
        }
        txn.adjust_stats(user_id, &delta).await?;

        txn.commit().await?;
        tracing::info!(
            "Recorded {} {} -> {} (matched: {})",
            action,
            user_id,
            candidate_id,
            matched
        );

        if matched {
            self.notify_match(user_id, candidate_id);
        }
        Ok(SwipeOutcome { matched })
    }

    /// Undo the user's most recent swipe
    pub async fn rewind(&self, user_id: &str) -> Result<RewindOutcome, SwipeError> {
        for attempt in 1..=REWIND_ATTEMPTS {
            // The candidate partition must be locked too, so find it first
            let target = {
                let mut peek = self.store.begin(&[user_id]).await?;
                peek.latest_swipe(user_id).await?
            };
            let target = match target {
                Some(record) if record.is_active() => record,
                _ => return Err(SwipeError::NothingToRewind),
            };

            let mut txn = self.store.begin(&[user_id, target.candidate_id.as_str()]).await?;
            match txn.latest_swipe(user_id).await? {
                Some(latest) if latest.id == target.id && latest.is_active() => {
                    return self.rewind_locked(txn, target).await;
                }
                Some(latest) if latest.id == target.id => return Err(SwipeError::NothingToRewind),
                _ => tracing::debug!(
                    "Ledger of {} moved during rewind (attempt {})",
                    user_id,
                    attempt
                ),
            }
        }

        Err(SwipeError::Store(StoreError::Conflict(format!(
            "ledger of {} kept changing during rewind",
            user_id
        ))))
    }

    async fn rewind_locked(
        &self,
        mut txn: Box<dyn SwipeTxn>,
        target: SwipeRecord,
    ) -> Result<RewindOutcome, SwipeError> {
        let now = self.clock.now();
        let user_id = target.user_id.as_str();
        let candidate_id = target.candidate_id.as_str();

        let grant = self.authorize(txn.as_mut(), user_id, FeatureKind::Rewind, now).await?;
        txn.retract_swipe(user_id, target.id, now).await?;
        self.consume(txn.as_mut(), grant, now).await?;

        let mut delta = LifetimeStats::for_swipe(target.action, -1);
        delta.rewinds = 1;
        if txn.remove_match(user_id, candidate_id).await? {
            txn.adjust_stats(candidate_id, &match_delta(-1)).await?;
            delta.matches = -1;
        }
        txn.adjust_stats(user_id, &delta).await?;

        txn.commit().await?;
        tracing::info!("Rewound {} {} -> {}", target.action, user_id, candidate_id);

        Ok(RewindOutcome {
            restored_candidate_id: target.candidate_id,
        })
    }

    /// Read-only entitlement check; nothing is consumed or persisted
    pub async fn check_entitlement(
        &self,
        user_id: &str,
        feature: FeatureKind,
    ) -> Result<AuthorizationView, SwipeError> {
        let mut txn = self.store.begin(&[user_id]).await?;
        let authorization = self
            .gate
            .authorize(txn.as_mut(), user_id, feature, self.clock.now())
            .await?;
        Ok(authorization.view())
    }

    /// Add purchased credits and return the new balance
    pub async fn top_up(
        &self,
        user_id: &str,
        credit: CreditKind,
        amount: u32,
    ) -> Result<u32, SwipeError> {
        if amount == 0 {
            return Err(SwipeError::InvalidAction("credit amount must be positive".to_string()));
        }
        let mut txn = self.store.begin(&[user_id]).await?;
        let balance = self.gate.grant_credits(txn.as_mut(), user_id, credit, amount).await?;
        txn.commit().await?;
        Ok(balance)
    }

    /// Current period counters and lifetime analytics
    pub async fn usage(&self, user_id: &str) -> Result<UsageResponse, SwipeError> {
        let now = self.clock.now();
        let mut txn = self.store.begin(&[user_id]).await?;

        let mut counters = Vec::with_capacity(CounterKind::ALL.len());
        for kind in CounterKind::ALL {
            counters.push(self.usage.get_in(txn.as_mut(), user_id, kind, now).await?);
        }
        let lifetime = txn.stats(user_id).await?;
        txn.commit().await?;

        Ok(UsageResponse {
            user_id: user_id.to_string(),
            counters,
            lifetime,
        })
    }

    async fn require_profiles(&self, user_id: &str, candidate_id: &str) -> Result<(), SwipeError> {
        let (user, candidate) = tokio::try_join!(
            self.profiles.get_profile(user_id),
            self.profiles.get_profile(candidate_id)
        )?;

        if user.is_none() {
            return Err(SwipeError::NotFound(format!("user {}", user_id)));
        }
        match candidate {
            Some(profile) if profile.is_active => Ok(()),
            _ => Err(SwipeError::NotFound(format!("candidate {}", candidate_id))),
        }
    }

    async fn authorize(
        &self,
        txn: &mut dyn SwipeTxn,
        user_id: &str,
        feature: FeatureKind,
        now: DateTime<Utc>,
    ) -> Result<Grant, SwipeError> {
        match self.gate.authorize(txn, user_id, feature, now).await? {
            Authorization::Allowed(grant) => Ok(grant),
            Authorization::Denied(denial) => {
                tracing::info!("{} denied for {}: {}", feature, user_id, denial.reason.as_str());
                Err(denial.into())
            }
        }
    }

    /// Pay for a privileged action. The feature counter tracks every use,
    /// so it is bumped here unless the allowance deduction already did it.
    async fn consume(
        &self,
        txn: &mut dyn SwipeTxn,
        grant: Grant,
        now: DateTime<Utc>,
    ) -> Result<(), SwipeError> {
        let user_id = grant.user_id().to_string();
        let feature = grant.feature();
        let funding = grant.funding();

        self.gate.consume(txn, grant, now).await?;
        if funding != Funding::Allowance {
            self.usage.increment_in(txn, &user_id, feature.counter(), now).await?;
        }
        Ok(())
    }

    fn notify_match(&self, user_id: &str, candidate_id: &str) {
        let notifier = Arc::clone(&self.notifier);
        let (user_id, candidate_id) = (user_id.to_string(), candidate_id.to_string());
        tokio::spawn(async move {
            if let Err(e) = notifier.on_mutual_like(&user_id, &candidate_id).await {
                tracing::warn!("Match notification {} <-> {} failed: {}", user_id, candidate_id, e);
            }
        });
    }
}

fn already_decided(user_id: &str, candidate_id: &str) -> SwipeError {
    SwipeError::AlreadyDecided {
        user_id: user_id.to_string(),
        candidate_id: candidate_id.to_string(),
    }
}

fn match_delta(sign: i64) -> LifetimeStats {
    LifetimeStats {
        matches: sign,
        ..LifetimeStats::default()
    }
}
