use crate::core::period::{Clock, PeriodPolicy};
use crate::models::{CounterKind, UsageCounter, UsageSnapshot};
use crate::services::{StoreError, SwipeStore, SwipeTxn};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Rolling per-user usage counters.
///
/// A counter's period is recomputed whenever it is read or incremented;
/// crossing into a new period resets it inside the same unit of work as the
/// requested operation. There is no background reset job.
#[derive(Clone)]
pub struct UsageCounterService {
    store: Arc<dyn SwipeStore>,
    clock: Arc<dyn Clock>,
    policy: PeriodPolicy,
}

impl UsageCounterService {
    pub fn new(store: Arc<dyn SwipeStore>, clock: Arc<dyn Clock>, policy: PeriodPolicy) -> Self {
        Self { store, clock, policy }
    }

    pub fn policy(&self) -> PeriodPolicy {
        self.policy
    }

    /// Current value of a counter, in its own unit of work
    pub async fn get(&self, user_id: &str, kind: CounterKind) -> Result<UsageSnapshot, StoreError> {
        let mut txn = self.store.begin(&[user_id]).await?;
        let snapshot = self.get_in(txn.as_mut(), user_id, kind, self.clock.now()).await?;
        txn.commit().await?;
        Ok(snapshot)
    }

    /// Increment a counter by one, in its own unit of work
    pub async fn increment(
        &self,
        user_id: &str,
        kind: CounterKind,
    ) -> Result<UsageSnapshot, StoreError> {
        let mut txn = self.store.begin(&[user_id]).await?;
        let snapshot = self.increment_in(txn.as_mut(), user_id, kind, self.clock.now()).await?;
        txn.commit().await?;
        Ok(snapshot)
    }

    /// Read a counter inside an existing unit of work
    pub async fn get_in(
        &self,
        txn: &mut dyn SwipeTxn,
        user_id: &str,
        kind: CounterKind,
        now: DateTime<Utc>,
    ) -> Result<UsageSnapshot, StoreError> {
        let (counter, reset) = self.current(txn, user_id, kind, now).await?;
        if reset {
            txn.put_counter(user_id, &counter).await?;
        }
        Ok(snapshot(&counter))
    }

    /// Increment a counter inside an existing unit of work
    pub async fn increment_in(
        &self,
        txn: &mut dyn SwipeTxn,
        user_id: &str,
        kind: CounterKind,
        now: DateTime<Utc>,
    ) -> Result<UsageSnapshot, StoreError> {
        let (mut counter, _) = self.current(txn, user_id, kind, now).await?;
        counter.used = counter.used.saturating_add(1);
        txn.put_counter(user_id, &counter).await?;

        tracing::debug!("Usage {} for {} is now {}", kind.as_str(), user_id, counter.used);
        Ok(snapshot(&counter))
    }

    /// Stored counter rolled forward to the period containing `now`.
    /// The flag tells whether a reset happened.
    async fn current(
        &self,
        txn: &mut dyn SwipeTxn,
        user_id: &str,
        kind: CounterKind,
        now: DateTime<Utc>,
    ) -> Result<(UsageCounter, bool), StoreError> {
        let period_start = self.policy.period_start(now);
        match txn.counter(user_id, kind).await? {
            // A stored start later than ours means our clock lags; never move backwards
            Some(counter) if counter.period_start >= period_start => Ok((counter, false)),
            Some(_) | None => Ok((
                UsageCounter {
                    kind,
                    used: 0,
                    period_start,
                },
                true,
            )),
        }
    }
}

fn snapshot(counter: &UsageCounter) -> UsageSnapshot {
    UsageSnapshot {
        kind: counter.kind,
        used: counter.used,
        period_start: counter.period_start,
    }
}
