use crate::models::{
    CounterKind, CreditKind, EntitlementRecord, LifetimeStats, MatchRecord, SwipeRecord,
    UsageCounter,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the ledger storage backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLx error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Partition not held by this unit of work: {0}")]
    NotLocked(String),

    #[error("Conflicting write: {0}")]
    Conflict(String),

    #[error("Invariant violated: {0}")]
    Invariant(String),
}

/// Durable per-user storage for the swipe ledger, entitlements and counters.
///
/// All mutation goes through a [`SwipeTxn`] obtained from [`SwipeStore::begin`].
#[async_trait]
pub trait SwipeStore: Send + Sync {
    /// Open a unit of work with exclusive access to the given users' partitions.
    ///
    /// Partitions are acquired in sorted user-id order, duplicates are ignored.
    async fn begin(&self, user_ids: &[&str]) -> Result<Box<dyn SwipeTxn>, StoreError>;
}

/// One atomic unit of work over a set of user partitions.
///
/// Nothing is visible to other units of work until [`SwipeTxn::commit`];
/// dropping the value without committing discards every change.
#[async_trait]
pub trait SwipeTxn: Send {
    /// Identifier used to bind entitlement grants to this unit of work
    fn id(&self) -> Uuid;

    async fn entitlement(&mut self, user_id: &str) -> Result<EntitlementRecord, StoreError>;

    /// Add `delta` to a credit balance and return the new balance.
    /// Fails with `Invariant` instead of going below zero.
    async fn adjust_balance(
        &mut self,
        user_id: &str,
        credit: CreditKind,
        delta: i64,
    ) -> Result<u32, StoreError>;

    async fn counter(
        &mut self,
        user_id: &str,
        kind: CounterKind,
    ) -> Result<Option<UsageCounter>, StoreError>;

    async fn put_counter(
        &mut self,
        user_id: &str,
        counter: &UsageCounter,
    ) -> Result<(), StoreError>;

    /// Active (not retracted) record for the pair, if any
    async fn active_swipe(
        &mut self,
        user_id: &str,
        candidate_id: &str,
    ) -> Result<Option<SwipeRecord>, StoreError>;

    /// Most recently appended record, retracted or not
    async fn latest_swipe(&mut self, user_id: &str) -> Result<Option<SwipeRecord>, StoreError>;

    async fn append_swipe(&mut self, record: &SwipeRecord) -> Result<(), StoreError>;

    async fn retract_swipe(
        &mut self,
        user_id: &str,
        swipe_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn stats(&mut self, user_id: &str) -> Result<LifetimeStats, StoreError>;

    async fn adjust_stats(
        &mut self,
        user_id: &str,
        delta: &LifetimeStats,
    ) -> Result<(), StoreError>;

    /// Record a match; stored once per unordered pair
    async fn create_match(&mut self, record: &MatchRecord) -> Result<(), StoreError>;

    /// Remove the match between two users, returning whether one existed
    async fn remove_match(&mut self, a: &str, b: &str) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Sorted, de-duplicated lock order for a set of user ids
pub fn lock_order(user_ids: &[&str]) -> Vec<String> {
    let mut ids: Vec<String> = user_ids.iter().map(|id| id.to_string()).collect();
    ids.sort();
    ids.dedup();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_order_sorted_and_deduped() {
        assert_eq!(
            lock_order(&["zoe", "adam", "zoe"]),
            vec!["adam".to_string(), "zoe".to_string()]
        );
        assert!(lock_order(&[]).is_empty());
    }
}
