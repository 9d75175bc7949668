use crate::models::{
    CounterKind, CreditKind, EntitlementRecord, LifetimeStats, MatchRecord, SwipeRecord,
    UsageCounter,
};
use crate::services::store::{lock_order, StoreError, SwipeStore, SwipeTxn};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Everything owned by one user
#[derive(Debug, Clone, Default)]
pub struct UserPartition {
    pub entitlement: EntitlementRecord,
    pub counters: HashMap<CounterKind, UsageCounter>,
    pub ledger: Vec<SwipeRecord>,
    pub matches: Vec<MatchRecord>,
    pub stats: LifetimeStats,
}

/// In-process store with one async mutex per user partition.
///
/// Used by tests and single-node deployments. A unit of work edits private
/// copies of the locked partitions and writes them back on commit.
#[derive(Default)]
pub struct InMemoryStore {
    partitions: Mutex<HashMap<String, Arc<Mutex<UserPartition>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn partition(&self, user_id: &str) -> Arc<Mutex<UserPartition>> {
        let mut partitions = self.partitions.lock().await;
        partitions
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(UserPartition::default())))
            .clone()
    }

    /// Replace a user's entitlement record, as the billing source would
    pub async fn put_entitlement(&self, user_id: &str, record: EntitlementRecord) {
        let partition = self.partition(user_id).await;
        partition.lock().await.entitlement = record;
    }

    /// Copy of a user's partition for inspection
    pub async fn snapshot(&self, user_id: &str) -> UserPartition {
        let partition = self.partition(user_id).await;
        let guard = partition.lock().await;
        guard.clone()
    }
}

#[async_trait]
impl SwipeStore for InMemoryStore {
    async fn begin(&self, user_ids: &[&str]) -> Result<Box<dyn SwipeTxn>, StoreError> {
        let mut held = HashMap::new();
        for user_id in lock_order(user_ids) {
            let guard = self.partition(&user_id).await.lock_owned().await;
            let working = guard.clone();
            held.insert(user_id, Held { guard, working });
        }

        Ok(Box::new(InMemoryTxn {
            id: Uuid::new_v4(),
            held,
        }))
    }
}

struct Held {
    guard: OwnedMutexGuard<UserPartition>,
    working: UserPartition,
}

struct InMemoryTxn {
    id: Uuid,
    held: HashMap<String, Held>,
}

impl InMemoryTxn {
    fn part(&mut self, user_id: &str) -> Result<&mut UserPartition, StoreError> {
        self.held
            .get_mut(user_id)
            .map(|held| &mut held.working)
            .ok_or_else(|| StoreError::NotLocked(user_id.to_string()))
    }
}

#[async_trait]
impl SwipeTxn for InMemoryTxn {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn entitlement(&mut self, user_id: &str) -> Result<EntitlementRecord, StoreError> {
        Ok(self.part(user_id)?.entitlement.clone())
    }

    async fn adjust_balance(
        &mut self,
        user_id: &str,
        credit: CreditKind,
        delta: i64,
    ) -> Result<u32, StoreError> {
        let part = self.part(user_id)?;
        let current = i64::from(part.entitlement.balance(credit));
        let next = current + delta;
        if next < 0 {
            return Err(StoreError::Invariant(format!(
                "{} balance of {} would become {}",
                credit.as_str(),
                user_id,
                next
            )));
        }
        let next = u32::try_from(next)
            .map_err(|_| StoreError::Invariant(format!("{} balance overflow", credit.as_str())))?;
        part.entitlement.balances.insert(credit, next);
        Ok(next)
    }

    async fn counter(
        &mut self,
        user_id: &str,
        kind: CounterKind,
    ) -> Result<Option<UsageCounter>, StoreError> {
        Ok(self.part(user_id)?.counters.get(&kind).cloned())
    }

    async fn put_counter(
        &mut self,
        user_id: &str,
        counter: &UsageCounter,
    ) -> Result<(), StoreError> {
        self.part(user_id)?.counters.insert(counter.kind, counter.clone());
        Ok(())
    }

    async fn active_swipe(
        &mut self,
        user_id: &str,
        candidate_id: &str,
    ) -> Result<Option<SwipeRecord>, StoreError> {
        Ok(self
            .part(user_id)?
            .ledger
            .iter()
            .find(|r| r.candidate_id == candidate_id && r.is_active())
            .cloned())
    }

    async fn latest_swipe(&mut self, user_id: &str) -> Result<Option<SwipeRecord>, StoreError> {
        Ok(self.part(user_id)?.ledger.last().cloned())
    }

    async fn append_swipe(&mut self, record: &SwipeRecord) -> Result<(), StoreError> {
        let part = self.part(&record.user_id)?;
        if part
            .ledger
            .iter()
            .any(|r| r.candidate_id == record.candidate_id && r.is_active())
        {
            return Err(StoreError::Conflict(format!(
                "active swipe exists for {} -> {}",
                record.user_id, record.candidate_id
            )));
        }
        part.ledger.push(record.clone());
        Ok(())
    }

    async fn retract_swipe(
        &mut self,
        user_id: &str,
        swipe_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let part = self.part(user_id)?;
        let record = part
            .ledger
            .iter_mut()
            .find(|r| r.id == swipe_id)
            .ok_or_else(|| StoreError::Invariant(format!("unknown swipe {}", swipe_id)))?;
        if record.retracted_at.is_some() {
            return Err(StoreError::Conflict(format!("swipe {} already retracted", swipe_id)));
        }
        record.retracted_at = Some(at);
        Ok(())
    }

    async fn stats(&mut self, user_id: &str) -> Result<LifetimeStats, StoreError> {
        Ok(self.part(user_id)?.stats)
    }

    async fn adjust_stats(
        &mut self,
        user_id: &str,
        delta: &LifetimeStats,
    ) -> Result<(), StoreError> {
        self.part(user_id)?.stats.apply(delta);
        Ok(())
    }

    async fn create_match(&mut self, record: &MatchRecord) -> Result<(), StoreError> {
        // Both sides must be held before either is touched
        for user_id in [&record.user_low, &record.user_high] {
            if !self.held.contains_key(user_id.as_str()) {
                return Err(StoreError::NotLocked(user_id.clone()));
            }
        }
        for user_id in [record.user_low.clone(), record.user_high.clone()] {
            let part = self.part(&user_id)?;
            if !part.matches.iter().any(|m| m.involves(&record.user_low, &record.user_high)) {
                part.matches.push(record.clone());
            }
        }
        Ok(())
    }

    async fn remove_match(&mut self, a: &str, b: &str) -> Result<bool, StoreError> {
        for user_id in [a, b] {
            if !self.held.contains_key(user_id) {
                return Err(StoreError::NotLocked(user_id.to_string()));
            }
        }
        let mut removed = false;
        for user_id in [a, b] {
            let part = self.part(user_id)?;
            let before = part.matches.len();
            part.matches.retain(|m| !m.involves(a, b));
            removed |= part.matches.len() != before;
        }
        Ok(removed)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        for (_, mut held) in self.held {
            *held.guard = held.working;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SwipeAction;

    #[tokio::test]
    async fn test_uncommitted_changes_are_discarded() {
        let store = InMemoryStore::new();
        {
            let mut txn = store.begin(&["u1"]).await.unwrap();
            txn.append_swipe(&SwipeRecord::new("u1", "c1", SwipeAction::Like, Utc::now()))
                .await
                .unwrap();
            // dropped without commit
        }
        assert!(store.snapshot("u1").await.ledger.is_empty());
    }

    #[tokio::test]
    async fn test_commit_publishes_changes() {
        let store = InMemoryStore::new();
        let mut txn = store.begin(&["u1"]).await.unwrap();
        txn.append_swipe(&SwipeRecord::new("u1", "c1", SwipeAction::Pass, Utc::now()))
            .await
            .unwrap();
        txn.commit().await.unwrap();
        assert_eq!(store.snapshot("u1").await.ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_balance_never_negative() {
        let store = InMemoryStore::new();
        let mut txn = store.begin(&["u1"]).await.unwrap();
        assert_eq!(txn.adjust_balance("u1", CreditKind::SuperLikes, 2).await.unwrap(), 2);
        assert_eq!(txn.adjust_balance("u1", CreditKind::SuperLikes, -2).await.unwrap(), 0);
        let err = txn.adjust_balance("u1", CreditKind::SuperLikes, -1).await.unwrap_err();
        assert!(matches!(err, StoreError::Invariant(_)));
    }

    #[tokio::test]
    async fn test_access_outside_held_partitions_rejected() {
        let store = InMemoryStore::new();
        let mut txn = store.begin(&["u1"]).await.unwrap();
        let err = txn.entitlement("u2").await.unwrap_err();
        assert!(matches!(err, StoreError::NotLocked(id) if id == "u2"));

        let err = txn
            .create_match(&MatchRecord::new("u1", "u2", Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotLocked(_)));
    }

    #[tokio::test]
    async fn test_duplicate_active_swipe_conflicts() {
        let store = InMemoryStore::new();
        let mut txn = store.begin(&["u1"]).await.unwrap();
        let first = SwipeRecord::new("u1", "c1", SwipeAction::Like, Utc::now());
        txn.append_swipe(&first).await.unwrap();
        let err = txn
            .append_swipe(&SwipeRecord::new("u1", "c1", SwipeAction::Pass, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        txn.retract_swipe("u1", first.id, Utc::now()).await.unwrap();
        txn.append_swipe(&SwipeRecord::new("u1", "c1", SwipeAction::Pass, Utc::now()))
            .await
            .unwrap();
    }
}
