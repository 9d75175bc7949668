use crate::models::{
    CounterKind, CreditKind, EntitlementRecord, FeatureFlags, LifetimeStats, MatchRecord,
    SubscriptionTier, SwipeAction, SwipeRecord, UsageCounter,
};
use crate::services::store::{lock_order, StoreError, SwipeStore, SwipeTxn};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use uuid::Uuid;

/// PostgreSQL-backed swipe ledger.
///
/// Each unit of work is one database transaction that first takes row locks
/// on `swipe_accounts` for every involved user, in user-id order.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new store from a connection string and run migrations
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new store from settings
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
        idle_timeout_secs: Option<u64>,
    ) -> Result<Self, StoreError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            Duration::from_secs(acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }

    /// Upsert the subscription part of an entitlement record.
    ///
    /// This is the billing source's write path; balances are left alone.
    pub async fn put_subscription(
        &self,
        user_id: &str,
        record: &EntitlementRecord,
    ) -> Result<(), StoreError> {
        let flags = serde_json::to_value(record.flags)
            .map_err(|e| StoreError::Invariant(format!("flags not serializable: {}", e)))?;
        let mut tx = self.pool.begin().await?;
        ensure_account(&mut tx, user_id).await?;
        sqlx::query(
            r#"
            INSERT INTO user_entitlements (user_id, tier, active, expires_at, flags)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id)
            DO UPDATE SET
                tier = EXCLUDED.tier,
                active = EXCLUDED.active,
                expires_at = EXCLUDED.expires_at,
                flags = EXCLUDED.flags
            "#,
        )
        .bind(user_id)
        .bind(record.tier.as_str())
        .bind(record.active)
        .bind(record.expires_at)
        .bind(flags)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::debug!("Stored subscription for {}: {}", user_id, record.tier.as_str());
        Ok(())
    }

    /// Health check for the database connection
    pub async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}

async fn ensure_account(
    tx: &mut Transaction<'static, Postgres>,
    user_id: &str,
) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO swipe_accounts (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[async_trait]
impl SwipeStore for PostgresStore {
    async fn begin(&self, user_ids: &[&str]) -> Result<Box<dyn SwipeTxn>, StoreError> {
        let ids = lock_order(user_ids);
        let mut tx = self.pool.begin().await?;

        for id in &ids {
            ensure_account(&mut tx, id).await?;
        }
        sqlx::query(
            r#"
            SELECT user_id FROM swipe_accounts
            WHERE user_id = ANY($1)
            ORDER BY user_id
            FOR UPDATE
            "#,
        )
        .bind(ids.as_slice())
        .fetch_all(&mut *tx)
        .await?;

        Ok(Box::new(PostgresTxn {
            id: Uuid::new_v4(),
            tx,
            locked: ids.into_iter().collect(),
        }))
    }
}

struct PostgresTxn {
    id: Uuid,
    tx: Transaction<'static, Postgres>,
    locked: HashSet<String>,
}

impl PostgresTxn {
    fn ensure_locked(&self, user_id: &str) -> Result<(), StoreError> {
        if self.locked.contains(user_id) {
            Ok(())
        } else {
            Err(StoreError::NotLocked(user_id.to_string()))
        }
    }
}

const SWIPE_COLUMNS: &str = "id, user_id, candidate_id, action, created_at, matched, retracted_at";

fn swipe_from_row(row: &PgRow) -> Result<SwipeRecord, StoreError> {
    let action: String = row.try_get("action")?;
    let action = action
        .parse::<SwipeAction>()
        .map_err(|e| StoreError::Invariant(format!("unknown action in ledger: {}", e.0)))?;

    Ok(SwipeRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        candidate_id: row.try_get("candidate_id")?,
        action,
        created_at: row.try_get("created_at")?,
        matched: row.try_get("matched")?,
        retracted_at: row.try_get("retracted_at")?,
    })
}

/// Billing-owned columns; unreadable values are refused rather than read as a downgrade
fn subscription_fields(
    user_id: &str,
    tier: &str,
    flags: serde_json::Value,
) -> Result<(SubscriptionTier, FeatureFlags), StoreError> {
    let parsed_tier = SubscriptionTier::parse(tier).ok_or_else(|| {
        tracing::warn!("Unknown subscription tier '{}' stored for {}", tier, user_id);
        StoreError::Invariant(format!("unknown tier '{}' for {}", tier, user_id))
    })?;
    let parsed_flags = serde_json::from_value::<FeatureFlags>(flags).map_err(|e| {
        tracing::warn!("Malformed feature flags stored for {}: {}", user_id, e);
        StoreError::Invariant(format!("malformed flags for {}: {}", user_id, e))
    })?;
    Ok((parsed_tier, parsed_flags))
}

fn to_u32(value: i64, what: &str) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::Invariant(format!("{} out of range: {}", what, value)))
}

#[async_trait]
impl SwipeTxn for PostgresTxn {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn entitlement(&mut self, user_id: &str) -> Result<EntitlementRecord, StoreError> {
        self.ensure_locked(user_id)?;

        let row = sqlx::query(
            "SELECT tier, active, expires_at, flags FROM user_entitlements WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        let mut record = match row {
            Some(row) => {
                let tier: String = row.try_get("tier")?;
                let (tier, flags) = subscription_fields(user_id, &tier, row.try_get("flags")?)?;
                EntitlementRecord {
                    tier,
                    active: row.try_get("active")?,
                    expires_at: row.try_get("expires_at")?,
                    flags,
                    balances: HashMap::new(),
                }
            }
            None => EntitlementRecord::default(),
        };

        let balances = sqlx::query("SELECT credit, balance FROM credit_balances WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&mut *self.tx)
            .await?;
        for row in balances {
            let credit: String = row.try_get("credit")?;
            match CreditKind::parse(&credit) {
                Some(kind) => {
                    record.balances.insert(kind, to_u32(row.try_get("balance")?, "balance")?);
                }
                None => tracing::warn!("Ignoring unknown credit '{}' for {}", credit, user_id),
            }
        }

        Ok(record)
    }

    async fn adjust_balance(
        &mut self,
        user_id: &str,
        credit: CreditKind,
        delta: i64,
    ) -> Result<u32, StoreError> {
        self.ensure_locked(user_id)?;

        let current: i64 = sqlx::query(
            "SELECT balance FROM credit_balances WHERE user_id = $1 AND credit = $2",
        )
        .bind(user_id)
        .bind(credit.as_str())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(|row| row.try_get("balance"))
        .transpose()?
            .unwrap_or(0);

        let next = current + delta;
        if next < 0 {
            return Err(StoreError::Invariant(format!(
                "{} balance of {} would become {}",
                credit.as_str(),
                user_id,
                next
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO credit_balances (user_id, credit, balance)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, credit)
            DO UPDATE SET balance = EXCLUDED.balance
            "#,
        )
        .bind(user_id)
        .bind(credit.as_str())
        .bind(next)
        .execute(&mut *self.tx)
        .await?;

        to_u32(next, "balance")
    }

    async fn counter(
        &mut self,
        user_id: &str,
        kind: CounterKind,
    ) -> Result<Option<UsageCounter>, StoreError> {
        self.ensure_locked(user_id)?;

        let row = sqlx::query(
            "SELECT used, period_start FROM usage_counters WHERE user_id = $1 AND kind = $2",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(Some(UsageCounter {
                kind,
                used: to_u32(row.try_get("used")?, "counter")?,
                period_start: row.try_get("period_start")?,
            })),
            None => Ok(None),
        }
    }

    async fn put_counter(
        &mut self,
        user_id: &str,
        counter: &UsageCounter,
    ) -> Result<(), StoreError> {
        self.ensure_locked(user_id)?;

        sqlx::query(
            r#"
            INSERT INTO usage_counters (user_id, kind, used, period_start)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, kind)
            DO UPDATE SET
                used = EXCLUDED.used,
                period_start = EXCLUDED.period_start
            "#,
        )
        .bind(user_id)
        .bind(counter.kind.as_str())
        .bind(i64::from(counter.used))
        .bind(counter.period_start)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn active_swipe(
        &mut self,
        user_id: &str,
        candidate_id: &str,
    ) -> Result<Option<SwipeRecord>, StoreError> {
        self.ensure_locked(user_id)?;

        let query = format!(
            "SELECT {} FROM swipe_records \
             WHERE user_id = $1 AND candidate_id = $2 AND retracted_at IS NULL",
            SWIPE_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(user_id)
            .bind(candidate_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.as_ref().map(swipe_from_row).transpose()
    }

    async fn latest_swipe(&mut self, user_id: &str) -> Result<Option<SwipeRecord>, StoreError> {
        self.ensure_locked(user_id)?;

        let query = format!(
            "SELECT {} FROM swipe_records WHERE user_id = $1 ORDER BY seq DESC LIMIT 1",
            SWIPE_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.as_ref().map(swipe_from_row).transpose()
    }

    async fn append_swipe(&mut self, record: &SwipeRecord) -> Result<(), StoreError> {
        self.ensure_locked(&record.user_id)?;

        let result = sqlx::query(
            r#"
            INSERT INTO swipe_records
                (id, user_id, candidate_id, action, created_at, matched, retracted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(&record.user_id)
        .bind(&record.candidate_id)
        .bind(record.action.as_str())
        .bind(record.created_at)
        .bind(record.matched)
        .bind(record.retracted_at)
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::Conflict(format!(
                    "active swipe exists for {} -> {}",
                    record.user_id, record.candidate_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn retract_swipe(
        &mut self,
        user_id: &str,
        swipe_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.ensure_locked(user_id)?;

        let result = sqlx::query(
            r#"
            UPDATE swipe_records SET retracted_at = $3
            WHERE user_id = $1 AND id = $2 AND retracted_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(swipe_id)
        .bind(at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("swipe {} not active", swipe_id)));
        }
        Ok(())
    }

    async fn stats(&mut self, user_id: &str) -> Result<LifetimeStats, StoreError> {
        self.ensure_locked(user_id)?;

        let row = sqlx::query(
            r#"
            SELECT swipes, likes, passes, super_likes, matches, rewinds
            FROM swipe_stats WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(LifetimeStats {
                swipes: row.try_get("swipes")?,
                likes: row.try_get("likes")?,
                passes: row.try_get("passes")?,
                super_likes: row.try_get("super_likes")?,
                matches: row.try_get("matches")?,
                rewinds: row.try_get("rewinds")?,
            }),
            None => Ok(LifetimeStats::default()),
        }
    }

    async fn adjust_stats(
        &mut self,
        user_id: &str,
        delta: &LifetimeStats,
    ) -> Result<(), StoreError> {
        self.ensure_locked(user_id)?;

        sqlx::query(
            r#"
            INSERT INTO swipe_stats (user_id, swipes, likes, passes, super_likes, matches, rewinds)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id)
            DO UPDATE SET
                swipes = swipe_stats.swipes + EXCLUDED.swipes,
                likes = swipe_stats.likes + EXCLUDED.likes,
                passes = swipe_stats.passes + EXCLUDED.passes,
                super_likes = swipe_stats.super_likes + EXCLUDED.super_likes,
                matches = swipe_stats.matches + EXCLUDED.matches,
                rewinds = swipe_stats.rewinds + EXCLUDED.rewinds
            "#,
        )
        .bind(user_id)
        .bind(delta.swipes)
        .bind(delta.likes)
        .bind(delta.passes)
        .bind(delta.super_likes)
        .bind(delta.matches)
        .bind(delta.rewinds)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn create_match(&mut self, record: &MatchRecord) -> Result<(), StoreError> {
        self.ensure_locked(&record.user_low)?;
        self.ensure_locked(&record.user_high)?;

        sqlx::query(
            r#"
            INSERT INTO user_matches (user_low, user_high, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_low, user_high) DO NOTHING
            "#,
        )
        .bind(&record.user_low)
        .bind(&record.user_high)
        .bind(record.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn remove_match(&mut self, a: &str, b: &str) -> Result<bool, StoreError> {
        self.ensure_locked(a)?;
        self.ensure_locked(b)?;

        let (low, high) = crate::models::domain::ordered_pair(a, b);
        let result = sqlx::query("DELETE FROM user_matches WHERE user_low = $1 AND user_high = $2")
            .bind(low)
            .bind(high)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_fields_refuse_corrupt_values() {
        let (tier, flags) =
            subscription_fields("u1", "gold", serde_json::json!({"unlimitedLikes": true})).unwrap();
        assert_eq!(tier, SubscriptionTier::Gold);
        assert!(flags.unlimited_likes);

        let err = subscription_fields("u1", "platinum", serde_json::json!({})).unwrap_err();
        assert!(matches!(err, StoreError::Invariant(_)));

        let err = subscription_fields("u1", "premium", serde_json::json!("not flags")).unwrap_err();
        assert!(matches!(err, StoreError::Invariant(_)));
    }

    #[tokio::test]
    #[ignore = "Requires PostgreSQL"]
    async fn test_unit_of_work_roundtrip() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let store = PostgresStore::from_settings(&url, Some(2), Some(1), None, None)
            .await
            .expect("Failed to connect");

        let user = format!("pg-user-{}", Uuid::new_v4());
        let candidate = format!("pg-cand-{}", Uuid::new_v4());

        let mut txn = store.begin(&[user.as_str(), candidate.as_str()]).await.unwrap();
        let record = SwipeRecord::new(&user, &candidate, SwipeAction::Like, Utc::now());
        txn.append_swipe(&record).await.unwrap();
        txn.commit().await.unwrap();

        let mut txn = store.begin(&[user.as_str()]).await.unwrap();
        let active = txn.active_swipe(&user, &candidate).await.unwrap();
        assert_eq!(active.map(|r| r.id), Some(record.id));
        let err = txn
            .append_swipe(&SwipeRecord::new(&user, &candidate, SwipeAction::Pass, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    #[ignore = "Requires PostgreSQL"]
    async fn test_subscription_write_keeps_balances() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let store = PostgresStore::from_settings(&url, Some(2), Some(1), None, None)
            .await
            .expect("Failed to connect");
        let user = format!("pg-sub-{}", Uuid::new_v4());

        let mut txn = store.begin(&[user.as_str()]).await.unwrap();
        assert_eq!(txn.adjust_balance(&user, CreditKind::Rewinds, 3).await.unwrap(), 3);
        txn.commit().await.unwrap();

        let record = EntitlementRecord::subscribed(SubscriptionTier::Gold, None);
        store.put_subscription(&user, &record).await.unwrap();

        let mut txn = store.begin(&[user.as_str()]).await.unwrap();
        let stored = txn.entitlement(&user).await.unwrap();
        assert_eq!(stored.tier, SubscriptionTier::Gold);
        assert!(stored.active);
        assert_eq!(stored.balances.get(&CreditKind::Rewinds).copied(), Some(3));
    }
}
