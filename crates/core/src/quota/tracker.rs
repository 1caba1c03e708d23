//! Usage counter reads and writes.
//!
//! `check_usage` and `record_usage` are the two-call pattern the recording
//! pipeline needs (check before the external call, record after the resource
//! is consumed); the two calls together are not atomic, so concurrent
//! requests from one user can overshoot a limit by at most one unit of work.
//! `check_and_record` is the single-statement variant for callers that treat
//! check+increment as one step.

use super::{TierResolver, UsageDecision, UsageDimension, next_utc_midnight};
use crate::Error;
use crate::store::StoreDb;
use chrono::Utc;
use std::sync::Arc;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Current UTC day key, `YYYY-MM-DD`.
fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Per-user, per-day usage tracker over the durable store.
#[derive(Clone)]
pub struct QuotaTracker {
    db: StoreDb,
    tiers: Arc<dyn TierResolver>,
}

impl QuotaTracker {
    pub fn new(db: StoreDb, tiers: Arc<dyn TierResolver>) -> Self {
        Self { db, tiers }
    }

    /// Read-only check of one meter against the user's tier limit.
    ///
    /// `amount` is the work about to be performed: seconds for the
    /// continuous meter, call count (usually 1) for the discrete ones.
    pub async fn check_usage(
        &self, user_id: &str, dimension: UsageDimension, amount: f64,
    ) -> Result<UsageDecision, Error> {
        let tier = self.tiers.resolve(user_id).await?;
        let limit = tier.limit(dimension);
        let used = self.current_usage(user_id, dimension).await?;

        Ok(UsageDecision { allowed: used + amount <= limit, used, limit, resets_at: next_utc_midnight() })
    }

    /// Add `amount` to one meter, creating the day's row if absent.
    pub async fn record_usage(
        &self, user_id: &str, dimension: UsageDimension, amount: f64,
    ) -> Result<(), Error> {
        let user_id = user_id.to_string();
        let day = today();
        let column = dimension.column();
        let sql = format!(
            "INSERT INTO usage_counters (user_id, day, {column}) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id, day) DO UPDATE SET {column} = {column} + excluded.{column}"
        );

        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                if dimension.is_discrete() {
                    conn.execute(&sql, params![user_id, day, amount as i64])?;
                } else {
                    conn.execute(&sql, params![user_id, day, amount])?;
                }
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Atomic check-and-increment in one conditional statement.
    ///
    /// Unlike the check_usage/record_usage pair, this cannot overshoot under
    /// concurrency: the increment only applies while it keeps the meter at or
    /// under the limit.
    pub async fn check_and_record(
        &self, user_id: &str, dimension: UsageDimension, amount: f64,
    ) -> Result<UsageDecision, Error> {
        let tier = self.tiers.resolve(user_id).await?;
        let limit = tier.limit(dimension);

        let user_id = user_id.to_string();
        let day = today();
        let column = dimension.column();
        let update_sql = format!(
            "UPDATE usage_counters SET {column} = {column} + ?3
             WHERE user_id = ?1 AND day = ?2 AND {column} + ?3 <= ?4"
        );
        let read_sql =
            format!("SELECT {column} FROM usage_counters WHERE user_id = ?1 AND day = ?2");

        let (allowed, used) = self
            .db
            .conn
            .call(move |conn| -> Result<(bool, f64), Error> {
                let tx = conn.transaction()?;

                tx.execute(
                    "INSERT OR IGNORE INTO usage_counters (user_id, day) VALUES (?1, ?2)",
                    params![user_id, day],
                )?;

                let updated = if dimension.is_discrete() {
                    tx.execute(&update_sql, params![user_id, day, amount as i64, limit])?
                } else {
                    tx.execute(&update_sql, params![user_id, day, amount, limit])?
                };

                let used: f64 = tx.query_row(&read_sql, params![user_id, day], |row| row.get(0))?;

                tx.commit()?;
                Ok((updated == 1, used))
            })
            .await
            .map_err(Error::from)?;

        Ok(UsageDecision { allowed, used, limit, resets_at: next_utc_midnight() })
    }

    async fn current_usage(&self, user_id: &str, dimension: UsageDimension) -> Result<f64, Error> {
        let user_id = user_id.to_string();
        let day = today();
        let sql =
            format!("SELECT {} FROM usage_counters WHERE user_id = ?1 AND day = ?2", dimension.column());

        self.db
            .conn
            .call(move |conn| -> Result<f64, Error> {
                let result = conn.query_row(&sql, params![user_id, day], |row| row.get::<_, f64>(0));

                match result {
                    Ok(used) => Ok(used),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0.0),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::StaticTierResolver;

    async fn tracker() -> QuotaTracker {
        let db = StoreDb::open_in_memory().await.unwrap();
        QuotaTracker::new(db, Arc::new(StaticTierResolver::default()))
    }

    async fn tracker_with_supporter(user_id: &str) -> QuotaTracker {
        let db = StoreDb::open_in_memory().await.unwrap();
        QuotaTracker::new(db, Arc::new(StaticTierResolver::new([user_id.to_string()])))
    }

    #[tokio::test]
    async fn test_zero_usage_on_fresh_day() {
        let quota = tracker().await;
        let decision = quota.check_usage("u1", UsageDimension::TranscribeSeconds, 200.0).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.used, 0.0);
        assert_eq!(decision.limit, 300.0);
    }

    #[tokio::test]
    async fn test_record_usage_is_additive() {
        let quota = tracker().await;
        quota.record_usage("u1", UsageDimension::TranscribeSeconds, 120.0).await.unwrap();
        quota.record_usage("u1", UsageDimension::TranscribeSeconds, 90.0).await.unwrap();

        let decision = quota.check_usage("u1", UsageDimension::TranscribeSeconds, 0.0).await.unwrap();
        assert_eq!(decision.used, 210.0);
    }

    #[tokio::test]
    async fn test_check_usage_includes_pending_amount() {
        let quota = tracker().await;
        quota.record_usage("u1", UsageDimension::TranscribeSeconds, 200.0).await.unwrap();

        // 200 + 150 > 300: the pending amount itself trips the limit
        let decision = quota.check_usage("u1", UsageDimension::TranscribeSeconds, 150.0).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.used, 200.0);
        assert_eq!(decision.limit, 300.0);

        let decision = quota.check_usage("u1", UsageDimension::TranscribeSeconds, 100.0).await.unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_discrete_meter_pre_check() {
        let quota = tracker().await;
        for _ in 0..20 {
            quota.record_usage("u1", UsageDimension::EvaluateCount, 1.0).await.unwrap();
        }

        let decision = quota.check_usage("u1", UsageDimension::EvaluateCount, 1.0).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.used, 20.0);
        assert_eq!(decision.limit, 20.0);
    }

    #[tokio::test]
    async fn test_meters_are_independent() {
        let quota = tracker().await;
        quota.record_usage("u1", UsageDimension::TranscribeSeconds, 300.0).await.unwrap();

        let decision = quota.check_usage("u1", UsageDimension::EvaluateCount, 1.0).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.used, 0.0);
    }

    #[tokio::test]
    async fn test_users_are_independent() {
        let quota = tracker().await;
        quota.record_usage("u1", UsageDimension::BibleFetchCount, 100.0).await.unwrap();

        let decision = quota.check_usage("u2", UsageDimension::BibleFetchCount, 1.0).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.used, 0.0);
    }

    #[tokio::test]
    async fn test_supporter_limits_apply() {
        let quota = tracker_with_supporter("vip").await;
        quota.record_usage("vip", UsageDimension::TranscribeSeconds, 500.0).await.unwrap();

        let decision = quota.check_usage("vip", UsageDimension::TranscribeSeconds, 100.0).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.limit, 3600.0);
    }

    // check_and_record is the strengthened single-statement variant: the
    // separated check_usage/record_usage pair can overshoot the limit by one
    // unit under concurrency, this one cannot.
    #[tokio::test]
    async fn test_check_and_record_stops_exactly_at_limit() {
        let quota = tracker().await;

        for n in 1..=100 {
            let decision = quota.check_and_record("u1", UsageDimension::BibleFetchCount, 1.0).await.unwrap();
            assert!(decision.allowed, "fetch {n} should be allowed");
        }

        let decision = quota.check_and_record("u1", UsageDimension::BibleFetchCount, 1.0).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.used, 100.0);
        assert_eq!(decision.limit, 100.0);
    }

    #[tokio::test]
    async fn test_check_and_record_rejection_leaves_counter_unchanged() {
        let quota = tracker().await;
        quota.record_usage("u1", UsageDimension::TranscribeSeconds, 290.0).await.unwrap();

        let decision = quota.check_and_record("u1", UsageDimension::TranscribeSeconds, 20.0).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.used, 290.0);

        let decision = quota.check_and_record("u1", UsageDimension::TranscribeSeconds, 10.0).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.used, 300.0);
    }

    #[tokio::test]
    async fn test_resets_at_is_next_utc_midnight() {
        let quota = tracker().await;
        let decision = quota.check_usage("u1", UsageDimension::EvaluateCount, 1.0).await.unwrap();
        assert_eq!(decision.resets_at.time(), chrono::NaiveTime::MIN);
        assert!(decision.resets_at > Utc::now());
    }
}
