use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::models::{CounterRow, PeriodType};
use crate::error::RateLimiterResult;

/// key: counter-store -> §4.C persistence contract
///
/// `get_count` never fails on absence (returns 0). `increment_or_insert`
/// must be safe under concurrent callers for the same key; the unique
/// index on `(user_id, period_type, period_start)` is what makes that
/// true regardless of which implementation backs the trait.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn get_count(
        &self,
        user_id: &str,
        period_type: PeriodType,
        period_start: DateTime<Utc>,
    ) -> RateLimiterResult<i64>;

    async fn increment_or_insert(
        &self,
        user_id: &str,
        period_type: PeriodType,
        period_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> RateLimiterResult<i64>;

    async fn history(
        &self,
        user_id: &str,
        period_type: PeriodType,
        limit: i64,
    ) -> RateLimiterResult<Vec<CounterRow>>;
}

/// key: counter-store-postgres -> `rate_limit_counters` table
#[derive(Clone)]
pub struct PostgresCounterStore {
    pool: PgPool,
}

impl PostgresCounterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CounterStore for PostgresCounterStore {
    async fn get_count(
        &self,
        user_id: &str,
        period_type: PeriodType,
        period_start: DateTime<Utc>,
    ) -> RateLimiterResult<i64> {
        let count: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT request_count FROM rate_limit_counters
            WHERE user_id = $1 AND period_type = $2 AND period_start = $3
            "#,
        )
        .bind(user_id)
        .bind(period_type.as_str())
        .bind(period_start)
        .fetch_optional(&self.pool)
        .await?;

        Ok(count.unwrap_or(0))
    }

    async fn increment_or_insert(
        &self,
        user_id: &str,
        period_type: PeriodType,
        period_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> RateLimiterResult<i64> {
        // Atomic upsert: associative under concurrent callers for the same
        // key, eliminating the lost-update race a read-then-write pair
        // would be exposed to (spec §5, §9).
        let count: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO rate_limit_counters
                (id, user_id, period_type, period_start, request_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 1, $5, $5)
            ON CONFLICT (user_id, period_type, period_start)
            DO UPDATE SET
                request_count = rate_limit_counters.request_count + 1,
                updated_at = EXCLUDED.updated_at
            RETURNING request_count
            "#,
        )
        .bind(uuid::Uuid::new_v4())
        .bind(user_id)
        .bind(period_type.as_str())
        .bind(period_start)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn history(
        &self,
        user_id: &str,
        period_type: PeriodType,
        limit: i64,
    ) -> RateLimiterResult<Vec<CounterRow>> {
        let rows = sqlx::query_as::<_, CounterRow>(
            r#"
            SELECT * FROM rate_limit_counters
            WHERE user_id = $1 AND period_type = $2
            ORDER BY period_start DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(period_type.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

/// key: counter-store-inmemory -> deterministic test double
///
/// Mirrors `PostgresCounterStore`'s upsert semantics under a mutex so
/// engine-level concurrency tests can run without a live Postgres.
#[derive(Default)]
pub struct InMemoryCounterStore {
    rows: Mutex<HashMap<(String, PeriodType, DateTime<Utc>), CounterRow>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get_count(
        &self,
        user_id: &str,
        period_type: PeriodType,
        period_start: DateTime<Utc>,
    ) -> RateLimiterResult<i64> {
        let rows = self.rows.lock().expect("lock poisoned");
        let key = (user_id.to_string(), period_type, period_start);
        Ok(rows.get(&key).map(|row| row.request_count).unwrap_or(0))
    }

    async fn increment_or_insert(
        &self,
        user_id: &str,
        period_type: PeriodType,
        period_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> RateLimiterResult<i64> {
        let mut rows = self.rows.lock().expect("lock poisoned");
        let key = (user_id.to_string(), period_type, period_start);
        let row = rows.entry(key).or_insert_with(|| CounterRow {
            id: uuid::Uuid::new_v4(),
            user_id: user_id.to_string(),
            period_type: period_type.as_str().to_string(),
            period_start,
            request_count: 0,
            created_at: now,
            updated_at: now,
        });
        row.request_count += 1;
        row.updated_at = now;
        Ok(row.request_count)
    }

    async fn history(
        &self,
        user_id: &str,
        period_type: PeriodType,
        limit: i64,
    ) -> RateLimiterResult<Vec<CounterRow>> {
        let rows = self.rows.lock().expect("lock poisoned");
        let mut matching: Vec<CounterRow> = rows
            .values()
            .filter(|row| row.user_id == user_id && row.period_type == period_type.as_str())
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.period_start.cmp(&a.period_start));
        matching.truncate(limit.max(0) as usize);
        Ok(matching)
    }
}
