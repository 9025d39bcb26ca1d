use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::models::{
    AdmissionDecision, HistoryEntry, Limit, PeriodType, RateLimits, RemainingQuotas,
};
use super::period::PeriodCalculator;
use super::store::CounterStore;
use crate::error::RateLimiterResult;

/// key: rate-limit-engine -> composes period calculator, limits, and the
/// counter store into an admission decision (spec §4.D)
#[derive(Clone)]
pub struct RateLimitEngine {
    store: Arc<dyn CounterStore>,
}

impl RateLimitEngine {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    /// Read-only twin of `check_and_increment`: evaluates admission
    /// without writing counters, for dry-run callers.
    pub async fn check_only(
        &self,
        user_id: &str,
        limits: RateLimits,
        subscription_started_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> RateLimiterResult<AdmissionDecision> {
        let starts = self.period_starts(subscription_started_at, now);
        let counts = self.read_counts(user_id, &starts).await?;
        Ok(self.evaluate(limits, &counts))
    }

    /// Checks admission against the three concurrent periods and, if
    /// admitted, increments the counters for every *bounded* period in
    /// parallel. Rejections never write. Checks run in the fixed
    /// `hourly → daily → monthly` order (spec §4.D, §9) and that order
    /// must never change.
    pub async fn check_and_increment(
        &self,
        user_id: &str,
        limits: RateLimits,
        subscription_started_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> RateLimiterResult<AdmissionDecision> {
        let starts = self.period_starts(subscription_started_at, now);
        let counts = self.read_counts(user_id, &starts).await?;
        let decision = self.evaluate(limits, &counts);

        if !decision.allowed {
            return Ok(decision);
        }

        let bounded_periods: Vec<PeriodType> = PeriodType::ORDER
            .into_iter()
            .filter(|period| !limits.get(*period).is_unlimited())
            .collect();

        let increments = bounded_periods.iter().map(|period| {
            self.store
                .increment_or_insert(user_id, *period, starts.get(*period), now)
        });
        let updated_counts = futures_util::future::try_join_all(increments).await?;

        let mut post_counts = counts;
        for (period, updated) in bounded_periods.into_iter().zip(updated_counts) {
            post_counts.set(period, updated);
        }

        let mut remaining = RemainingQuotas::default();
        for period in PeriodType::ORDER {
            remaining.set(period, remaining_after_increment(limits.get(period), post_counts.get(period)));
        }

        Ok(AdmissionDecision {
            allowed: true,
            status_code: 200,
            remaining,
            exceeded_limit: None,
            limits,
        })
    }

    /// `getHistory` from spec §4.D: most-recent-first window history with
    /// derived exclusive end bounds.
    pub async fn get_history(
        &self,
        user_id: &str,
        period_type: PeriodType,
        subscription_started_at: Option<DateTime<Utc>>,
        limit: i64,
    ) -> RateLimiterResult<Vec<HistoryEntry>> {
        let rows = self.store.history(user_id, period_type, limit).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let period_end = PeriodCalculator::period_end_for_start(
                    period_type,
                    subscription_started_at,
                    row.period_start,
                );
                HistoryEntry {
                    period_start: row.period_start,
                    period_end,
                    request_count: row.request_count,
                }
            })
            .collect())
    }

    fn period_starts(
        &self,
        subscription_started_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> PeriodStarts {
        PeriodStarts {
            hourly: PeriodCalculator::current_hour_start(now),
            daily: PeriodCalculator::current_day_start(now),
            monthly: PeriodCalculator::subscription_month_start(subscription_started_at, now),
        }
    }

    async fn read_counts(
        &self,
        user_id: &str,
        starts: &PeriodStarts,
    ) -> RateLimiterResult<PeriodCounts> {
        let (hourly, daily, monthly) = tokio::try_join!(
            self.store.get_count(user_id, PeriodType::Hourly, starts.hourly),
            self.store.get_count(user_id, PeriodType::Daily, starts.daily),
            self.store.get_count(user_id, PeriodType::Monthly, starts.monthly),
        )?;
        Ok(PeriodCounts {
            hourly,
            daily,
            monthly,
        })
    }

    /// Evaluates the fixed `hourly → daily → monthly` priority order from
    /// spec §4.D/§9 against pre-increment counts.
    fn evaluate(&self, limits: RateLimits, counts: &PeriodCounts) -> AdmissionDecision {
        for period in PeriodType::ORDER {
            if let Limit::Bounded(limit) = limits.get(period) {
                let count = counts.get(period) as u64;
                if count >= limit {
                    let mut remaining = RemainingQuotas::default();
                    for p in PeriodType::ORDER {
                        remaining.set(p, remaining_before_increment(limits.get(p), counts.get(p)));
                    }
                    return AdmissionDecision {
                        allowed: false,
                        status_code: 429,
                        remaining,
                        exceeded_limit: Some(period),
                        limits,
                    };
                }
            }
        }

        // All present limits satisfied; remaining is filled in by the
        // caller after incrementing (check_and_increment) or reflects
        // pre-increment headroom for a dry-run (check_only).
        let mut remaining = RemainingQuotas::default();
        for p in PeriodType::ORDER {
            remaining.set(p, remaining_before_increment(limits.get(p), counts.get(p)));
        }
        AdmissionDecision {
            allowed: true,
            status_code: 200,
            remaining,
            exceeded_limit: None,
            limits,
        }
    }
}

#[derive(Clone, Copy)]
struct PeriodStarts {
    hourly: DateTime<Utc>,
    daily: DateTime<Utc>,
    monthly: DateTime<Utc>,
}

impl PeriodStarts {
    fn get(&self, period: PeriodType) -> DateTime<Utc> {
        match period {
            PeriodType::Hourly => self.hourly,
            PeriodType::Daily => self.daily,
            PeriodType::Monthly => self.monthly,
        }
    }
}

#[derive(Clone, Copy)]
struct PeriodCounts {
    hourly: i64,
    daily: i64,
    monthly: i64,
}

impl PeriodCounts {
    fn get(&self, period: PeriodType) -> i64 {
        match period {
            PeriodType::Hourly => self.hourly,
            PeriodType::Daily => self.daily,
            PeriodType::Monthly => self.monthly,
        }
    }

    fn set(&mut self, period: PeriodType, value: i64) {
        match period {
            PeriodType::Hourly => self.hourly = value,
            PeriodType::Daily => self.daily = value,
            PeriodType::Monthly => self.monthly = value,
        }
    }
}

fn remaining_before_increment(limit: Limit, count: i64) -> Option<u64> {
    match limit {
        Limit::Unlimited => None,
        Limit::Bounded(limit) => Some(limit.saturating_sub(count.max(0) as u64)),
    }
}

fn remaining_after_increment(limit: Limit, count_after: i64) -> Option<u64> {
    match limit {
        Limit::Unlimited => None,
        Limit::Bounded(limit) => Some(limit.saturating_sub(count_after.max(0) as u64)),
    }
}
