use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashSet;

/// key: rate-limit-models -> periods, limits, counters, decisions
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    Hourly,
    Daily,
    Monthly,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Hourly => "hourly",
            PeriodType::Daily => "daily",
            PeriodType::Monthly => "monthly",
        }
    }

    /// Fixed evaluation/increment order the engine must never reorder.
    pub const ORDER: [PeriodType; 3] = [PeriodType::Hourly, PeriodType::Daily, PeriodType::Monthly];
}

impl std::fmt::Display for PeriodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An optional non-negative integer limit. `Unlimited` is a first-class
/// value distinct from `Bounded(0)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Limit {
    Unlimited,
    Bounded(u64),
}

impl Limit {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Limit::Unlimited)
    }

    pub fn as_bounded(&self) -> Option<u64> {
        match self {
            Limit::Unlimited => None,
            Limit::Bounded(n) => Some(*n),
        }
    }
}

impl Serialize for Limit {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Limit::Unlimited => serializer.serialize_none(),
            Limit::Bounded(n) => serializer.serialize_some(n),
        }
    }
}

impl<'de> Deserialize<'de> for Limit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let opt = Option::<u64>::deserialize(deserializer)?;
        Ok(match opt {
            Some(n) => Limit::Bounded(n),
            None => Limit::Unlimited,
        })
    }
}

/// key: rate-limit-triple -> hourly/daily/monthly budgets for one tier
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RateLimits {
    pub hourly: Limit,
    pub daily: Limit,
    pub monthly: Limit,
}

impl RateLimits {
    pub fn unlimited() -> Self {
        Self {
            hourly: Limit::Unlimited,
            daily: Limit::Unlimited,
            monthly: Limit::Unlimited,
        }
    }

    pub fn get(&self, period: PeriodType) -> Limit {
        match period {
            PeriodType::Hourly => self.hourly,
            PeriodType::Daily => self.daily,
            PeriodType::Monthly => self.monthly,
        }
    }
}

/// key: rate-limit-entitlement-set -> caller's active entitlement names
#[derive(Clone, Debug)]
pub struct EntitlementSet(HashSet<String>);

impl EntitlementSet {
    pub fn new(names: impl IntoIterator<Item = String>) -> Self {
        let set: HashSet<String> = names.into_iter().collect();
        if set.is_empty() {
            Self(["none".to_string()].into_iter().collect())
        } else {
            Self(set)
        }
    }

    pub fn none() -> Self {
        Self::new(std::iter::empty())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// key: rate-limit-subscription-snapshot -> provider lookup result
#[derive(Clone, Debug)]
pub struct SubscriptionSnapshot {
    pub entitlements: EntitlementSet,
    pub subscription_started_at: Option<DateTime<Utc>>,
}

impl SubscriptionSnapshot {
    pub fn none_tier() -> Self {
        Self {
            entitlements: EntitlementSet::none(),
            subscription_started_at: None,
        }
    }
}

/// key: rate-limit-counter-row -> persisted per-user per-period counter
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CounterRow {
    pub id: uuid::Uuid,
    pub user_id: String,
    pub period_type: String,
    pub period_start: DateTime<Utc>,
    pub request_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// key: rate-limit-history-entry -> a rendered history row with bounds
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub request_count: i64,
}

/// key: rate-limit-remaining -> per-period headroom, absent iff unlimited
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RemainingQuotas {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hourly: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly: Option<u64>,
}

impl RemainingQuotas {
    pub fn set(&mut self, period: PeriodType, value: Option<u64>) {
        match period {
            PeriodType::Hourly => self.hourly = value,
            PeriodType::Daily => self.daily = value,
            PeriodType::Monthly => self.monthly = value,
        }
    }

    pub fn get(&self, period: PeriodType) -> Option<u64> {
        match period {
            PeriodType::Hourly => self.hourly,
            PeriodType::Daily => self.daily,
            PeriodType::Monthly => self.monthly,
        }
    }
}

/// key: rate-limit-admission-decision -> verdict returned for one request
#[derive(Debug, Clone, Serialize)]
pub struct AdmissionDecision {
    pub allowed: bool,
    #[serde(skip)]
    pub status_code: u16,
    pub remaining: RemainingQuotas,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exceeded_limit: Option<PeriodType>,
    pub limits: RateLimits,
}
