pub mod api;
pub mod engine;
pub mod entitlements;
pub mod middleware;
pub mod models;
pub mod period;
pub mod provider;
pub mod store;

pub use engine::RateLimitEngine;
pub use entitlements::{EntitlementResolver, RateLimitsConfig, RawRateLimitsConfig};
pub use middleware::{
    rate_limit_middleware, HeaderUserIdExtractor, NeverSkip, RateLimiterState, ShouldSkip,
    UserIdExtractor,
};
pub use models::{
    AdmissionDecision, CounterRow, EntitlementSet, HistoryEntry, Limit, PeriodType, RateLimits,
    RemainingQuotas, SubscriptionSnapshot,
};
pub use period::PeriodCalculator;
pub use provider::{HttpSubscriptionProvider, StaticSubscriptionProvider, SubscriptionProvider};
pub use store::{CounterStore, InMemoryCounterStore, PostgresCounterStore};
