use std::collections::HashMap;

use serde::Deserialize;

use super::models::{EntitlementSet, Limit, RateLimits};
use crate::error::RateLimiterError;

/// key: rate-limit-config -> entitlement name -> RateLimits mapping
///
/// Modeled as two fields rather than a single nullable map, per spec §9's
/// design note: the required `"none"` tier is a construction-time
/// invariant, not a runtime lookup that can silently miss.
#[derive(Clone, Debug)]
pub struct RateLimitsConfig {
    none: RateLimits,
    others: HashMap<String, RateLimits>,
}

impl RateLimitsConfig {
    pub fn new(none: RateLimits, others: HashMap<String, RateLimits>) -> Self {
        Self { none, others }
    }

    pub fn none_tier(&self) -> RateLimits {
        self.none
    }

    pub fn get(&self, entitlement: &str) -> Option<RateLimits> {
        if entitlement == "none" {
            Some(self.none)
        } else {
            self.others.get(entitlement).copied()
        }
    }
}

/// Raw, serde-friendly shape for configs loaded from JSON/env, where the
/// `"none"` key's presence can only be checked at runtime.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct RawRateLimitsConfig(HashMap<String, RateLimits>);

impl TryFrom<RawRateLimitsConfig> for RateLimitsConfig {
    type Error = RateLimiterError;

    fn try_from(mut raw: RawRateLimitsConfig) -> Result<Self, Self::Error> {
        let none = raw
            .0
            .remove("none")
            .ok_or(RateLimiterError::ConfigMissingNoneTier)?;
        Ok(RateLimitsConfig::new(none, raw.0))
    }
}

/// key: entitlement-resolver -> upper-bound join across active entitlements
pub struct EntitlementResolver;

impl EntitlementResolver {
    pub fn resolve(entitlements: &EntitlementSet, config: &RateLimitsConfig) -> RateLimits {
        if entitlements.is_empty() {
            return config.none_tier();
        }

        if entitlements.len() == 1 {
            let name = entitlements.names().next().expect("len checked above");
            return config.get(name).unwrap_or_else(|| config.none_tier());
        }

        let rows: Vec<RateLimits> = entitlements
            .names()
            .map(|name| config.get(name).unwrap_or_else(|| config.none_tier()))
            .collect();

        RateLimits {
            hourly: join_field(rows.iter().map(|r| r.hourly)),
            daily: join_field(rows.iter().map(|r| r.daily)),
            monthly: join_field(rows.iter().map(|r| r.monthly)),
        }
    }
}

fn join_field(values: impl Iterator<Item = Limit>) -> Limit {
    let mut max_bounded: Option<u64> = None;
    for value in values {
        match value {
            Limit::Unlimited => return Limit::Unlimited,
            Limit::Bounded(n) => {
                max_bounded = Some(max_bounded.map_or(n, |current| current.max(n)));
            }
        }
    }
    match max_bounded {
        Some(n) => Limit::Bounded(n),
        None => Limit::Unlimited,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(h: u64, d: u64, m: u64) -> RateLimits {
        RateLimits {
            hourly: Limit::Bounded(h),
            daily: Limit::Bounded(d),
            monthly: Limit::Bounded(m),
        }
    }

    fn config() -> RateLimitsConfig {
        let mut others = HashMap::new();
        others.insert("starter".to_string(), limits(10, 50, 500));
        others.insert(
            "pro".to_string(),
            RateLimits {
                hourly: Limit::Bounded(100),
                daily: Limit::Unlimited,
                monthly: Limit::Unlimited,
            },
        );
        RateLimitsConfig::new(limits(5, 20, 100), others)
    }

    #[test]
    fn empty_set_uses_none_tier() {
        let resolved = EntitlementResolver::resolve(&EntitlementSet::none(), &config());
        assert_eq!(resolved.hourly, Limit::Bounded(5));
    }

    #[test]
    fn unknown_single_entitlement_falls_back_to_none() {
        let set = EntitlementSet::new(["mystery".to_string()]);
        let resolved = EntitlementResolver::resolve(&set, &config());
        assert_eq!(resolved.hourly, Limit::Bounded(5));
        assert_eq!(resolved.monthly, Limit::Bounded(100));
    }

    #[test]
    fn multi_entitlement_upper_bound_join() {
        let set = EntitlementSet::new(["starter".to_string(), "pro".to_string()]);
        let resolved = EntitlementResolver::resolve(&set, &config());
        assert_eq!(resolved.hourly, Limit::Bounded(100));
        assert!(resolved.daily.is_unlimited());
        assert!(resolved.monthly.is_unlimited());
    }

    #[test]
    fn unknown_name_in_multi_set_falls_back_to_none_before_joining() {
        let set = EntitlementSet::new(["starter".to_string(), "mystery".to_string()]);
        let resolved = EntitlementResolver::resolve(&set, &config());
        // join(starter.hourly=10, none.hourly=5) = 10
        assert_eq!(resolved.hourly, Limit::Bounded(10));
        // join(starter.daily=50, none.daily=20) = 50
        assert_eq!(resolved.daily, Limit::Bounded(50));
    }

    #[test]
    fn missing_none_key_is_config_error() {
        let raw = RawRateLimitsConfig(HashMap::new());
        let result = RateLimitsConfig::try_from(raw);
        assert!(matches!(
            result,
            Err(RateLimiterError::ConfigMissingNoneTier)
        ));
    }
}
