use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::models::{EntitlementSet, SubscriptionSnapshot};
use crate::error::RateLimiterError;

/// key: subscription-provider -> external collaborator contract (spec §4.E)
///
/// `lookup` never treats "user unknown to the provider" as an error — it
/// returns the `{"none"}` snapshot. Only transport/5xx failures surface
/// as `Err`; the engine itself never retries (spec §7).
#[async_trait]
pub trait SubscriptionProvider: Send + Sync {
    async fn lookup(&self, user_id: &str) -> Result<SubscriptionSnapshot, RateLimiterError>;
}

/// key: subscription-provider-static -> entitlements supplied at construction
///
/// Used in tests and by deployments that resolve entitlements from a JWT
/// claim rather than a remote call.
pub struct StaticSubscriptionProvider {
    snapshot: SubscriptionSnapshot,
}

impl StaticSubscriptionProvider {
    pub fn new(snapshot: SubscriptionSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn none_tier() -> Self {
        Self::new(SubscriptionSnapshot::none_tier())
    }
}

#[async_trait]
impl SubscriptionProvider for StaticSubscriptionProvider {
    async fn lookup(&self, _user_id: &str) -> Result<SubscriptionSnapshot, RateLimiterError> {
        Ok(self.snapshot.clone())
    }
}

/// key: subscription-provider-http -> real provider client
///
/// A thin `reqwest` client calling a configurable base URL, in the
/// manner of the teacher's adapter-trait + concrete-client pairing. The
/// provider is expected to return active entitlements only; this client
/// additionally applies the sandbox-filtering rule from spec §4.E unless
/// `test_mode` is set, and derives `subscriptionStartedAt` as the
/// earliest `purchase_date` among the surviving entries.
///
/// A request that exceeds `timeout` surfaces as a transport error from
/// `lookup`, which the middleware shell treats like any other lookup
/// failure and falls through to the `"none"` tier (spec §5/§7).
pub struct HttpSubscriptionProvider {
    client: reqwest::Client,
    base_url: String,
    test_mode: bool,
}

impl HttpSubscriptionProvider {
    pub fn new(base_url: impl Into<String>, test_mode: bool, timeout_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .expect("reqwest client builder with a fixed timeout never fails");
        Self {
            client,
            base_url: base_url.into(),
            test_mode,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProviderEntitlementEntry {
    name: String,
    purchase_date: DateTime<Utc>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    sandbox: bool,
}

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    #[serde(default)]
    entitlements: Vec<ProviderEntitlementEntry>,
}

impl HttpSubscriptionProvider {
    fn active(&self, entry: &ProviderEntitlementEntry, now: DateTime<Utc>) -> bool {
        let not_expired = entry.expires_at.map(|exp| exp > now).unwrap_or(true);
        let sandbox_ok = !entry.sandbox || self.test_mode;
        not_expired && sandbox_ok
    }
}

#[async_trait]
impl SubscriptionProvider for HttpSubscriptionProvider {
    async fn lookup(&self, user_id: &str) -> Result<SubscriptionSnapshot, RateLimiterError> {
        let url = format!("{}/users/{}/subscription", self.base_url, user_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| RateLimiterError::ProviderLookup(err.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            // User unknown to the provider — not an error (spec §4.E).
            return Ok(SubscriptionSnapshot::none_tier());
        }

        let response = response
            .error_for_status()
            .map_err(|err| RateLimiterError::ProviderLookup(err.to_string()))?;

        let payload: ProviderResponse = response
            .json()
            .await
            .map_err(|err| RateLimiterError::ProviderLookup(err.to_string()))?;

        let now = Utc::now();
        let active: Vec<&ProviderEntitlementEntry> = payload
            .entitlements
            .iter()
            .filter(|entry| self.active(entry, now))
            .collect();

        if active.is_empty() {
            return Ok(SubscriptionSnapshot::none_tier());
        }

        let subscription_started_at = active.iter().map(|entry| entry.purchase_date).min();
        let entitlements = EntitlementSet::new(active.iter().map(|entry| entry.name.clone()));

        Ok(SubscriptionSnapshot {
            entitlements,
            subscription_started_at,
        })
    }
}
