use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{request::Parts, HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;

use super::entitlements::{EntitlementResolver, RateLimitsConfig};
use super::engine::RateLimitEngine;
use super::models::{RemainingQuotas, SubscriptionSnapshot};
use super::provider::SubscriptionProvider;
use crate::error::rate_limit_exceeded_response;

/// key: user-id-extractor -> caller-supplied `getUserId` hook (spec §4.F)
pub trait UserIdExtractor: Send + Sync {
    fn extract(&self, parts: &Parts) -> Option<String>;
}

/// Default extractor: reads a configurable header. Deployments that
/// authenticate via JWT typically supply their own extractor that reuses
/// the application's `AuthUser` extraction path instead.
pub struct HeaderUserIdExtractor {
    pub header_name: String,
}

impl UserIdExtractor for HeaderUserIdExtractor {
    fn extract(&self, parts: &Parts) -> Option<String> {
        parts
            .headers
            .get(&self.header_name)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string())
    }
}

/// key: should-skip -> caller-supplied admin/bypass hook (spec §4.F step 1)
pub trait ShouldSkip: Send + Sync {
    fn should_skip(&self, parts: &Parts) -> bool;
}

pub struct NeverSkip;

impl ShouldSkip for NeverSkip {
    fn should_skip(&self, _parts: &Parts) -> bool {
        false
    }
}

/// key: rate-limiter-state -> bundles the pieces the middleware composes
pub struct RateLimiterState {
    pub config: Arc<RateLimitsConfig>,
    pub provider: Arc<dyn SubscriptionProvider>,
    pub engine: RateLimitEngine,
    pub user_id_extractor: Arc<dyn UserIdExtractor>,
    pub should_skip: Arc<dyn ShouldSkip>,
}

/// key: rate-limit-middleware -> the seven-step shell from spec §4.F
pub async fn rate_limit_middleware<B>(
    Extension(state): Extension<Arc<RateLimiterState>>,
    request: Request<B>,
    next: Next<B>,
) -> Response
where
    B: Send,
{
    let (parts, body) = request.into_parts();

    if state.should_skip.should_skip(&parts) {
        let request = Request::from_parts(parts, body);
        return next.run(request).await;
    }

    let user_id = state
        .user_id_extractor
        .extract(&parts)
        .unwrap_or_else(|| "anonymous".to_string());

    let now = Utc::now();
    let snapshot = match state.provider.lookup(&user_id).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            tracing::warn!(
                %user_id,
                error = %err,
                "subscription provider lookup failed; falling back to \"none\" tier"
            );
            SubscriptionSnapshot::none_tier()
        }
    };

    let limits = EntitlementResolver::resolve(&snapshot.entitlements, &state.config);

    let decision = match state
        .engine
        .check_and_increment(&user_id, limits, snapshot.subscription_started_at, now)
        .await
    {
        Ok(decision) => decision,
        Err(err) => return err.into_response(),
    };

    if !decision.allowed {
        tracing::debug!(%user_id, exceeded = ?decision.exceeded_limit, "rate limit exceeded");
        let exceeded = decision
            .exceeded_limit
            .expect("a rejection always names the period it exceeded");
        return rate_limit_exceeded_response(decision.remaining, exceeded);
    }

    let request = Request::from_parts(parts, body);
    let mut response = next.run(request).await;
    apply_rate_limit_headers(response.headers_mut(), &decision.remaining);
    response
}

fn apply_rate_limit_headers(headers: &mut HeaderMap, remaining: &RemainingQuotas) {
    if let Some(value) = remaining.hourly {
        headers.insert(
            "x-ratelimit-hourly-remaining",
            HeaderValue::from_str(&value.to_string()).expect("digits are valid header values"),
        );
    }
    if let Some(value) = remaining.daily {
        headers.insert(
            "x-ratelimit-daily-remaining",
            HeaderValue::from_str(&value.to_string()).expect("digits are valid header values"),
        );
    }
    if let Some(value) = remaining.monthly {
        headers.insert(
            "x-ratelimit-monthly-remaining",
            HeaderValue::from_str(&value.to_string()).expect("digits are valid header values"),
        );
    }
}
