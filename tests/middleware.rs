use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{body::Body, http::Request, middleware, routing::get, Extension, Router};
use tower::ServiceExt;

use tiered_rate_limiter::error::RateLimiterError;
use tiered_rate_limiter::rate_limit::{
    rate_limit_middleware, EntitlementSet, HeaderUserIdExtractor, InMemoryCounterStore, Limit,
    NeverSkip, RateLimitEngine, RateLimiterState, RateLimits, RateLimitsConfig,
    StaticSubscriptionProvider, SubscriptionProvider, SubscriptionSnapshot,
};

/// A provider that always fails the lookup, for exercising the
/// fall-through-to-"none" path the middleware takes on a transport or
/// timeout error (spec §5/§7, scenario S5).
struct FailingSubscriptionProvider;

#[async_trait]
impl SubscriptionProvider for FailingSubscriptionProvider {
    async fn lookup(&self, _user_id: &str) -> Result<SubscriptionSnapshot, RateLimiterError> {
        Err(RateLimiterError::ProviderLookup(
            "simulated provider timeout".to_string(),
        ))
    }
}

fn test_app(snapshot: SubscriptionSnapshot) -> Router {
    test_app_with_limits(
        snapshot,
        RateLimits {
            hourly: Limit::Bounded(1),
            daily: Limit::Bounded(10),
            monthly: Limit::Bounded(100),
        },
    )
}

fn test_app_with_limits(snapshot: SubscriptionSnapshot, none_tier: RateLimits) -> Router {
    test_app_with_provider(
        Arc::new(StaticSubscriptionProvider::new(snapshot)),
        none_tier,
    )
}

fn test_app_with_provider(
    provider: Arc<dyn SubscriptionProvider>,
    none_tier: RateLimits,
) -> Router {
    let config = RateLimitsConfig::new(none_tier, HashMap::new());
    let engine = RateLimitEngine::new(Arc::new(InMemoryCounterStore::new()));
    let state = Arc::new(RateLimiterState {
        config: Arc::new(config),
        provider,
        engine,
        user_id_extractor: Arc::new(HeaderUserIdExtractor {
            header_name: "x-user-id".to_string(),
        }),
        should_skip: Arc::new(NeverSkip),
    });

    Router::new()
        .route("/ping", get(|| async { "pong" }))
        .layer(middleware::from_fn(rate_limit_middleware))
        .layer(Extension(state))
}

fn request(user: &str) -> Request<Body> {
    Request::builder()
        .uri("/ping")
        .header("x-user-id", user)
        .body(Body::empty())
        .unwrap()
}

// key: middleware-contract -> admits first request, sets headers, then 429s
#[tokio::test]
async fn admits_first_request_then_rejects_second() {
    let app = test_app(SubscriptionSnapshot::none_tier());

    let first = app.clone().oneshot(request("alice")).await.unwrap();
    assert_eq!(first.status(), axum::http::StatusCode::OK);
    assert_eq!(
        first
            .headers()
            .get("x-ratelimit-hourly-remaining")
            .unwrap(),
        "0"
    );

    let second = app.clone().oneshot(request("alice")).await.unwrap();
    assert_eq!(second.status(), axum::http::StatusCode::TOO_MANY_REQUESTS);

    let body = hyper::body::to_bytes(second.into_body()).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["exceededLimit"], "hourly");
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn different_users_have_independent_budgets() {
    let app = test_app(SubscriptionSnapshot::none_tier());

    let alice = app.clone().oneshot(request("alice")).await.unwrap();
    assert_eq!(alice.status(), axum::http::StatusCode::OK);

    let bob = app.clone().oneshot(request("bob")).await.unwrap();
    assert_eq!(bob.status(), axum::http::StatusCode::OK);
}

#[tokio::test]
async fn unlimited_tier_never_gets_429() {
    let snapshot = SubscriptionSnapshot {
        entitlements: EntitlementSet::new(["none".to_string()]),
        subscription_started_at: None,
    };
    let app = test_app_with_limits(snapshot, RateLimits::unlimited());

    for _ in 0..5 {
        let response = app.clone().oneshot(request("carol")).await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        assert!(response
            .headers()
            .get("x-ratelimit-hourly-remaining")
            .is_none());
    }
}

// S5 — provider lookup failure falls through to the "none" tier rather
// than rejecting or erroring out the request.
#[tokio::test]
async fn provider_failure_falls_back_to_none_tier_and_still_admits() {
    let app = test_app_with_provider(
        Arc::new(FailingSubscriptionProvider),
        RateLimits {
            hourly: Limit::Bounded(1),
            daily: Limit::Bounded(10),
            monthly: Limit::Bounded(100),
        },
    );

    let first = app.clone().oneshot(request("dana")).await.unwrap();
    assert_eq!(first.status(), axum::http::StatusCode::OK);
    assert_eq!(
        first.headers().get("x-ratelimit-hourly-remaining").unwrap(),
        "0"
    );

    let second = app.clone().oneshot(request("dana")).await.unwrap();
    assert_eq!(second.status(), axum::http::StatusCode::TOO_MANY_REQUESTS);
}
