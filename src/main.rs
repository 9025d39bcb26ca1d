use std::net::SocketAddr;
use std::sync::Arc;

use axum::{middleware, Extension, Router};
use axum_prometheus::PrometheusMetricLayer;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{fmt, EnvFilter};

use tiered_rate_limiter::config;
use tiered_rate_limiter::rate_limit::{
    rate_limit_middleware, EntitlementSet, HeaderUserIdExtractor, NeverSkip, PostgresCounterStore,
    RateLimitEngine, RateLimiterState, RateLimitsConfig, RawRateLimitsConfig,
    StaticSubscriptionProvider,
};
use tiered_rate_limiter::routes::{admin_routes, api_routes};

/// Loads `RateLimitsConfig` from the `RATE_LIMITS_CONFIG_JSON` env var
/// through the fallible `TryFrom` boundary (spec §7/§9): a missing var,
/// malformed JSON, or a config missing the required `"none"` tier are all
/// fatal at startup rather than silently falling back to a default.
fn load_rate_limits_config() -> RateLimitsConfig {
    let raw_json = std::env::var("RATE_LIMITS_CONFIG_JSON").unwrap_or_else(|_| {
        tracing::error!("RATE_LIMITS_CONFIG_JSON must be set");
        std::process::exit(1);
    });

    let raw: RawRateLimitsConfig = serde_json::from_str(&raw_json).unwrap_or_else(|error| {
        tracing::error!(%error, "RATE_LIMITS_CONFIG_JSON is not valid JSON");
        std::process::exit(1);
    });

    RateLimitsConfig::try_from(raw).unwrap_or_else(|error| {
        tracing::error!(%error, "invalid rate limits config");
        std::process::exit(1);
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();

    let rate_limits_config = load_rate_limits_config();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(config::DATABASE_URL.as_str())
        .await?;

    if let Err(error) = sqlx::migrate!().run(&pool).await {
        return Err(Box::new(error) as Box<dyn std::error::Error>);
    }

    let store = Arc::new(PostgresCounterStore::new(pool.clone()));
    let engine = RateLimitEngine::new(store);

    // Standing in for the subscription provider client (spec §4.E is an
    // external collaborator contract; wire `HttpSubscriptionProvider`
    // against a real provider in a production deployment).
    let provider = Arc::new(StaticSubscriptionProvider::new(
        tiered_rate_limiter::rate_limit::SubscriptionSnapshot {
            entitlements: EntitlementSet::none(),
            subscription_started_at: None,
        },
    ));

    let rate_limiter_state = Arc::new(RateLimiterState {
        config: Arc::new(rate_limits_config),
        provider,
        engine,
        user_id_extractor: Arc::new(HeaderUserIdExtractor {
            header_name: config::RATE_LIMIT_USER_ID_HEADER.clone(),
        }),
        should_skip: Arc::new(NeverSkip),
    });

    let (prometheus_layer, metrics_handle) = PrometheusMetricLayer::pair();
    let app = Router::new()
        .route(
            "/metrics",
            axum::routing::get(move || async move { metrics_handle.render() }),
        )
        .merge(api_routes())
        .layer(middleware::from_fn(rate_limit_middleware))
        .merge(admin_routes())
        .layer(prometheus_layer)
        .layer(Extension(rate_limiter_state));

    let addr: SocketAddr = format!("{}:{}", config::BIND_ADDRESS.as_str(), *config::BIND_PORT)
        .parse()
        .map_err(|error| Box::new(error) as Box<dyn std::error::Error>)?;
    tracing::info!(%addr, "listening for incoming connections");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
