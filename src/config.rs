use once_cell::sync::Lazy;

/// Postgres connection string. Must be set via the `DATABASE_URL` env variable.
pub static DATABASE_URL: Lazy<String> =
    Lazy::new(|| std::env::var("DATABASE_URL").expect("DATABASE_URL must be set"));

/// Address the demo HTTP server binds to. Defaults to `0.0.0.0`.
pub static BIND_ADDRESS: Lazy<String> =
    Lazy::new(|| std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()));

/// Port the demo HTTP server binds to. Defaults to `8080`.
pub static BIND_PORT: Lazy<u16> = Lazy::new(|| {
    std::env::var("BIND_PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8080)
});

/// Base URL of the subscription provider, used by `HttpSubscriptionProvider`.
pub static SUBSCRIPTION_PROVIDER_BASE_URL: Lazy<String> = Lazy::new(|| {
    std::env::var("SUBSCRIPTION_PROVIDER_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:9090".to_string())
});

/// Timeout applied to every subscription provider HTTP call. A timeout is
/// treated the same as any other transport failure: the caller falls
/// through to the `"none"` tier rather than blocking admission.
pub static SUBSCRIPTION_PROVIDER_TIMEOUT_MS: Lazy<u64> = Lazy::new(|| {
    std::env::var("SUBSCRIPTION_PROVIDER_TIMEOUT_MS")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(2_000)
});

/// Default page size for `getHistory` when the caller does not specify one
/// (spec §4.C: `history(userId, periodType, limit) ... Default limit = 100`).
pub static RATE_LIMIT_HISTORY_DEFAULT_LIMIT: Lazy<i64> = Lazy::new(|| {
    std::env::var("RATE_LIMIT_HISTORY_DEFAULT_LIMIT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(100)
});

/// Header used by the default `HeaderUserIdExtractor` to identify the caller.
pub static RATE_LIMIT_USER_ID_HEADER: Lazy<String> = Lazy::new(|| {
    std::env::var("RATE_LIMIT_USER_ID_HEADER").unwrap_or_else(|_| "x-user-id".to_string())
});
