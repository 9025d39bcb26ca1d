use axum::{routing::get, Router};

use crate::rate_limit::api::{check_status, get_history};

async fn ping() -> &'static str {
    "pong"
}

/// key: api-routes -> demo surface exercising the rate limiter
///
/// `/api/ping` stands in for the application's real protected handlers;
/// the `rate_limit_middleware` layer applied in `main.rs` is what actually
/// enforces admission for every route nested under this router. The two
/// `/api/rate-limits/*` routes are read-only introspection endpoints and
/// are expected to sit *outside* that layer in a real deployment (an
/// operator checking a user's standing should not itself burn quota).
pub fn api_routes() -> Router {
    Router::new().route("/api/ping", get(ping))
}

pub fn admin_routes() -> Router {
    Router::new()
        .route("/api/rate-limits/:user_id/history", get(get_history))
        .route("/api/rate-limits/:user_id/status", get(check_status))
}
