use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use thiserror::Error;

use crate::rate_limit::models::{PeriodType, RemainingQuotas};

/// Error taxonomy from spec §7. `LimitExceeded` is deliberately absent —
/// a rejection is a normal `AdmissionDecision`, not an exception.
#[derive(Debug, Error)]
pub enum RateLimiterError {
    #[error("counter store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error("subscription provider lookup failed: {0}")]
    ProviderLookup(String),
    #[error("rate limits config is missing the required \"none\" tier")]
    ConfigMissingNoneTier,
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for RateLimiterError {
    fn into_response(self) -> Response {
        let status = match &self {
            RateLimiterError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RateLimiterError::ProviderLookup(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RateLimiterError::ConfigMissingNoneTier => StatusCode::INTERNAL_SERVER_ERROR,
            RateLimiterError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        tracing::error!(error = ?self, "rate limiter error");
        (status, self.to_string()).into_response()
    }
}

pub type RateLimiterResult<T> = Result<T, RateLimiterError>;

/// Renders the 429 body shape from spec §6.
pub fn rate_limit_exceeded_response(
    remaining: RemainingQuotas,
    exceeded_limit: PeriodType,
) -> Response {
    let message = format!(
        "You have exceeded your {exceeded_limit} request limit. Please try again later or upgrade your subscription."
    );
    let body = json!({
        "success": false,
        "error": "Rate limit exceeded",
        "message": message,
        "remaining": remaining,
        "exceededLimit": exceeded_limit,
        "timestamp": Utc::now().to_rfc3339(),
    });
    (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
}
