use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use super::middleware::RateLimiterState;
use super::models::{HistoryEntry, PeriodType};
use crate::config;

/// key: rate-limit-api -> read-only introspection endpoints
///
/// These sit alongside the middleware shell for operators inspecting a
/// user's current standing; they never themselves check-and-increment.
pub async fn get_history(
    Extension(state): Extension<Arc<RateLimiterState>>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntry>>, StatusCode> {
    let period = parse_period(&query.period).ok_or(StatusCode::BAD_REQUEST)?;
    let limit = query
        .limit
        .unwrap_or(*config::RATE_LIMIT_HISTORY_DEFAULT_LIMIT);

    let snapshot = state
        .provider
        .lookup(&user_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let history = state
        .engine
        .get_history(
            &user_id,
            period,
            snapshot.subscription_started_at,
            limit,
        )
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(history))
}

pub async fn check_status(
    Extension(state): Extension<Arc<RateLimiterState>>,
    Path(user_id): Path<String>,
) -> Result<Json<StatusResponse>, StatusCode> {
    use super::entitlements::EntitlementResolver;

    let now = chrono::Utc::now();
    let snapshot = state
        .provider
        .lookup(&user_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let limits = EntitlementResolver::resolve(&snapshot.entitlements, &state.config);
    let decision = state
        .engine
        .check_only(&user_id, limits, snapshot.subscription_started_at, now)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(StatusResponse {
        allowed: decision.allowed,
        remaining: decision.remaining,
        limits: decision.limits,
    }))
}

fn parse_period(raw: &str) -> Option<PeriodType> {
    match raw {
        "hourly" => Some(PeriodType::Hourly),
        "daily" => Some(PeriodType::Daily),
        "monthly" => Some(PeriodType::Monthly),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub period: String,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub allowed: bool,
    pub remaining: super::models::RemainingQuotas,
    pub limits: super::models::RateLimits,
}
