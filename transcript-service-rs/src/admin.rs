// transcript-service-rs/src/admin.rs
//
// Admin authorization gate and bypass-management endpoints
// Provides:
// - Static shared-secret check on the X-Admin-Token header
// - POST /admin/issue_bypass, POST /admin/revoke_bypass
// - GET /admin/rate_limit_status
//
// Admin routes are exempt from quota metering. Store failures here surface
// as 503 with a descriptive message: these endpoints are operator-facing,
// unlike the fail-open metered path.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::AppState;

const ADMIN_HEADER: &str = "x-admin-token";

/// Stateless gate: 503 when no secret is configured, 401 unless the header
/// exactly equals the secret.
pub fn require_admin(headers: &HeaderMap, config: &AppConfig) -> Result<(), ApiError> {
    let Some(secret) = &config.admin_token else {
        return Err(ApiError::FeatureDisabled(
            "Admin functionality disabled".to_string(),
        ));
    };
    match headers.get(ADMIN_HEADER).and_then(|v| v.to_str().ok()) {
        Some(token) if token == secret => Ok(()),
        _ => Err(ApiError::Unauthorized("Invalid admin token".to_string())),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct IssueBypassRequest {
    pub ttl_hours: Option<i64>,
}

/// POST /admin/issue_bypass
pub async fn issue_bypass_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<IssueBypassRequest>>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&headers, &state.config)?;

    let request = body.map(|Json(b)| b).unwrap_or_default();
    let issued = state.bypass.issue(request.ttl_hours).await?;

    log::info!(
        "issued bypass token expiring at {}",
        issued.expires_at.to_rfc3339()
    );

    Ok(Json(json!({
        "success": true,
        "bypass_key": issued.token,
        "expires_at": issued.expires_at.to_rfc3339(),
        "ttl_seconds": issued.ttl_seconds,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct RevokeBypassRequest {
    pub bypass_key: Option<String>,
}

/// POST /admin/revoke_bypass
pub async fn revoke_bypass_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<RevokeBypassRequest>>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&headers, &state.config)?;

    let key = body
        .and_then(|Json(b)| b.bypass_key)
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ApiError::InvalidInput("Missing bypass_key".to_string()))?;

    let revoked = state.bypass.revoke(&key).await?;

    Ok(Json(json!({
        "success": true,
        "revoked": revoked,
        "bypass_key": key,
    })))
}

#[derive(Debug, Deserialize)]
pub struct RateLimitStatusQuery {
    pub ip: Option<String>,
}

/// GET /admin/rate_limit_status?ip=
pub async fn rate_limit_status_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<RateLimitStatusQuery>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&headers, &state.config)?;

    let ip = query
        .ip
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .ok_or_else(|| ApiError::InvalidInput("Missing ip query parameter".to_string()))?;

    let status = state.limiter.peek_status(&ip).await;

    Ok(Json(json!({
        "ip": ip,
        "current_count": status.current_count,
        "daily_limit": state.limiter.daily_limit(),
        "remaining": status.remaining,
        "ttl_seconds": status.ttl_seconds,
        "rate_limited": status.limited,
    })))
}
