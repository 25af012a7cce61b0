// transcript-service-rs/src/rate_limit.rs
//
// Per-IP daily rate limiting backed by the shared quota store
// Provides:
// - Atomic check-and-increment against rl:ip:<ip>:<YYYYMMDD> keys
// - Window reset at UTC midnight via a TTL set once at counter creation
// - Bypass token short-circuit (bp:<token> sentinel lookup)
// - Axum middleware that meters the transcript endpoints, short-circuits
//   with 429 and annotates successful responses with X-RateLimit-* headers
//
// Every store failure on this path fails OPEN: quota enforcement is a
// cost-control feature, not a security boundary, so a store outage must
// degrade to "unlimited", never to "service unavailable".

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Days, TimeZone, Utc};
use serde::Serialize;

use crate::quota_store::KeyValueStore;
use crate::AppState;

/// POST routes subject to quota metering. Everything else is exempt.
const METERED_ROUTES: [&str; 2] = ["/get_transcript", "/summarize_transcript"];

const BYPASS_HEADER: &str = "x-bypass-key";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Outcome of a check-and-increment for one request.
#[derive(Debug, Clone, Copy)]
pub struct Decision {
    pub allowed: bool,
    pub current_count: i64,
    pub remaining: i64,
    /// True when a valid bypass token exempted this request from metering.
    pub bypassed: bool,
}

/// Read-only quota snapshot for diagnostics and response headers.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QuotaStatus {
    pub current_count: i64,
    pub remaining: i64,
    pub ttl_seconds: i64,
    pub limited: bool,
}

#[derive(Debug, Serialize)]
struct RateLimitExceededBody {
    error: String,
    message: String,
    /// Absolute Unix timestamp of the next UTC midnight.
    retry_after: i64,
}

pub struct RateLimiter {
    store: Option<Arc<dyn KeyValueStore>>,
    daily_limit: i64,
}

impl RateLimiter {
    pub fn new(store: Option<Arc<dyn KeyValueStore>>, daily_limit: i64) -> Self {
        Self { store, daily_limit }
    }

    pub fn daily_limit(&self) -> i64 {
        self.daily_limit
    }

    pub fn enabled(&self) -> bool {
        self.store.is_some()
    }

    fn quota_key(client_ip: &str, now: DateTime<Utc>) -> String {
        format!("rl:ip:{}:{}", client_ip, now.format("%Y%m%d"))
    }

    /// First instant of the next UTC calendar day.
    pub fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
        let next_day = now.date_naive() + Days::new(1);
        let midnight = next_day.and_hms_opt(0, 0, 0).expect("midnight is a valid time");
        Utc.from_utc_datetime(&midnight)
    }

    /// Seconds remaining in the current UTC day, always at least 1.
    pub fn seconds_until_reset(now: DateTime<Utc>) -> i64 {
        (Self::next_utc_midnight(now) - now).num_seconds().max(1)
    }

    fn open(&self, bypassed: bool) -> Decision {
        Decision {
            allowed: true,
            current_count: 0,
            remaining: self.daily_limit,
            bypassed,
        }
    }

    /// Count this request against the client's daily quota.
    ///
    /// A valid bypass token exempts the request without touching the
    /// counter. Blocked requests still increment: the counter reflects all
    /// quota-counted requests observed, not just the allowed ones.
    pub async fn check_and_consume(
        &self,
        client_ip: &str,
        bypass_token: Option<&str>,
    ) -> Decision {
        let Some(store) = &self.store else {
            return self.open(false);
        };

        if let Some(token) = bypass_token {
            match store.exists(&format!("bp:{}", token)).await {
                Ok(true) => return self.open(true),
                Ok(false) => {}
                Err(err) => {
                    log::warn!("bypass lookup failed, failing open: {}", err);
                    return self.open(false);
                }
            }
        }

        let now = Utc::now();
        let key = Self::quota_key(client_ip, now);
        let count = match store.increment(&key).await {
            Ok(count) => count,
            Err(err) => {
                log::warn!("quota increment failed, failing open: {}", err);
                return self.open(false);
            }
        };

        // This increment created the key; pin its expiry to the day
        // boundary so the window resets exactly at UTC midnight.
        if count == 1 {
            if let Err(err) = store.set_expiry(&key, Self::seconds_until_reset(now)).await {
                log::warn!("quota expiry update failed, failing open: {}", err);
                return self.open(false);
            }
        }

        Decision {
            allowed: count <= self.daily_limit,
            current_count: count,
            remaining: (self.daily_limit - count).max(0),
            bypassed: false,
        }
    }

    /// Read the quota state without incrementing.
    pub async fn peek_status(&self, client_ip: &str) -> QuotaStatus {
        let Some(store) = &self.store else {
            return QuotaStatus {
                current_count: 0,
                remaining: self.daily_limit,
                ttl_seconds: 0,
                limited: false,
            };
        };

        let key = Self::quota_key(client_ip, Utc::now());
        let current_count = match store.get_counter(&key).await {
            Ok(count) => count.unwrap_or(0),
            Err(err) => {
                log::warn!("quota read failed: {}", err);
                0
            }
        };
        let ttl_seconds = match store.ttl(&key).await {
            Ok(ttl) => ttl.unwrap_or(0),
            Err(err) => {
                log::warn!("quota ttl read failed: {}", err);
                0
            }
        };

        QuotaStatus {
            current_count,
            remaining: (self.daily_limit - current_count).max(0),
            ttl_seconds,
            limited: current_count >= self.daily_limit,
        }
    }
}

/// Resolve the client identity: left-most entry of the forwarded-for chain
/// when present, else the direct peer address. The upstream reverse proxy is
/// trusted to prepend the true client address.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn set_quota_headers(headers: &mut HeaderMap, limit: i64, remaining: i64, reset_ts: i64) {
    if let Ok(value) = HeaderValue::from_str(&limit.to_string()) {
        headers.insert("X-RateLimit-Limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
        headers.insert("X-RateLimit-Remaining", value);
    }
    if let Ok(value) = HeaderValue::from_str(&reset_ts.to_string()) {
        headers.insert("X-RateLimit-Reset", value);
    }
}

/// Quota middleware wrapping every inbound request.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    if req.method() != Method::POST || !METERED_ROUTES.contains(&path.as_str()) {
        return next.run(req).await;
    }

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let ip = client_ip(req.headers(), peer);
    let bypass_token = req
        .headers()
        .get(BYPASS_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let decision = state
        .limiter
        .check_and_consume(&ip, bypass_token.as_deref())
        .await;

    if !decision.allowed {
        let now = Utc::now();
        let reset = RateLimiter::next_utc_midnight(now);
        log::info!(
            "rate limit exceeded for {}: {} requests today",
            ip,
            decision.current_count
        );
        let body = RateLimitExceededBody {
            error: "Rate limit exceeded".to_string(),
            message: format!(
                "Daily limit of {} requests exceeded. The limit resets at midnight UTC.",
                state.limiter.daily_limit()
            ),
            retry_after: reset.timestamp(),
        };
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        let headers = response.headers_mut();
        set_quota_headers(headers, state.limiter.daily_limit(), 0, reset.timestamp());
        if let Ok(value) = HeaderValue::from_str(&(reset - now).num_seconds().max(1).to_string()) {
            headers.insert("Retry-After", value);
        }
        return response;
    }

    let mut response = next.run(req).await;

    // Best-effort annotation with a fresh read: the count was advanced by
    // this very request, so the value captured at check time is stale.
    if !decision.bypassed && response.status().as_u16() < 400 {
        let status = state.limiter.peek_status(&ip).await;
        let reset_ts = RateLimiter::next_utc_midnight(Utc::now()).timestamp();
        set_quota_headers(
            response.headers_mut(),
            state.limiter.daily_limit(),
            status.remaining,
            reset_ts,
        );
    }

    response
}
