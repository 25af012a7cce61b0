// transcript-service-rs/tests/api_tests.rs
//
// End-to-end router tests against the in-memory quota store. Endpoints that
// need outbound network access are exercised through their validation paths;
// quota accounting is observable there because the middleware meters every
// request to a metered route, not just successful ones.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::routing::post;
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use transcript_service::config::AppConfig;
use transcript_service::quota_store::{KeyValueStore, MemoryStore};
use transcript_service::rate_limit;
use transcript_service::{build_router, AppState};

fn test_config(daily_limit: i64, admin_token: Option<&str>) -> AppConfig {
    AppConfig {
        redis_url: None,
        daily_limit,
        admin_token: admin_token.map(String::from),
        webshare: None,
        openai_api_key: None,
        openai_model: "gpt-4o-mini".to_string(),
    }
}

fn test_app(daily_limit: i64, admin_token: Option<&str>) -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(
        test_config(daily_limit, admin_token),
        Some(store.clone() as Arc<dyn KeyValueStore>),
    )
    .unwrap();
    (build_router(state), store)
}

fn storeless_app(daily_limit: i64) -> Router {
    let state = AppState::new(test_config(daily_limit, None), None).unwrap();
    build_router(state)
}

fn post_json(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn header_str<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

#[tokio::test]
async fn test_health_reports_store_and_limit() {
    let (app, _store) = test_app(5, None);
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["redis_connected"], true);
    assert_eq!(body["rate_limiting_enabled"], true);
    assert_eq!(body["daily_limit"], 5);
}

#[tokio::test]
async fn test_proxy_status_without_proxy() {
    let (app, _store) = test_app(5, None);
    let response = app.oneshot(get("/proxy_status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["proxy_enabled"], false);
    assert_eq!(body["countries"], json!([]));
}

#[tokio::test]
async fn test_transcript_input_validation() {
    let (app, _store) = test_app(5, None);

    let response = app
        .clone()
        .oneshot(post_json("/get_transcript", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "Please provide a YouTube URL"
    );

    let response = app
        .clone()
        .oneshot(post_json("/get_transcript", json!({"url": "   "})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "Please provide a YouTube URL"
    );

    let response = app
        .oneshot(post_json(
            "/get_transcript",
            json!({"url": "https://example.com/not-youtube"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Invalid YouTube URL");
}

#[tokio::test]
async fn test_summarize_validation_and_disabled_provider() {
    let (app, _store) = test_app(5, None);

    let response = app
        .clone()
        .oneshot(post_json("/summarize_transcript", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "Please provide transcript text to summarize"
    );

    // No API key configured, so a well-formed request gets 503.
    let response = app
        .oneshot(post_json(
            "/summarize_transcript",
            json!({"text": "some transcript"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        body_json(response).await["error"],
        "OpenAI summarization not available"
    );
}

#[tokio::test]
async fn test_daily_limit_blocks_with_429_and_headers() {
    let (app, _store) = test_app(2, None);

    let request = |ip: &str| {
        let mut req = post_json("/get_transcript", json!({"url": "bad"}));
        req.headers_mut()
            .insert("x-forwarded-for", ip.parse().unwrap());
        req
    };

    // Validation failures still consume quota.
    for _ in 0..2 {
        let response = app.clone().oneshot(request("203.0.113.7")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let response = app.clone().oneshot(request("203.0.113.7")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header_str(&response, "X-RateLimit-Limit"), Some("2"));
    assert_eq!(header_str(&response, "X-RateLimit-Remaining"), Some("0"));

    let retry_after: i64 = header_str(&response, "Retry-After").unwrap().parse().unwrap();
    assert!(retry_after >= 1 && retry_after <= 86_400);

    let reset_ts: i64 = header_str(&response, "X-RateLimit-Reset")
        .unwrap()
        .parse()
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["error"], "Rate limit exceeded");
    assert_eq!(body["retry_after"], reset_ts);
    assert_eq!(
        body["retry_after"].as_i64().unwrap(),
        rate_limit::RateLimiter::next_utc_midnight(chrono::Utc::now()).timestamp()
    );

    // A different client is unaffected.
    let response = app.oneshot(request("198.51.100.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unmetered_routes_survive_quota_exhaustion() {
    let (app, _store) = test_app(1, None);

    let request = || {
        let mut req = post_json("/get_transcript", json!({"url": "bad"}));
        req.headers_mut()
            .insert("x-forwarded-for", "203.0.113.7".parse().unwrap());
        req
    };
    app.clone().oneshot(request()).await.unwrap();
    let response = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    for path in ["/health", "/proxy_status", "/"] {
        let mut req = get(path);
        req.headers_mut()
            .insert("x-forwarded-for", "203.0.113.7".parse().unwrap());
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{} must stay exempt", path);
    }
}

#[tokio::test]
async fn test_non_post_requests_are_not_metered() {
    let (app, store) = test_app(1, None);

    let get_metered = || {
        let mut req = get("/get_transcript");
        req.headers_mut()
            .insert("x-forwarded-for", "203.0.113.7".parse().unwrap());
        req
    };

    // Wrong-method requests answer 405 without touching the counter.
    let response = app.clone().oneshot(get_metered()).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let key = format!("rl:ip:203.0.113.7:{}", chrono::Utc::now().format("%Y%m%d"));
    assert_eq!(store.get_counter(&key).await.unwrap(), None);

    // Exhaust the quota with a POST, then the GET still gets 405, not 429.
    let mut req = post_json("/get_transcript", json!({"url": "bad"}));
    req.headers_mut()
        .insert("x-forwarded-for", "203.0.113.7".parse().unwrap());
    app.clone().oneshot(req).await.unwrap();

    let response = app.oneshot(get_metered()).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(store.get_counter(&key).await.unwrap(), Some(1));
}

#[tokio::test]
async fn test_storeless_service_never_blocks() {
    let app = storeless_app(1);

    for _ in 0..10 {
        let mut req = post_json("/get_transcript", json!({"url": "bad"}));
        req.headers_mut()
            .insert("x-forwarded-for", "203.0.113.7".parse().unwrap());
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let response = app.oneshot(get("/health")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["redis_connected"], false);
    assert_eq!(body["rate_limiting_enabled"], false);
}

#[tokio::test]
async fn test_admin_endpoints_disabled_without_secret() {
    let (app, _store) = test_app(5, None);

    let response = app
        .oneshot(post_json("/admin/issue_bypass", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        body_json(response).await["error"],
        "Admin functionality disabled"
    );
}

#[tokio::test]
async fn test_admin_endpoints_reject_bad_token() {
    let (app, _store) = test_app(5, Some("sekret"));

    let response = app
        .clone()
        .oneshot(post_json("/admin/issue_bypass", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut req = post_json("/admin/issue_bypass", json!({}));
    req.headers_mut()
        .insert("x-admin-token", "wrong".parse().unwrap());
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Invalid admin token");
}

#[tokio::test]
async fn test_issue_bypass_with_custom_ttl() {
    let (app, _store) = test_app(5, Some("sekret"));

    let mut req = post_json("/admin/issue_bypass", json!({"ttl_hours": 6}));
    req.headers_mut()
        .insert("x-admin-token", "sekret".parse().unwrap());
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["ttl_seconds"], 6 * 3600);
    assert_eq!(body["bypass_key"].as_str().unwrap().len(), 43);
    assert!(body["expires_at"].as_str().unwrap().contains('T'));
}

async fn issue_bypass(app: &Router, admin_token: &str) -> String {
    let mut req = post_json("/admin/issue_bypass", json!({}));
    req.headers_mut()
        .insert("x-admin-token", admin_token.parse().unwrap());
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["bypass_key"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_bypass_token_exempts_exhausted_client() {
    let (app, store) = test_app(1, Some("sekret"));
    let token = issue_bypass(&app, "sekret").await;

    let metered = || {
        let mut req = post_json("/get_transcript", json!({"url": "bad"}));
        req.headers_mut()
            .insert("x-forwarded-for", "203.0.113.7".parse().unwrap());
        req
    };

    app.clone().oneshot(metered()).await.unwrap();
    let response = app.clone().oneshot(metered()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // With the bypass header the request goes through (to the validation
    // error) and the counter stays where it was.
    let mut req = metered();
    req.headers_mut()
        .insert("x-bypass-key", token.parse().unwrap());
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let key = format!("rl:ip:203.0.113.7:{}", chrono::Utc::now().format("%Y%m%d"));
    assert_eq!(store.get_counter(&key).await.unwrap(), Some(2));
}

#[tokio::test]
async fn test_revoked_bypass_token_is_metered_again() {
    let (app, _store) = test_app(1, Some("sekret"));
    let token = issue_bypass(&app, "sekret").await;

    let mut req = post_json("/admin/revoke_bypass", json!({"bypass_key": token}));
    req.headers_mut()
        .insert("x-admin-token", "sekret".parse().unwrap());
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["revoked"], true);

    // Second revocation reports the token was already gone.
    let mut req = post_json("/admin/revoke_bypass", json!({"bypass_key": token}));
    req.headers_mut()
        .insert("x-admin-token", "sekret".parse().unwrap());
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(body_json(response).await["revoked"], false);

    // The revoked token no longer exempts anyone.
    let metered = |tok: &str| {
        let mut req = post_json("/get_transcript", json!({"url": "bad"}));
        req.headers_mut()
            .insert("x-forwarded-for", "203.0.113.7".parse().unwrap());
        req.headers_mut().insert("x-bypass-key", tok.parse().unwrap());
        req
    };
    app.clone().oneshot(metered(&token)).await.unwrap();
    let response = app.oneshot(metered(&token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_expired_bypass_token_is_metered() {
    let (app, store) = test_app(1, Some("sekret"));

    let mut req = post_json("/admin/issue_bypass", json!({"ttl_hours": 1}));
    req.headers_mut()
        .insert("x-admin-token", "sekret".parse().unwrap());
    let response = app.clone().oneshot(req).await.unwrap();
    let token = body_json(response).await["bypass_key"]
        .as_str()
        .unwrap()
        .to_string();

    store.advance(Duration::from_secs(3601)).await;

    let metered = || {
        let mut req = post_json("/get_transcript", json!({"url": "bad"}));
        req.headers_mut()
            .insert("x-forwarded-for", "203.0.113.7".parse().unwrap());
        req.headers_mut()
            .insert("x-bypass-key", token.parse().unwrap());
        req
    };
    app.clone().oneshot(metered()).await.unwrap();
    let response = app.oneshot(metered()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_rate_limit_status_endpoint() {
    let (app, _store) = test_app(5, Some("sekret"));

    let mut req = get("/admin/rate_limit_status");
    req.headers_mut()
        .insert("x-admin-token", "sekret".parse().unwrap());
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "Missing ip query parameter"
    );

    // Burn two requests for one client, then inspect it.
    for _ in 0..2 {
        let mut req = post_json("/get_transcript", json!({"url": "bad"}));
        req.headers_mut()
            .insert("x-forwarded-for", "203.0.113.7".parse().unwrap());
        app.clone().oneshot(req).await.unwrap();
    }

    let mut req = get("/admin/rate_limit_status?ip=203.0.113.7");
    req.headers_mut()
        .insert("x-admin-token", "sekret".parse().unwrap());
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["ip"], "203.0.113.7");
    assert_eq!(body["current_count"], 2);
    assert_eq!(body["daily_limit"], 5);
    assert_eq!(body["remaining"], 3);
    assert_eq!(body["rate_limited"], false);
    assert!(body["ttl_seconds"].as_i64().unwrap() > 0);
}

// The X-RateLimit-* annotation only applies to sub-400 responses, so it is
// exercised through a stub handler mounted at a metered path.
#[tokio::test]
async fn test_success_responses_carry_quota_headers() {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(
        test_config(2, None),
        Some(store as Arc<dyn KeyValueStore>),
    )
    .unwrap();
    let app = Router::new()
        .route("/get_transcript", post(|| async { "ok" }))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_middleware,
        ))
        .with_state(state);

    let request = || {
        let mut req = Request::builder()
            .method("POST")
            .uri("/get_transcript")
            .body(Body::empty())
            .unwrap();
        req.headers_mut()
            .insert("x-forwarded-for", "203.0.113.7".parse().unwrap());
        req
    };

    let response = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "X-RateLimit-Limit"), Some("2"));
    assert_eq!(header_str(&response, "X-RateLimit-Remaining"), Some("1"));

    let response = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "X-RateLimit-Remaining"), Some("0"));

    let response = app.oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}
