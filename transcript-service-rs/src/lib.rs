// transcript-service-rs/src/lib.rs
//
// YouTube transcript service
// Provides:
// - Transcript retrieval and summarization endpoints
// - Per-IP daily quota enforcement with admin-issued bypass tokens
// - Admin endpoints for bypass management and quota inspection

pub mod admin;
pub mod bypass;
pub mod config;
pub mod error;
pub mod handlers;
pub mod quota_store;
pub mod rate_limit;
pub mod summarize;
pub mod transcript;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::bypass::BypassTokenManager;
use crate::config::AppConfig;
use crate::quota_store::KeyValueStore;
use crate::rate_limit::RateLimiter;
use crate::summarize::SummaryClient;
use crate::transcript::TranscriptClient;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub limiter: Arc<RateLimiter>,
    pub bypass: Arc<BypassTokenManager>,
    pub transcripts: Arc<TranscriptClient>,
    pub summarizer: Option<Arc<SummaryClient>>,
    pub store_connected: bool,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Option<Arc<dyn KeyValueStore>>,
    ) -> anyhow::Result<Self> {
        let transcripts = Arc::new(TranscriptClient::new(config.webshare.as_ref())?);
        let summarizer = config
            .openai_api_key
            .clone()
            .map(|key| Arc::new(SummaryClient::new(key, config.openai_model.clone())));
        let limiter = Arc::new(RateLimiter::new(store.clone(), config.daily_limit));
        let bypass = Arc::new(BypassTokenManager::new(store.clone()));

        Ok(Self {
            config: Arc::new(config),
            limiter,
            bypass,
            transcripts,
            summarizer,
            store_connected: store.is_some(),
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index_handler))
        .route("/health", get(handlers::health_handler))
        .route("/proxy_status", get(handlers::proxy_status_handler))
        .route("/get_transcript", post(handlers::get_transcript_handler))
        .route(
            "/summarize_transcript",
            post(handlers::summarize_transcript_handler),
        )
        .route("/admin/issue_bypass", post(admin::issue_bypass_handler))
        .route("/admin/revoke_bypass", post(admin::revoke_bypass_handler))
        .route(
            "/admin/rate_limit_status",
            get(admin::rate_limit_status_handler),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_middleware,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
