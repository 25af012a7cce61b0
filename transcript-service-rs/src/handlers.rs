// transcript-service-rs/src/handlers.rs
//
// Public HTTP handlers: landing page, health, proxy status, transcript
// fetch and summarization. The transcript and summarization endpoints sit
// behind the rate-limit middleware; everything else here is exempt.

use axum::extract::State;
use axum::response::Html;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::transcript::{self, extract_video_id};
use crate::AppState;

/// GET / - static landing page
pub async fn index_handler() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

/// GET /health - liveness plus quota-store connectivity
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "redis_connected": state.store_connected,
        "rate_limiting_enabled": state.limiter.enabled(),
        "daily_limit": state.limiter.daily_limit(),
    }))
}

/// GET /proxy_status - current outbound proxy configuration
pub async fn proxy_status_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "proxy_enabled": state.config.webshare.is_some(),
        "countries": state.config.proxy_countries(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct TranscriptRequest {
    pub url: Option<String>,
}

/// POST /get_transcript
pub async fn get_transcript_handler(
    State(state): State<AppState>,
    body: Option<Json<TranscriptRequest>>,
) -> Result<Json<Value>, ApiError> {
    let url = body
        .and_then(|Json(b)| b.url)
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::InvalidInput("Please provide a YouTube URL".to_string()))?;

    let video_id = extract_video_id(&url)
        .ok_or_else(|| ApiError::InvalidInput("Invalid YouTube URL".to_string()))?;

    log::info!("fetching transcript for video {}", video_id);

    let snippets = state
        .transcripts
        .fetch(&video_id)
        .await
        .map_err(|e| ApiError::Upstream(format!("Could not retrieve transcript: {}", e)))?;
    let full_text = transcript::full_text(&snippets);

    Ok(Json(json!({
        "success": true,
        "video_id": video_id,
        "transcript": snippets,
        "full_text": full_text,
        "proxy_enabled": state.config.webshare.is_some(),
        "countries": state.config.proxy_countries(),
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct SummarizeRequest {
    pub text: Option<String>,
}

/// POST /summarize_transcript
pub async fn summarize_transcript_handler(
    State(state): State<AppState>,
    body: Option<Json<SummarizeRequest>>,
) -> Result<Json<Value>, ApiError> {
    let text = body
        .and_then(|Json(b)| b.text)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            ApiError::InvalidInput("Please provide transcript text to summarize".to_string())
        })?;

    let Some(summarizer) = &state.summarizer else {
        return Err(ApiError::FeatureDisabled(
            "OpenAI summarization not available".to_string(),
        ));
    };

    let summary = summarizer
        .summarize(&text)
        .await
        .map_err(|e| ApiError::Upstream(format!("OpenAI API error: {}", e)))?;

    Ok(Json(json!({
        "success": true,
        "summary": summary.summary,
        "model_used": summary.model_used,
        "tokens_used": summary.tokens_used,
    })))
}
