// transcript-service-rs/src/transcript.rs
//
// External transcript provider client
// Provides:
// - Video ID extraction from the common YouTube URL shapes
// - Caption track discovery via the player endpoint
// - Two-tier language fallback: preferred English variants first, else the
//   first available track
// - Optional routing through the configured residential proxy pool

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::config::WebshareProxyConfig;

const PLAYER_ENDPOINT: &str = "https://www.youtube.com/youtubei/v1/player";
const PREFERRED_LANGUAGES: [&str; 3] = ["en", "en-US", "en-GB"];
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

static VIDEO_ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/)([a-zA-Z0-9_-]{11})")
            .expect("valid video id pattern"),
        Regex::new(r"youtube\.com/.*[?&]v=([a-zA-Z0-9_-]{11})").expect("valid video id pattern"),
    ]
});

/// Extract the 11-character video ID from the common YouTube URL formats.
pub fn extract_video_id(url: &str) -> Option<String> {
    VIDEO_ID_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(url))
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptSnippet {
    pub start: f64,
    pub duration: f64,
    pub text: String,
}

/// Space-joined plain-text rendition of a transcript.
pub fn full_text(snippets: &[TranscriptSnippet]) -> String {
    snippets
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("no transcript tracks available for this video")]
    NoTracks,

    #[error("transcript provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Provider(String),
}

// Player response shape, reduced to the caption track list.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerResponse {
    captions: Option<Captions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Captions {
    player_captions_tracklist_renderer: Option<TracklistRenderer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TracklistRenderer {
    caption_tracks: Option<Vec<CaptionTrack>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionTrack {
    base_url: String,
    language_code: String,
}

// json3 timed-text payload.
#[derive(Debug, Deserialize)]
struct TimedText {
    events: Option<Vec<TimedTextEvent>>,
}

#[derive(Debug, Deserialize)]
struct TimedTextEvent {
    #[serde(rename = "tStartMs")]
    start_ms: Option<i64>,
    #[serde(rename = "dDurationMs")]
    duration_ms: Option<i64>,
    segs: Option<Vec<TimedTextSegment>>,
}

#[derive(Debug, Deserialize)]
struct TimedTextSegment {
    utf8: Option<String>,
}

pub struct TranscriptClient {
    http: Client,
}

impl TranscriptClient {
    pub fn new(proxy: Option<&WebshareProxyConfig>) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder().timeout(REQUEST_TIMEOUT);
        if let Some(config) = proxy {
            builder = builder.proxy(config.to_reqwest_proxy()?);
        }
        Ok(Self {
            http: builder.build()?,
        })
    }

    /// Fetch a transcript, preferring English caption tracks and falling
    /// back to the first available one.
    pub async fn fetch(&self, video_id: &str) -> Result<Vec<TranscriptSnippet>, TranscriptError> {
        let tracks = self.list_caption_tracks(video_id).await?;
        let track = PREFERRED_LANGUAGES
            .iter()
            .find_map(|lang| tracks.iter().find(|t| t.language_code == *lang))
            .or_else(|| tracks.first())
            .ok_or(TranscriptError::NoTracks)?;
        self.fetch_track(&track.base_url).await
    }

    async fn list_caption_tracks(
        &self,
        video_id: &str,
    ) -> Result<Vec<CaptionTrack>, TranscriptError> {
        let body = json!({
            "context": {
                "client": {
                    "clientName": "ANDROID",
                    "clientVersion": "20.10.38",
                }
            },
            "videoId": video_id,
        });

        let response = self
            .http
            .post(PLAYER_ENDPOINT)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let player: PlayerResponse = response
            .json()
            .await
            .map_err(|e| TranscriptError::Provider(format!("unexpected player response: {}", e)))?;

        Ok(player
            .captions
            .and_then(|c| c.player_captions_tracklist_renderer)
            .and_then(|r| r.caption_tracks)
            .unwrap_or_default())
    }

    async fn fetch_track(&self, base_url: &str) -> Result<Vec<TranscriptSnippet>, TranscriptError> {
        let url = format!("{}&fmt=json3", base_url);
        let response = self.http.get(&url).send().await?.error_for_status()?;
        let timed_text: TimedText = response
            .json()
            .await
            .map_err(|e| TranscriptError::Provider(format!("unexpected track payload: {}", e)))?;

        let snippets = timed_text
            .events
            .unwrap_or_default()
            .into_iter()
            .filter_map(|event| {
                let text = event
                    .segs?
                    .into_iter()
                    .filter_map(|seg| seg.utf8)
                    .collect::<String>()
                    .trim()
                    .to_string();
                if text.is_empty() {
                    return None;
                }
                Some(TranscriptSnippet {
                    start: event.start_ms.unwrap_or(0) as f64 / 1000.0,
                    duration: event.duration_ms.unwrap_or(0) as f64 / 1000.0,
                    text,
                })
            })
            .collect::<Vec<_>>();

        if snippets.is_empty() {
            return Err(TranscriptError::NoTracks);
        }
        Ok(snippets)
    }
}
