// transcript-service-rs/src/summarize.rs
//
// HTTP client for the summarization provider (OpenAI-compatible API)
//
// Long transcripts are truncated to a fixed character budget before being
// sent; the truncation is marked with a trailing ellipsis so the model
// knows the input was cut.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const MAX_INPUT_CHARS: usize = 30_000;

const API_URL: &str = "https://api.openai.com/v1/chat/completions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const SYSTEM_PROMPT: &str = "You are a helpful assistant that writes concise, \
    accurate summaries of video transcripts. Capture the main topics and key \
    takeaways in a few short paragraphs.";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u32,
}

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("provider returned status {0}")]
    Api(u16),

    #[error("provider returned an empty completion")]
    EmptyCompletion,
}

#[derive(Debug, Clone)]
pub struct Summary {
    pub summary: String,
    pub model_used: String,
    pub tokens_used: u32,
}

pub struct SummaryClient {
    http: Client,
    api_key: String,
    model: String,
}

impl SummaryClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            http: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key,
            model,
        }
    }

    pub async fn summarize(&self, text: &str) -> Result<Summary, SummaryError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!(
                        "Summarize the following video transcript:\n\n{}",
                        truncate_input(text)
                    ),
                },
            ],
            temperature: Some(0.3),
            max_tokens: Some(500),
        };

        let response = self
            .http
            .post(API_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SummaryError::Api(response.status().as_u16()));
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(SummaryError::EmptyCompletion)?;

        Ok(Summary {
            summary: choice.message.content,
            model_used: self.model.clone(),
            tokens_used: parsed.usage.map(|u| u.total_tokens).unwrap_or(0),
        })
    }
}

/// Cap the input at the character budget, marking the cut with an ellipsis.
pub fn truncate_input(text: &str) -> String {
    if text.chars().count() <= MAX_INPUT_CHARS {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(MAX_INPUT_CHARS).collect();
    truncated.push_str("...");
    truncated
}
