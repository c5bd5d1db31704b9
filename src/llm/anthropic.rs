//! Anthropic (Claude) LLM provider implementation.
//!
//! Key differences from the OpenAI format:
//! - the system prompt is a top-level field, not a message
//! - the stream is a sequence of typed events; text arrives in
//!   `content_block_delta` events and `message_stop` ends the reply

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{sse, ChunkStream, LlmProvider};
use crate::types::{ChatRequest, Role, StreamChunk};

/// Anthropic API client.
pub struct AnthropicProvider {
    api_key: String,
    api_base: String,
    client: reqwest::Client,
}

// --- API Request Types ---

#[derive(Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    stream: bool,
}

#[derive(Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

// --- Streaming Event Types ---

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta { delta: Delta },
    MessageStop,
    Error { error: ApiError },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
struct Delta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    #[serde(default)]
    message: String,
}

// --- Implementation ---

impl AnthropicProvider {
    pub fn new(api_key: String, api_base: Option<String>) -> Self {
        Self {
            api_key,
            api_base: api_base.unwrap_or_else(|| "https://api.anthropic.com".to_string()),
            client: reqwest::Client::new(),
        }
    }

    /// Convert our messages to the Anthropic layout: system messages are
    /// lifted into the top-level field.
    fn build_api_request(&self, request: &ChatRequest) -> ApiRequest {
        let mut system = None;
        let mut messages = Vec::new();

        for msg in &request.messages {
            match msg.role {
                Role::System => system = Some(msg.content.clone()),
                Role::User | Role::Assistant => messages.push(ApiMessage {
                    role: if msg.role == Role::User { "user" } else { "assistant" }.to_string(),
                    content: msg.content.clone(),
                }),
            }
        }

        ApiRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            system,
            messages,
            stream: true,
        }
    }
}

fn parse_data(data: &str) -> Result<Option<StreamChunk>> {
    let event: StreamEvent = match serde_json::from_str(data) {
        Ok(event) => event,
        Err(_) => return Ok(None),
    };
    match event {
        StreamEvent::ContentBlockDelta { delta } => {
            Ok(Some(StreamChunk::TextDelta(delta.text.unwrap_or_default())))
        }
        StreamEvent::MessageStop => Ok(Some(StreamChunk::Done)),
        StreamEvent::Error { error } => anyhow::bail!("Anthropic stream error: {}", error.message),
        StreamEvent::Other => Ok(None),
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<ChunkStream> {
        let api_request = self.build_api_request(request);

        let url = format!("{}/v1/messages", self.api_base.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&api_request)
            .send()
            .await
            .context("Failed to send request to Anthropic API")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Anthropic API error ({}): {}", status, error_body);
        }

        Ok(sse::response_stream(response, parse_data))
    }

    fn name(&self) -> &str {
        "Anthropic"
    }
}
