//! OpenAI-compatible LLM provider implementation (OpenRouter and friends).

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{sse, ChunkStream, LlmProvider};
use crate::types::{ChatRequest, Role, StreamChunk};

pub struct OpenAiCompatibleProvider {
    api_key: String,
    api_base: String,
    client: reqwest::Client,
}

// --- API Request Types (OpenAI format) ---

#[derive(Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

// --- Streaming Response Types ---

#[derive(Deserialize, Debug)]
struct StreamResponseChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    #[serde(default)]
    message: String,
}

// --- Implementation ---

impl OpenAiCompatibleProvider {
    pub fn new(api_key: String, api_base: Option<String>) -> Self {
        Self {
            api_key,
            api_base: api_base.unwrap_or_else(|| "https://openrouter.ai/api/v1".to_string()),
            client: reqwest::Client::new(),
        }
    }

    fn build_api_request(&self, request: &ChatRequest) -> ApiRequest {
        let messages = request
            .messages
            .iter()
            .map(|msg| ApiMessage {
                role: match msg.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                }
                .to_string(),
                content: msg.content.clone(),
            })
            .collect();

        ApiRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            stream: true,
        }
    }
}

/// Map one `data:` payload to a chunk.
///
/// Chunks without text still count as chunks (an empty delta), so the
/// engine sees every event the backend sends. Unparseable payloads are
/// skipped, keep-alives included.
fn parse_data(data: &str) -> Result<Option<StreamChunk>> {
    if data.trim() == "[DONE]" {
        return Ok(Some(StreamChunk::Done));
    }
    let chunk: StreamResponseChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(_) => return Ok(None),
    };
    if let Some(error) = chunk.error {
        anyhow::bail!("API error in stream: {}", error.message);
    }
    let text = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .unwrap_or_default();
    Ok(Some(StreamChunk::TextDelta(text)))
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<ChunkStream> {
        let api_request = self.build_api_request(request);
        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&api_request)
            .send()
            .await
            .with_context(|| format!("Failed to send streaming request to {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, error_body);
        }

        Ok(sse::response_stream(response, parse_data))
    }

    fn name(&self) -> &str {
        "OpenAI-Compatible"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[test]
    fn test_build_request_is_streaming() {
        let provider = OpenAiCompatibleProvider::new("k".into(), Some("http://x/v1/".into()));
        let request = ChatRequest {
            model: "qwen/qwen3-235b-a22b:free".into(),
            messages: vec![Message::system("be brief"), Message::user("hi")],
            max_tokens: 64,
        };
        let body = serde_json::to_value(provider.build_api_request(&request)).unwrap();
        assert_eq!(body["stream"], true);
        assert_eq!(body["model"], "qwen/qwen3-235b-a22b:free");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(provider.api_base, "http://x/v1/");
    }

    #[test]
    fn test_parse_text_delta() {
        let chunk = parse_data(r#"{"choices":[{"delta":{"content":"Hel"}}]}"#).unwrap();
        assert_eq!(chunk, Some(StreamChunk::TextDelta("Hel".into())));
    }

    #[test]
    fn test_parse_role_only_delta_is_empty_text() {
        let chunk = parse_data(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap();
        assert_eq!(chunk, Some(StreamChunk::TextDelta(String::new())));
    }

    #[test]
    fn test_parse_done_and_noise() {
        assert_eq!(parse_data("[DONE]").unwrap(), Some(StreamChunk::Done));
        assert_eq!(parse_data(": OPENROUTER PROCESSING").unwrap(), None);
    }

    #[test]
    fn test_parse_in_stream_error() {
        let err = parse_data(r#"{"error":{"message":"Rate limit exceeded"}}"#).unwrap_err();
        assert!(err.to_string().contains("Rate limit exceeded"));
    }
}
