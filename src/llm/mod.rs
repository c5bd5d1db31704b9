//! LLM backends.
//!
//! This module defines the `LlmProvider` trait that abstracts over the
//! different chat completion APIs, plus the concrete streaming providers.
//!
//! Key concepts:
//! - **Streaming only**: a provider hands back a stream of `StreamChunk`s;
//!   the call engine decides how to consume, publish and cancel it
//! - **Provider pattern**: every wire format implements the same trait, so
//!   the fallback chain can mix providers freely

pub mod anthropic;
pub mod openai_compatible;
pub mod sse;

#[cfg(test)]
pub mod scripted;

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::sync::Arc;

use crate::types::{ChatRequest, StreamChunk};

/// Incremental reply from a backend. An `Err` item ends the attempt.
pub type ChunkStream = BoxStream<'static, Result<StreamChunk>>;

/// Trait that all LLM providers must implement.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Issue a streaming chat completion request.
    ///
    /// Errors returned here (connection refused, non-2xx status) and
    /// errors yielded by the stream are both transport failures.
    async fn stream_chat(&self, request: &ChatRequest) -> Result<ChunkStream>;

    /// Return the provider's display name (for logging).
    fn name(&self) -> &str;
}

/// Create a provider by its config name.
pub fn create_provider(
    kind: &str,
    api_key: String,
    api_base: Option<String>,
) -> Result<Arc<dyn LlmProvider>> {
    match kind {
        "anthropic" => Ok(Arc::new(anthropic::AnthropicProvider::new(api_key, api_base))),
        "openai_compatible" | "openai" | "openrouter" => Ok(Arc::new(
            openai_compatible::OpenAiCompatibleProvider::new(api_key, api_base),
        )),
        other => {
            bail!(
                "Unknown provider: '{}'. Supported: 'anthropic', 'openai_compatible'",
                other
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_known_providers() {
        let p = create_provider("openai_compatible", "k".into(), None).unwrap();
        assert_eq!(p.name(), "OpenAI-Compatible");
        let p = create_provider("anthropic", "k".into(), None).unwrap();
        assert_eq!(p.name(), "Anthropic");
    }

    #[test]
    fn test_unknown_provider() {
        let err = create_provider("carrier-pigeon", "k".into(), None)
            .err()
            .unwrap();
        assert!(err.to_string().contains("carrier-pigeon"));
    }
}
