//! Streaming call engine with a ranked fallback chain.
//!
//! ```text
//!            +-----------+  chunk   +-----------+
//! start ---> |  Calling  | -------> | Streaming | --+--> Succeeded
//!            +-----------+          +-----------+   |
//!                 ^                                 +--> Cancelled
//!                 |   next backend (i + 1) % n      |
//!                 +---------------------------------+--- Failed (retryable)
//! ```
//!
//! A call tries at most one attempt per configured backend. Each attempt
//! starts with an empty stream state; partial text from a failed backend is
//! discarded. Cancellation is checked once per received chunk and before
//! every attempt, and is never retried.

use anyhow::Result;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::cancel::CancellationSignal;
use crate::config::AppConfig;
use crate::error::CallError;
use crate::llm::{self, LlmProvider};
use crate::sink::OutputSink;
use crate::types::{ChatRequest, Message, OutputEvent, OutputMode, StreamChunk};

/// One entry of the fallback chain.
#[derive(Clone)]
pub struct Backend {
    /// Display name used in the latency footer.
    pub name: String,
    pub model: String,
    pub provider: Arc<dyn LlmProvider>,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("provider", &self.provider.name())
            .finish()
    }
}

/// Everything one call needs to know about the prompt it carries.
#[derive(Debug, Clone, Copy)]
pub struct CallRequest<'a> {
    /// Final prompt sent to the backend (question plus injected files).
    pub prompt: &'a str,
    /// The user's question, reported back on terminal failure.
    pub question: &'a str,
    pub start_index: usize,
    pub output: &'a OutputMode,
}

/// Terminal state of a call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Completed {
        /// Response text followed by the latency footer.
        answer: String,
        backend: usize,
        attempts: usize,
    },
    Cancelled {
        /// Text streamed before the stop was observed.
        partial: String,
        attempts: usize,
    },
    Exhausted {
        error: CallError,
    },
}

impl CallOutcome {
    pub fn attempts(&self) -> usize {
        match self {
            CallOutcome::Completed { attempts, .. } | CallOutcome::Cancelled { attempts, .. } => {
                *attempts
            }
            CallOutcome::Exhausted {
                error: CallError::ExhaustedFallback { attempts, .. },
            } => *attempts,
            CallOutcome::Exhausted { .. } => 0,
        }
    }
}

enum AttemptEnd {
    Completed { text: String, elapsed: Duration },
    Cancelled(String),
}

pub struct StreamingCallEngine {
    backends: Vec<Backend>,
    max_tokens: u32,
    system_prompt: Option<String>,
}

impl StreamingCallEngine {
    pub fn new(backends: Vec<Backend>, max_tokens: u32) -> Self {
        Self {
            backends,
            max_tokens,
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt.filter(|s| !s.trim().is_empty());
        self
    }

    /// Build the chain described by `[[llm.backends]]`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let mut backends = Vec::with_capacity(config.llm.backends.len());
        for entry in &config.llm.backends {
            let provider = llm::create_provider(
                &entry.provider,
                config.api_key_for(entry)?,
                config.api_base_for(entry),
            )?;
            backends.push(Backend {
                name: entry.name.clone(),
                model: entry.model.clone(),
                provider,
            });
        }
        Ok(Self::new(backends, config.llm.max_tokens)
            .with_system_prompt(config.llm.system_prompt.clone()))
    }

    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }

    /// Run the fallback chain for one prompt.
    pub async fn call(
        &self,
        request: CallRequest<'_>,
        sink: &dyn OutputSink,
        cancel: &CancellationSignal,
    ) -> CallOutcome {
        let count = self.backends.len();
        if count == 0 {
            let error = CallError::NoBackends;
            sink.publish(OutputEvent::Error {
                message: error.to_string(),
                question: request.question.to_string(),
            });
            return CallOutcome::Exhausted { error };
        }

        let mut index = request.start_index % count;
        let mut last_error = CallError::NoBackends;
        let mut attempts = 0;

        for attempt in 1..=count {
            if cancel.is_cancelled() {
                return CallOutcome::Cancelled {
                    partial: String::new(),
                    attempts: attempt - 1,
                };
            }

            let backend = &self.backends[index];
            attempts = attempt;
            debug!(backend = %backend.name, attempt, "calling backend");

            match self.attempt(backend, &request, sink, cancel).await {
                Ok(AttemptEnd::Completed { text, elapsed }) => {
                    let answer = self.finish(backend, &request, sink, &text, elapsed).await;
                    info!(backend = %backend.name, attempt, ?elapsed, "call completed");
                    return CallOutcome::Completed {
                        answer,
                        backend: index,
                        attempts: attempt,
                    };
                }
                Ok(AttemptEnd::Cancelled(partial)) => {
                    info!(backend = %backend.name, attempt, "call cancelled");
                    return CallOutcome::Cancelled {
                        partial,
                        attempts: attempt,
                    };
                }
                Err(CallError::Cancelled) => {
                    info!(backend = %backend.name, attempt, "call cancelled while failing");
                    return CallOutcome::Cancelled {
                        partial: String::new(),
                        attempts: attempt,
                    };
                }
                Err(err) if err.is_retryable() => {
                    warn!(backend = %backend.name, attempt, error = %err, "backend attempt failed");
                    last_error = err;
                    index = (index + 1) % count;
                }
                Err(err) => {
                    warn!(backend = %backend.name, attempt, error = %err, "backend failed, not retrying");
                    last_error = err;
                    break;
                }
            }
        }

        let error = CallError::ExhaustedFallback {
            attempts,
            last: Box::new(last_error),
        };
        sink.publish(OutputEvent::Error {
            message: error.to_string(),
            question: request.question.to_string(),
        });
        CallOutcome::Exhausted { error }
    }

    async fn attempt(
        &self,
        backend: &Backend,
        request: &CallRequest<'_>,
        sink: &dyn OutputSink,
        cancel: &CancellationSignal,
    ) -> Result<AttemptEnd, CallError> {
        let started = Instant::now();
        let chat = self.chat_request(backend, request.prompt);

        let mut stream = backend
            .provider
            .stream_chat(&chat)
            .await
            .map_err(|e| attempt_error(&backend.name, cancel, &e))?;

        let mut state = String::new();
        while let Some(item) = stream.next().await {
            if cancel.is_cancelled() {
                return Ok(AttemptEnd::Cancelled(state));
            }
            match item.map_err(|e| attempt_error(&backend.name, cancel, &e))? {
                StreamChunk::TextDelta(delta) => {
                    state.push_str(&delta);
                    if !delta.is_empty() {
                        self.publish_progress(request.output, sink, &state, &delta)
                            .await;
                    }
                }
                StreamChunk::Done => break,
            }
        }

        if state.is_empty() {
            return Err(CallError::EmptyResponse {
                backend: backend.name.clone(),
            });
        }

        Ok(AttemptEnd::Completed {
            text: state,
            elapsed: started.elapsed(),
        })
    }

    fn chat_request(&self, backend: &Backend, prompt: &str) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(prompt));
        ChatRequest {
            model: backend.model.clone(),
            messages,
            max_tokens: self.max_tokens,
        }
    }

    async fn publish_progress(
        &self,
        output: &OutputMode,
        sink: &dyn OutputSink,
        state: &str,
        delta: &str,
    ) {
        match output {
            OutputMode::Live => sink.publish(OutputEvent::Response(state.to_string())),
            OutputMode::File { name } => append_or_warn(sink, name, delta).await,
        }
    }

    /// Publish the final text with its latency footer and return the answer
    /// as it is recorded in history.
    async fn finish(
        &self,
        backend: &Backend,
        request: &CallRequest<'_>,
        sink: &dyn OutputSink,
        text: &str,
        elapsed: Duration,
    ) -> String {
        let footer = runtime_footer(&backend.name, elapsed);
        let answer = format!("{}\n\n**{}**", text, footer);

        match request.output {
            OutputMode::Live => sink.publish(OutputEvent::Response(answer.clone())),
            OutputMode::File { name } => {
                append_or_warn(sink, name, &format!("\n\n**{}**\n\n", footer)).await;
                sink.publish(OutputEvent::Response(format!(
                    "The response to your question has been completed at:\n\n **{}**",
                    sink.log_location(name)
                )));
            }
        }

        answer
    }
}

/// A failure observed after the user asked to stop is a cancellation, not
/// a reason to try the next backend.
fn attempt_error(backend: &str, cancel: &CancellationSignal, err: &anyhow::Error) -> CallError {
    if cancel.is_cancelled() {
        CallError::Cancelled
    } else {
        CallError::transport(backend, err)
    }
}

async fn append_or_warn(sink: &dyn OutputSink, file_name: &str, text: &str) {
    if let Err(e) = sink.write_append(file_name, text).await {
        warn!(file = file_name, error = %format!("{:#}", e), "failed to append to output file");
    }
}

/// `Call to {name} took {secs} seconds.`
pub fn runtime_footer(backend_name: &str, elapsed: Duration) -> String {
    format!(
        "Call to {} took {} seconds.",
        backend_name,
        format_elapsed(elapsed.as_secs_f64())
    )
}

/// Seconds with exactly four fractional digits, truncated rather than rounded.
pub fn format_elapsed(secs: f64) -> String {
    let text = secs.to_string();
    match text.split_once('.') {
        Some((whole, fraction)) => {
            let fraction: String = fraction.chars().take(4).collect();
            format!("{}.{:0<4}", whole, fraction)
        }
        None => format!("{}.0000", text),
    }
}
