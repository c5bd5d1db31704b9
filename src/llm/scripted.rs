//! In-memory provider that replays a fixed script. Test support only.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::{ChunkStream, LlmProvider};
use crate::types::{ChatRequest, StreamChunk};

#[derive(Clone)]
pub enum Step {
    Text(String),
    Fail(String),
    /// Park the stream until the notify fires.
    Wait(Arc<Notify>),
    Done,
}

#[derive(Clone)]
pub enum Reply {
    /// `stream_chat` itself fails.
    Refuse(String),
    Stream(Vec<Step>),
}

impl Reply {
    /// Stream the given deltas, then `Done`.
    pub fn text(parts: &[&str]) -> Self {
        let mut steps: Vec<Step> = parts.iter().map(|p| Step::Text(p.to_string())).collect();
        steps.push(Step::Done);
        Reply::Stream(steps)
    }
}

/// Replies with the same script on every call and records what it was sent.
pub struct ScriptedProvider {
    reply: Reply,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<ChunkStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap()
            .push(request.prompt().unwrap_or_default().to_string());

        let steps = match &self.reply {
            Reply::Refuse(message) => return Err(anyhow!("{}", message)),
            Reply::Stream(steps) => steps.iter().cloned().collect::<VecDeque<_>>(),
        };

        Ok(stream::unfold(steps, |mut steps| async move {
            loop {
                match steps.pop_front()? {
                    Step::Text(text) => return Some((Ok(StreamChunk::TextDelta(text)), steps)),
                    Step::Fail(message) => return Some((Err(anyhow!("{}", message)), steps)),
                    Step::Wait(notify) => notify.notified().await,
                    Step::Done => return Some((Ok(StreamChunk::Done), steps)),
                }
            }
        })
        .boxed())
    }

    fn name(&self) -> &str {
        "Scripted"
    }
}
