//! Core data types used throughout sidechat.
//!
//! This module defines the message and request formats sent to the
//! backends, the stream chunks that come back, and the output events
//! the display side observes.

use serde::{Deserialize, Serialize};

// --- Message Roles ---

/// The role of a message sent to a backend.
///
/// - `System`: optional instructions configured by the user
/// - `User`: the assembled prompt (question plus injected files)
/// - `Assistant`: a model reply
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

// --- Messages ---

/// A single message in a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

// --- Chat Request ---

/// A request to send to one backend.
///
/// Providers convert this into their own wire format.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// The model identifier (e.g. "qwen/qwen3-235b-a22b:free")
    pub model: String,
    /// The conversation messages
    pub messages: Vec<Message>,
    /// Maximum tokens in the response
    pub max_tokens: u32,
}

impl ChatRequest {
    /// The last user message, i.e. the prompt this request carries.
    pub fn prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

// --- Stream Chunk ---

/// A single chunk from a streaming backend response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// A piece of text content (may be empty)
    TextDelta(String),
    /// The stream is complete
    Done,
}

// --- File references ---

/// A concrete file a mention can resolve to. Identity is the location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileReference {
    pub bare_name: String,
    pub location: String,
}

// --- Output ---

/// Where streamed replies go for a call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Replace the live display with the running response text.
    #[default]
    Live,
    /// Append deltas to `<name>.md` in the workspace.
    File { name: String },
}

/// Events published to the display surface, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    /// Echo of the text the user just submitted.
    Question(String),
    /// Attachment preview (an empty string clears it).
    Content(String),
    /// A call is about to start.
    Loading,
    /// Full replacement text for the response area.
    Response(String),
    /// A numbered disambiguation question awaiting a reply in `1..=range_max`.
    Selection {
        question: String,
        bare_name: String,
        range_max: usize,
    },
    /// Something the user should know about that did not stop the turn,
    /// such as a mentioned file that could not be read.
    Warning(String),
    /// Terminal failure for `question`; the UI may offer to resubmit it.
    Error { message: String, question: String },
}
