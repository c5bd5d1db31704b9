//! sidechat: the core of an editor side-panel chat.
//!
//! Questions may mention workspace files as `@name.ext`; mentioned files are
//! injected into the prompt, ambiguous names are resolved through a numbered
//! question, and the prompt is streamed from a ranked chain of LLM backends
//! that falls back on failure and can be cancelled mid-stream.

pub mod cancel;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod index;
pub mod llm;
pub mod mention;
pub mod orchestrator;
pub mod session;
pub mod sink;
pub mod types;
pub mod workspace;
