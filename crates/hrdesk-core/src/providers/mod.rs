//! Language-model backend abstraction
//!
//! Agents and the model-assisted classifier only see [`LlmProvider`]; the
//! OpenAI-compatible HTTP client is one implementation of it.

pub mod openai;
pub mod types;

pub use openai::OpenAiProvider;
pub use types::{ChatMessage, ChatResponse, ChatRole, ChatUsage, LlmProvider, StopReason};
