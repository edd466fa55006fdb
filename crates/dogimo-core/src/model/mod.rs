//! Provider-agnostic chat model port.

pub mod client;
pub mod types;

pub use client::ChatModel;
pub use types::{ChatMessage, Completion, CompletionRequest, Role, TokenUsage};
