//! Upstream completion client for the prompt relay.
//!
//! Pure HTTP client against the Anthropic Messages API.

mod anthropic;
mod client;
mod error;
mod types;

pub use anthropic::{
    ANTHROPIC_MESSAGES_URL, ANTHROPIC_VERSION, AnthropicClient, AnthropicSettings,
    DEFAULT_MAX_TOKENS, DEFAULT_MODEL,
};
pub use client::{CompletionApi, build_http_client};
pub use error::{LlmError, Result};
pub use types::{ChatMessage, Completion, Role, Usage};
