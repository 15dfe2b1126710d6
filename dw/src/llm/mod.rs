//! LLM client layer
//!
//! Provider-neutral tool-calling completions over OpenAI-compatible and
//! Anthropic HTTP APIs.

use std::sync::Arc;

use tracing::debug;

mod anthropic;
pub mod client;
mod error;
mod http;
mod openai;
mod types;

pub use anthropic::AnthropicClient;
pub use client::LlmClient;
pub use error::LlmError;
pub use openai::OpenAIClient;
pub use types::{
    CompletionRequest, CompletionResponse, ContentBlock, Message, MessageContent, Role, StopReason, TokenUsage,
    ToolCall, ToolDefinition,
};

use crate::config::{ApiKind, ResolvedProvider};

/// Create an LLM client for a resolved provider
pub fn create_client(config: &ResolvedProvider) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.name, api = %config.api, model = %config.model, "create_client: called");
    match config.api {
        ApiKind::Anthropic => Ok(Arc::new(AnthropicClient::from_config(config)?)),
        ApiKind::OpenAi => Ok(Arc::new(OpenAIClient::from_config(config)?)),
    }
}
