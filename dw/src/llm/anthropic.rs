//! Anthropic Messages API client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::http::post_json;
use super::{
    CompletionRequest, CompletionResponse, ContentBlock, LlmClient, LlmError, Message, MessageContent, StopReason,
    TokenUsage, ToolCall,
};
use crate::config::ResolvedProvider;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Check if an HTTP status code is retryable (529 is Anthropic's "overloaded")
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 500 | 502 | 503 | 504 | 529)
}

/// Anthropic Claude API client
pub struct AnthropicClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
}

impl AnthropicClient {
    /// Create a new client from a resolved provider
    pub fn from_config(config: &ResolvedProvider) -> Result<Self, LlmError> {
        debug!(provider = %config.name, model = %config.model, "AnthropicClient::from_config: called");
        let api_key = config.get_api_key()?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.clone(),
            http,
            max_tokens: config.max_tokens,
        })
    }

    /// Build the request body for the Messages API
    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        debug!(%self.model, %request.max_tokens, "build_request_body: called");
        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": request.max_tokens.min(self.max_tokens),
            "system": request.system_prompt,
            "messages": self.convert_messages(&request.messages),
        });

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(
                request
                    .tools
                    .iter()
                    .map(|t| t.to_anthropic_schema())
                    .collect::<Vec<_>>()
            );
        }

        body
    }

    /// Convert internal messages to API format
    ///
    /// The internal block model mirrors Anthropic's, so blocks serialize as-is.
    fn convert_messages(&self, messages: &[Message]) -> Vec<serde_json::Value> {
        messages
            .iter()
            .map(|msg| {
                let content = match &msg.content {
                    MessageContent::Text(text) => serde_json::json!(text),
                    MessageContent::Blocks(blocks) => serde_json::json!(blocks),
                };
                serde_json::json!({ "role": msg.role, "content": content })
            })
            .collect()
    }

    /// Parse the API response, joining multiple text blocks
    fn parse_response(&self, api_response: AnthropicResponse) -> CompletionResponse {
        debug!(stop_reason = %api_response.stop_reason, "parse_response: called");
        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in api_response.content {
            match block {
                AnthropicContentBlock::Text { text: t } => text.push_str(&t),
                AnthropicContentBlock::ToolUse { id, name, input } => {
                    debug!(%id, %name, "parse_response: ToolUse block");
                    tool_calls.push(ToolCall { id, name, input });
                }
                AnthropicContentBlock::Other => {}
            }
        }

        CompletionResponse {
            content: if text.is_empty() { None } else { Some(text) },
            tool_calls,
            stop_reason: StopReason::from_anthropic(&api_response.stop_reason),
            usage: TokenUsage {
                input_tokens: api_response.usage.input_tokens,
                output_tokens: api_response.usage.output_tokens,
            },
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(%self.model, %request.max_tokens, "complete: called");
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_request_body(&request);
        let headers = [
            ("x-api-key", self.api_key.clone()),
            ("anthropic-version", ANTHROPIC_VERSION.to_string()),
        ];

        let response = post_json(&self.http, &url, &headers, &body, is_retryable_status).await?;
        let api_response: AnthropicResponse = response.json().await?;
        Ok(self.parse_response(api_response))
    }
}

// Anthropic API response types

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    stop_reason: String,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolDefinition;

    fn client(max_tokens: u32) -> AnthropicClient {
        AnthropicClient {
            model: "claude-sonnet-4-5".to_string(),
            api_key: "test-key".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            http: Client::new(),
            max_tokens,
        }
    }

    #[test]
    fn test_build_request_body_with_tools() {
        let request = CompletionRequest {
            system_prompt: "You write Dockerfiles".to_string(),
            messages: vec![Message::user("Hello")],
            tools: vec![ToolDefinition::new(
                "search_in_file",
                "Search the source",
                serde_json::json!({"type": "object"}),
            )],
            max_tokens: 9000,
        };

        let body = client(4096).build_request_body(&request);
        assert_eq!(body["system"], "You write Dockerfiles");
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Hello");
        assert_eq!(body["tools"][0]["name"], "search_in_file");
    }

    #[test]
    fn test_convert_tool_result_blocks() {
        let messages = vec![Message::user_blocks(vec![ContentBlock::tool_result(
            "toolu_1",
            "No matches found.",
            false,
        )])];
        let converted = client(100).convert_messages(&messages);
        assert_eq!(converted[0]["content"][0]["type"], "tool_result");
        assert_eq!(converted[0]["content"][0]["tool_use_id"], "toolu_1");
    }

    #[test]
    fn test_parse_response_joins_text_and_collects_tools() {
        let raw = serde_json::json!({
            "content": [
                { "type": "text", "text": "Looking up imports. " },
                { "type": "tool_use", "id": "toolu_2", "name": "search_in_file", "input": { "pattern": "import" } },
                { "type": "thinking", "thinking": "..." }
            ],
            "stop_reason": "tool_use",
            "usage": { "input_tokens": 40, "output_tokens": 7 }
        });
        let api_response: AnthropicResponse = serde_json::from_value(raw).unwrap();

        let response = client(100).parse_response(api_response);
        assert_eq!(response.content.as_deref(), Some("Looking up imports. "));
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(response.tool_calls[0].name, "search_in_file");
        assert_eq!(response.usage.output_tokens, 7);
    }
}
