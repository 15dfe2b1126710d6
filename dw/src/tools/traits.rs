//! Tool trait definition

use async_trait::async_trait;
use serde_json::Value;

/// A tool that can be called by the LLM
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (matches LLM tool_use name)
    fn name(&self) -> &'static str;

    /// Human-readable description shown to the model
    fn description(&self) -> &'static str;

    /// JSON Schema for input parameters
    fn input_schema(&self) -> Value;

    /// Execute the tool; failures come back as error results, never panics
    async fn execute(&self, input: Value) -> ToolResult;
}

/// Result of a tool execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    /// Create an error result
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_constructors() {
        let ok = ToolResult::success("3 matches");
        assert!(!ok.is_error);
        assert_eq!(ok.content, "3 matches");

        let err = ToolResult::error("Missing required parameter: pattern");
        assert!(err.is_error);
    }
}
