//! ToolExecutor - the set of tools offered to one generation call

use std::collections::BTreeMap;
use tracing::debug;

use crate::llm::{ToolCall, ToolDefinition};

use super::{Tool, ToolError, ToolResult};

/// Registry of tools keyed by name
#[derive(Default)]
pub struct ToolExecutor {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolExecutor {
    /// Create an executor with no tools
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a tool, replacing any tool with the same name
    pub fn add_tool(&mut self, tool: Box<dyn Tool>) {
        debug!(tool_name = %tool.name(), "ToolExecutor::add_tool: called");
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Get tool definitions for the LLM
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.input_schema()))
            .collect()
    }

    /// Execute a tool call
    pub async fn execute(&self, tool_call: &ToolCall) -> ToolResult {
        debug!(tool_name = %tool_call.name, tool_id = %tool_call.id, "ToolExecutor::execute: called");
        match self.tools.get(&tool_call.name) {
            Some(tool) => tool.execute(tool_call.input.clone()).await,
            None => ToolResult::error(
                ToolError::UnknownTool {
                    name: tool_call.name.clone(),
                }
                .to_string(),
            ),
        }
    }

    /// Execute tool calls in order, pairing each result with its call id
    pub async fn execute_all(&self, tool_calls: &[ToolCall]) -> Vec<(String, ToolResult)> {
        debug!(count = %tool_calls.len(), "ToolExecutor::execute_all: called");
        let mut results = Vec::with_capacity(tool_calls.len());
        for call in tool_calls {
            let result = self.execute(call).await;
            results.push((call.id.clone(), result));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &'static str {
            "Echo the input back"
        }

        fn input_schema(&self) -> Value {
            json!({ "type": "object" })
        }

        async fn execute(&self, input: Value) -> ToolResult {
            ToolResult::success(input.to_string())
        }
    }

    #[test]
    fn test_definitions_follow_registered_tools() {
        let mut executor = ToolExecutor::empty();
        assert!(executor.definitions().is_empty());

        executor.add_tool(Box::new(EchoTool));
        let defs = executor.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
    }

    #[tokio::test]
    async fn test_execute_all_preserves_order_and_ids() {
        let mut executor = ToolExecutor::empty();
        executor.add_tool(Box::new(EchoTool));

        let calls = vec![
            ToolCall {
                id: "a".to_string(),
                name: "echo".to_string(),
                input: json!({"n": 1}),
            },
            ToolCall {
                id: "b".to_string(),
                name: "missing".to_string(),
                input: json!({}),
            },
        ];

        let results = executor.execute_all(&calls).await;
        assert_eq!(results[0].0, "a");
        assert!(!results[0].1.is_error);
        assert_eq!(results[1].0, "b");
        assert!(results[1].1.is_error);
        assert!(results[1].1.content.contains("Tool not found: missing"));
    }
}
