//! search_in_file - lets the model grep a source file too large to embed

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::context::{SearchQuery, SourceSearch};
use crate::tools::{Tool, ToolError, ToolResult};

/// Wraps the Context Builder's search capability as an LLM tool
pub struct SearchInFileTool {
    search: Arc<dyn SourceSearch>,
}

impl SearchInFileTool {
    pub fn new(search: Arc<dyn SourceSearch>) -> Self {
        Self { search }
    }

    fn parse_query(input: &Value) -> Result<SearchQuery, ToolError> {
        let pattern = input
            .get("pattern")
            .and_then(|v| v.as_str())
            .ok_or(ToolError::MissingArgument("pattern"))?;

        let query = SearchQuery::new(pattern);
        match input.get("context_lines") {
            None | Some(Value::Null) => Ok(query),
            Some(v) => {
                let lines = v.as_u64().ok_or_else(|| {
                    ToolError::InvalidArgument(format!("context_lines must be a non-negative integer, got {}", v))
                })?;
                Ok(query.with_context(lines as usize))
            }
        }
    }
}

#[async_trait]
impl Tool for SearchInFileTool {
    fn name(&self) -> &'static str {
        "search_in_file"
    }

    fn description(&self) -> &'static str {
        "Search the source file for a pattern and return matching lines with line numbers and \
         surrounding context. Use it to find imports, dependencies, entry points and how input \
         is read. The pattern is a case-sensitive regular expression; an invalid regex is \
         matched as literal text."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regex pattern to search for (case-sensitive)"
                },
                "context_lines": {
                    "type": "integer",
                    "description": "Lines of context before and after each match (default: 2)",
                    "minimum": 0
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        debug!(?input, "SearchInFileTool::execute: called");
        let query = match Self::parse_query(&input) {
            Ok(q) => q,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        match self.search.search(&query) {
            Ok(result) => {
                debug!(matches = result.match_count(), "SearchInFileTool::execute: search complete");
                ToolResult::success(result.to_string())
            }
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}
