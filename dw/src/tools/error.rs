//! Tool error types

use thiserror::Error;

/// Errors raised while preparing or running a tool call
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Missing required parameter: {0}")]
    MissingArgument(&'static str),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Tool not found: {name}")]
    UnknownTool { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            ToolError::MissingArgument("pattern").to_string(),
            "Missing required parameter: pattern"
        );
        let err = ToolError::UnknownTool {
            name: "bash".to_string(),
        };
        assert!(err.to_string().contains("bash"));
    }
}
