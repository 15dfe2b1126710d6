//! Generation Interface
//!
//! Turns a source context, the example usage and optional repair feedback
//! into one candidate Dockerfile. The model may call `search_in_file` any
//! number of times before it answers.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::context::{SourceContext, SourceSearch};
use crate::domain::ExampleUsage;
use crate::llm::LlmError;
use crate::repair::RepairFeedback;

mod extract;
mod llm_generator;

pub use extract::extract_artifact;
pub use llm_generator::LlmGenerator;

/// Recoverable generation failures; each one costs an iteration
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("LLM request failed: {0}")]
    Llm(#[from] LlmError),

    #[error("response contained no Dockerfile")]
    EmptyArtifact,

    #[error("model did not finish within {0} turns")]
    TurnLimit(u32),

    #[error("failed to render prompt: {0}")]
    Prompt(String),
}

/// Everything one generation call sees
#[derive(Clone)]
pub struct GenerationRequest<'a> {
    pub context: &'a SourceContext,
    pub example: &'a ExampleUsage,
    /// Present only for searchable contexts
    pub search: Option<Arc<dyn SourceSearch>>,
    /// 1-based
    pub iteration: u32,
    pub max_iterations: u32,
    pub feedback: Option<&'a RepairFeedback>,
    pub previous_artifact: Option<&'a str>,
}

/// Produces candidate artifacts; polymorphic over provider
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, GenerationError>;
}
