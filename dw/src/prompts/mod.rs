//! Prompt Template System
//!
//! Loads and renders `.pmt` (prompt template) files for Dockerfile generation.
//!
//! Template loading chain:
//! 1. `.dockerwrap/prompts/{name}.pmt` (user override)
//! 2. Embedded fallback in code
//!
//! Templates use Handlebars syntax for variable substitution.

pub mod embedded;
mod loader;

pub use loader::{FeedbackView, GeneratePromptContext, PromptLoader, SystemPromptContext};
