//! dockerwrap - Dockerfile synthesis with an LLM in the loop
//!
//! Given a script and an example of how it is used, dockerwrap asks an LLM for
//! a Dockerfile, builds and runs it in a locked-down container, compares the
//! output with the example and feeds any failure back for another try.
//!
//! # Modules
//!
//! - [`context`] - Embed small sources, search large ones
//! - [`generation`] - Prompting, the tool-calling loop and fence extraction
//! - [`sandbox`] - Docker build and run under resource limits
//! - [`evaluate`] - Normalized output comparison
//! - [`repair`] - The generate, execute, evaluate, repair state machine
//! - [`store`] - Saving the passing Dockerfile
//! - [`llm`] - Provider clients (OpenAI-compatible, Anthropic)
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod context;
pub mod domain;
pub mod evaluate;
pub mod generation;
pub mod llm;
pub mod prompts;
pub mod repair;
pub mod sandbox;
pub mod security;
pub mod store;
pub mod tools;

// Re-export commonly used types
pub use config::{Config, LlmConfig};
pub use context::{ContextBuilder, ContextError, SourceContext};
pub use domain::{ExampleUsage, GenerationTask};
pub use evaluate::{Verdict, evaluate};
pub use generation::{GenerationError, GenerationRequest, Generator, LlmGenerator};
pub use llm::{LlmClient, LlmError, create_client};
pub use repair::{Attempt, RepairError, RepairOrchestrator, RepairSettings, Report, TerminalStatus};
pub use sandbox::{DockerSandbox, ExecutionResult, Sandbox};
pub use store::{ArtifactStore, FsArtifactStore};
