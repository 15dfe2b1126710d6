//! Sandboxed Executor
//!
//! Builds a candidate Dockerfile together with the source script and runs the
//! resulting image against the example input under resource ceilings.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

mod docker;
mod guard;

pub use docker::DockerSandbox;

/// Outcome of one build-and-run; never mutated after creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionResult {
    /// The image could not be built (includes build timeouts and launch failures)
    BuildFailed { log: String },

    /// The container exited non-zero
    RunFailed { exit_code: i32, stderr: String },

    /// The run phase or the overall budget ran out
    RunTimedOut { limit: Duration },

    /// The container exited zero
    Completed {
        stdout: String,
        exit_code: i32,
        duration: Duration,
    },
}

impl ExecutionResult {
    pub fn is_completed(&self) -> bool {
        matches!(self, ExecutionResult::Completed { .. })
    }

    /// Short label for logs and the attempt table
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionResult::BuildFailed { .. } => "build failed",
            ExecutionResult::RunFailed { .. } => "run failed",
            ExecutionResult::RunTimedOut { .. } => "timed out",
            ExecutionResult::Completed { .. } => "completed",
        }
    }
}

/// Builds and runs candidates in isolation
///
/// Implementations always return a result; infrastructure failures are folded
/// into the phase they happened in.
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn execute(&self, artifact: &str, stdin: &str) -> ExecutionResult;
}
