//! GenerationTask - the input bundle for one run of the repair loop

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use super::ExampleUsage;

/// Everything the orchestrator needs for one task; never mutated once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationTask {
    source: PathBuf,
    example: ExampleUsage,
    provider: String,
    max_iterations: NonZeroU32,
}

impl GenerationTask {
    pub fn new(
        source: impl Into<PathBuf>,
        example: ExampleUsage,
        provider: impl Into<String>,
        max_iterations: NonZeroU32,
    ) -> Self {
        Self {
            source: source.into(),
            example,
            provider: provider.into(),
            max_iterations,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn example(&self) -> &ExampleUsage {
        &self.example
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations.get()
    }
}
