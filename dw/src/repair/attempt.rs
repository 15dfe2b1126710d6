//! Attempt history and the final report

use std::path::PathBuf;

use serde::Serialize;

use crate::evaluate::Verdict;
use crate::sandbox::ExecutionResult;

use super::RepairFeedback;

/// What happened after generation in one iteration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// No candidate came back; nothing was executed
    GenerationFailed { error: String },
    Executed(ExecutionResult),
}

/// One iteration of the loop; retained after later attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    /// 1-based
    pub iteration: u32,
    pub artifact: Option<String>,
    pub outcome: AttemptOutcome,
    pub verdict: Verdict,
    /// Full feedback for a failed attempt; the prompt may see a truncated copy
    pub feedback: Option<RepairFeedback>,
}

impl Attempt {
    pub fn passed(&self) -> bool {
        self.verdict.is_pass()
    }

    /// Short outcome label for the attempt table
    pub fn summary(&self) -> String {
        match (&self.outcome, &self.verdict) {
            (AttemptOutcome::GenerationFailed { error }, _) => format!("generation failed: {}", error),
            (AttemptOutcome::Executed(_), Verdict::Pass) => "passed".to_string(),
            (AttemptOutcome::Executed(result), Verdict::Fail { .. }) if result.is_completed() => {
                "output mismatch".to_string()
            }
            (AttemptOutcome::Executed(result), Verdict::Fail { .. }) => result.label().to_string(),
        }
    }
}

/// How the task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TerminalStatus {
    Succeeded { attempt: u32 },
    Exhausted,
}

/// Everything the caller gets back from a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub source: PathBuf,
    pub provider: String,
    pub attempts: Vec<Attempt>,
    pub status: TerminalStatus,
    /// Where the passing Dockerfile was saved
    pub artifact_path: Option<PathBuf>,
    /// Why a passing Dockerfile could not be saved
    pub persist_error: Option<String>,
}

impl Report {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, TerminalStatus::Succeeded { .. })
    }

    /// The passing Dockerfile, if any
    pub fn final_artifact(&self) -> Option<&str> {
        match self.status {
            TerminalStatus::Succeeded { attempt } => self
                .attempts
                .iter()
                .find(|a| a.iteration == attempt)
                .and_then(|a| a.artifact.as_deref()),
            TerminalStatus::Exhausted => None,
        }
    }
}
