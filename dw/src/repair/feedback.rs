//! Repair feedback carried from a failed attempt into the next generation

use serde::Serialize;

use crate::sandbox::ExecutionResult;

/// Marker placed where long feedback was cut
const TRUNCATION_MARKER: &str = "...[truncated]...\n";

/// Which stage the failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Generation,
    Build,
    Run,
    Timeout,
    Mismatch,
}

impl FailureKind {
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::Generation => "generation failure",
            FailureKind::Build => "build failure",
            FailureKind::Run => "run failure",
            FailureKind::Timeout => "timeout",
            FailureKind::Mismatch => "output mismatch",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A completed run only fails on mismatch
impl From<&ExecutionResult> for FailureKind {
    fn from(result: &ExecutionResult) -> Self {
        match result {
            ExecutionResult::BuildFailed { .. } => FailureKind::Build,
            ExecutionResult::RunFailed { .. } => FailureKind::Run,
            ExecutionResult::RunTimedOut { .. } => FailureKind::Timeout,
            ExecutionResult::Completed { .. } => FailureKind::Mismatch,
        }
    }
}

/// Diagnostic text for the next round
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairFeedback {
    pub kind: FailureKind,
    pub detail: String,
}

impl RepairFeedback {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Copy whose detail keeps at most `max_chars` characters of the tail
    ///
    /// Errors show up at the end of build and run logs, so the head is what
    /// gets dropped.
    pub fn truncated(&self, max_chars: usize) -> Self {
        Self {
            kind: self.kind,
            detail: truncate_tail(&self.detail, max_chars),
        }
    }
}

fn truncate_tail(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let tail: String = text.chars().skip(total - max_chars).collect();
    format!("{}{}", TRUNCATION_MARKER, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_detail_untouched() {
        let feedback = RepairFeedback::new(FailureKind::Run, "exit 1");
        assert_eq!(feedback.truncated(100), feedback);
    }

    #[test]
    fn test_long_detail_keeps_tail() {
        let detail = format!("{}ERROR: pip failed", "step output\n".repeat(100));
        let feedback = RepairFeedback::new(FailureKind::Build, detail);

        let short = feedback.truncated(17);
        assert_eq!(short.kind, FailureKind::Build);
        assert_eq!(short.detail, "...[truncated]...\nERROR: pip failed");
        assert!(feedback.detail.len() > 1000);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let feedback = RepairFeedback::new(FailureKind::Mismatch, "ééééé");
        assert_eq!(feedback.truncated(2).detail, "...[truncated]...\néé");
    }

    #[test]
    fn test_kind_from_execution_result() {
        let timed_out = ExecutionResult::RunTimedOut {
            limit: std::time::Duration::from_secs(30),
        };
        assert_eq!(FailureKind::from(&timed_out), FailureKind::Timeout);

        let crashed = ExecutionResult::RunFailed {
            exit_code: 1,
            stderr: String::new(),
        };
        assert_eq!(FailureKind::from(&crashed), FailureKind::Run);
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(FailureKind::Timeout.to_string(), "timeout");
        assert_eq!(FailureKind::Mismatch.label(), "output mismatch");
    }
}
