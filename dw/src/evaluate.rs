//! Output Evaluator
//!
//! Compares a completed run's stdout with the expected output after
//! normalization. Anything other than a completed run is a failure whose
//! summary carries the execution detail verbatim.

use serde::Serialize;
use tracing::debug;

use crate::sandbox::ExecutionResult;

/// Pass/fail with a human-readable explanation on failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail { diff_summary: String },
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

/// Line endings unified to LF, trailing whitespace per line and trailing blank
/// lines removed
pub fn normalize(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = unified.lines().map(str::trim_end).collect();
    let keep = lines.iter().rposition(|l| !l.is_empty()).map_or(0, |i| i + 1);
    lines[..keep].join("\n")
}

/// Judge an execution result against the expected output
pub fn evaluate(result: &ExecutionResult, expected: &str) -> Verdict {
    debug!(outcome = result.label(), "evaluate: called");
    match result {
        ExecutionResult::Completed { stdout, .. } => {
            let actual = normalize(stdout);
            let wanted = normalize(expected);
            if actual == wanted {
                debug!("evaluate: output matches");
                Verdict::Pass
            } else {
                debug!("evaluate: output mismatch");
                Verdict::Fail {
                    diff_summary: mismatch_summary(&wanted, &actual),
                }
            }
        }
        ExecutionResult::BuildFailed { log } => Verdict::Fail {
            diff_summary: format!("Docker build failed:\n{}", log),
        },
        ExecutionResult::RunFailed { exit_code, stderr } => Verdict::Fail {
            diff_summary: format!("Container exited with code {}:\n{}", exit_code, stderr),
        },
        ExecutionResult::RunTimedOut { limit } => Verdict::Fail {
            diff_summary: format!("Execution timed out after {} seconds", limit.as_secs()),
        },
    }
}

fn mismatch_summary(expected: &str, actual: &str) -> String {
    let mut summary = format!("Expected output:\n{}\n\nActual output:\n{}", expected, actual);

    let mut expected_lines = expected.lines();
    let mut actual_lines = actual.lines();
    let mut number = 1;
    loop {
        match (expected_lines.next(), actual_lines.next()) {
            (Some(e), Some(a)) if e == a => number += 1,
            (None, None) => break,
            (e, a) => {
                summary.push_str(&format!(
                    "\n\nFirst difference at line {}:\n  expected: {}\n  actual:   {}",
                    number,
                    e.unwrap_or("<missing>"),
                    a.unwrap_or("<missing>")
                ));
                break;
            }
        }
    }
    summary
}
