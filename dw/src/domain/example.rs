//! Example usage file parsing
//!
//! ```text
//! INPUT:
//! Hello world
//! EXPECTED_OUTPUT:
//! world Hello
//! ```
//!
//! A marker may also carry its value on the same line (`INPUT: Hello world`).
//! Lines before the first marker are ignored. Each section is trimmed of
//! surrounding whitespace.

use thiserror::Error;
use tracing::debug;

const INPUT_MARKER: &str = "INPUT:";
const EXPECTED_MARKER: &str = "EXPECTED_OUTPUT:";

#[derive(Debug, Error)]
pub enum ExampleError {
    #[error("example file has no {0} section")]
    MissingSection(&'static str),

    #[error("example file has more than one {0} section")]
    DuplicateSection(&'static str),
}

/// Known input and the output a correct container must print for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExampleUsage {
    pub input: String,
    pub expected_output: String,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Input,
    Expected,
}

impl ExampleUsage {
    pub fn new(input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
        }
    }

    pub fn parse(text: &str) -> Result<Self, ExampleError> {
        debug!(len = text.len(), "ExampleUsage::parse: called");
        let mut input: Option<Vec<&str>> = None;
        let mut expected: Option<Vec<&str>> = None;
        let mut current = Section::Preamble;

        for line in text.lines() {
            let trimmed = line.trim_start();
            if let Some(rest) = trimmed.strip_prefix(INPUT_MARKER) {
                if input.is_some() {
                    return Err(ExampleError::DuplicateSection(INPUT_MARKER));
                }
                input = Some(vec![rest]);
                current = Section::Input;
            } else if let Some(rest) = trimmed.strip_prefix(EXPECTED_MARKER) {
                if expected.is_some() {
                    return Err(ExampleError::DuplicateSection(EXPECTED_MARKER));
                }
                expected = Some(vec![rest]);
                current = Section::Expected;
            } else {
                let target = match current {
                    Section::Preamble => continue,
                    Section::Input => input.as_mut(),
                    Section::Expected => expected.as_mut(),
                };
                if let Some(lines) = target {
                    lines.push(line);
                }
            }
        }

        let input = input.ok_or(ExampleError::MissingSection(INPUT_MARKER))?;
        let expected = expected.ok_or(ExampleError::MissingSection(EXPECTED_MARKER))?;

        Ok(Self {
            input: input.join("\n").trim().to_string(),
            expected_output: expected.join("\n").trim().to_string(),
        })
    }

    /// Bytes written to the container's stdin
    ///
    /// Non-empty input gets a trailing newline so line-oriented readers see
    /// a complete final line.
    pub fn stdin_payload(&self) -> String {
        if self.input.is_empty() || self.input.ends_with('\n') {
            self.input.clone()
        } else {
            format!("{}\n", self.input)
        }
    }
}
