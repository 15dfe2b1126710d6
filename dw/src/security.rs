//! Input validation ahead of the repair loop
//!
//! Path checks, size limits and a coarse prompt-injection screen for the files
//! a user points the tool at.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use thiserror::Error;
use tracing::debug;

/// More shell metacharacter sequences than this looks like command smuggling
const MAX_SHELL_SEQUENCES: usize = 5;

static INJECTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"ignore\s+(all\s+)?previous\s+instructions",
        r"forget\s+(all\s+)?(previous\s+)?(context|instructions)",
        r"new\s+instructions\s*:",
        r"(override|disregard)\s+(all\s+)?previous",
        r"execute\s+.*\s+code",
        r"run\s+.*\s+command",
        r"system\s+command",
    ]
    .iter()
    .filter_map(|p| RegexBuilder::new(p).case_insensitive(true).build().ok())
    .collect()
});

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("not a regular file: {0}")]
    NotAFile(PathBuf),

    #[error("{path} is outside the allowed directory {base}")]
    OutsideBase { path: PathBuf, base: PathBuf },

    #[error("{path} is {size} bytes, over the {max} byte limit")]
    TooLarge { path: PathBuf, size: u64, max: u64 },

    #[error("possible prompt injection in {path}: {reason}")]
    Injection { path: PathBuf, reason: String },

    #[error("failed to inspect {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Canonicalize `path` and require a regular file, inside `base_dir` if given
pub fn validate_file_path(path: &Path, base_dir: Option<&Path>) -> Result<PathBuf, SecurityError> {
    debug!(?path, ?base_dir, "validate_file_path: called");
    let resolved = path.canonicalize().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SecurityError::NotFound(path.to_path_buf()),
        _ => SecurityError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    if !resolved.is_file() {
        return Err(SecurityError::NotAFile(resolved));
    }

    if let Some(base) = base_dir {
        let base = base.canonicalize().map_err(|source| SecurityError::Io {
            path: base.to_path_buf(),
            source,
        })?;
        if !resolved.starts_with(&base) {
            return Err(SecurityError::OutsideBase { path: resolved, base });
        }
    }
    Ok(resolved)
}

/// Reject files larger than `max` bytes
pub fn check_file_size(path: &Path, max: u64) -> Result<u64, SecurityError> {
    let size = std::fs::metadata(path)
        .map_err(|source| SecurityError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .len();
    debug!(?path, size, max, "check_file_size: called");
    if size > max {
        return Err(SecurityError::TooLarge {
            path: path.to_path_buf(),
            size,
            max,
        });
    }
    Ok(size)
}

/// Reason the text looks like an injection attempt, if it does
pub fn detect_prompt_injection(text: &str) -> Option<String> {
    if let Some(re) = INJECTION_PATTERNS.iter().find(|re| re.is_match(text)) {
        debug!(pattern = %re.as_str(), "detect_prompt_injection: phrase matched");
        return Some(format!("matches suspicious phrase /{}/", re.as_str()));
    }

    let sequences = text.matches("&&").count() + text.matches(';').count() + text.matches('|').count();
    if sequences > MAX_SHELL_SEQUENCES {
        debug!(sequences, "detect_prompt_injection: too many shell metacharacters");
        return Some(format!("contains {} shell metacharacter sequences", sequences));
    }
    None
}

/// Drop NUL and control characters other than newline, tab and carriage return
pub fn sanitize_stdin(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t' | '\r'))
        .collect()
}
