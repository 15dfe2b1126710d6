//! On-demand search over a source file too large to embed
//!
//! Matching is a case-sensitive regex streamed line by line through
//! grep-searcher, so the file is never held in memory as a whole. A pattern
//! that does not compile is searched as a literal substring instead.

use std::fmt;
use std::io;
use std::path::PathBuf;

use grep_regex::{RegexMatcher, RegexMatcherBuilder};
use grep_searcher::{BinaryDetection, Searcher, SearcherBuilder, Sink, SinkContext, SinkContextKind, SinkMatch};
use thiserror::Error;
use tracing::debug;

use crate::config::ContextConfig;

/// A search request from the generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub pattern: String,
    /// Lines of context around each match; the searcher's default when absent
    pub context_lines: Option<usize>,
}

impl SearchQuery {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            context_lines: None,
        }
    }

    pub fn with_context(mut self, lines: usize) -> Self {
        self.context_lines = Some(lines);
        self
    }
}

/// A single line with its 1-based number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberedLine {
    pub number: u64,
    pub text: String,
}

/// One matching line plus its surrounding window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMatch {
    pub line: NumberedLine,
    pub before: Vec<NumberedLine>,
    pub after: Vec<NumberedLine>,
}

/// Outcome of a search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchResult {
    Matches {
        matches: Vec<LineMatch>,
        /// More matches existed beyond the result cap
        truncated: bool,
        /// The pattern did not compile and was matched literally
        literal: bool,
    },
    NoMatch,
}

impl SearchResult {
    pub fn match_count(&self) -> usize {
        match self {
            SearchResult::Matches { matches, .. } => matches.len(),
            SearchResult::NoMatch => 0,
        }
    }
}

/// Renders the grep-style text handed back to the model
impl fmt::Display for SearchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (matches, truncated, literal) = match self {
            SearchResult::NoMatch => return write!(f, "No matches found."),
            SearchResult::Matches {
                matches,
                truncated,
                literal,
            } => (matches, *truncated, *literal),
        };

        if literal {
            writeln!(f, "(pattern is not a valid regex; matched as literal text)")?;
        }
        for (i, m) in matches.iter().enumerate() {
            if i > 0 && (!m.before.is_empty() || !matches[i - 1].after.is_empty()) {
                writeln!(f, "--")?;
            }
            for line in &m.before {
                writeln!(f, "{}- {}", line.number, line.text)?;
            }
            writeln!(f, "{}: {}", m.line.number, m.line.text)?;
            for line in &m.after {
                writeln!(f, "{}- {}", line.number, line.text)?;
            }
        }
        if truncated {
            writeln!(f, "[results truncated at {} matches]", matches.len())?;
        }
        Ok(())
    }
}

/// Search failures; a bad pattern is never one of them
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("failed to search {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("pattern could not be compiled even as a literal: {0}")]
    Pattern(String),
}

/// Capability handed to the generator for a searchable source
pub trait SourceSearch: Send + Sync {
    fn search(&self, query: &SearchQuery) -> Result<SearchResult, SearchError>;
}

/// Streams a single file through grep-searcher
#[derive(Debug, Clone)]
pub struct FileSearcher {
    path: PathBuf,
    max_results: usize,
    default_context_lines: usize,
    max_context_lines: usize,
}

impl FileSearcher {
    pub fn new(path: impl Into<PathBuf>, config: &ContextConfig) -> Self {
        Self {
            path: path.into(),
            max_results: config.max_search_results.max(1),
            default_context_lines: config.default_context_lines,
            max_context_lines: config.max_context_lines,
        }
    }

    /// Compile `pattern` as a regex, falling back to an escaped literal
    fn build_matcher(pattern: &str) -> Result<(RegexMatcher, bool), SearchError> {
        match RegexMatcherBuilder::new().build(pattern) {
            Ok(m) => Ok((m, false)),
            Err(e) => {
                debug!(%pattern, error = %e, "build_matcher: invalid regex, using literal match");
                RegexMatcherBuilder::new()
                    .build(&regex::escape(pattern))
                    .map(|m| (m, true))
                    .map_err(|e| SearchError::Pattern(e.to_string()))
            }
        }
    }
}

impl SourceSearch for FileSearcher {
    fn search(&self, query: &SearchQuery) -> Result<SearchResult, SearchError> {
        let context_lines = query
            .context_lines
            .unwrap_or(self.default_context_lines)
            .min(self.max_context_lines);
        debug!(pattern = %query.pattern, context_lines, path = ?self.path, "FileSearcher::search: called");

        let (matcher, literal) = Self::build_matcher(&query.pattern)?;

        let mut searcher = SearcherBuilder::new()
            .binary_detection(BinaryDetection::quit(b'\x00'))
            .line_number(true)
            .before_context(context_lines)
            .after_context(context_lines)
            .build();

        let mut collector = Collector::new(self.max_results);
        searcher
            .search_path(&matcher, &self.path, &mut collector)
            .map_err(|source| SearchError::Io {
                path: self.path.clone(),
                source,
            })?;

        debug!(
            matches = collector.matches.len(),
            truncated = collector.truncated,
            "FileSearcher::search: done"
        );
        if collector.matches.is_empty() {
            return Ok(SearchResult::NoMatch);
        }
        Ok(SearchResult::Matches {
            matches: collector.matches,
            truncated: collector.truncated,
            literal,
        })
    }
}

/// Sink that groups context lines with the match they belong to
struct Collector {
    max: usize,
    matches: Vec<LineMatch>,
    pending_before: Vec<NumberedLine>,
    truncated: bool,
}

impl Collector {
    fn new(max: usize) -> Self {
        Self {
            max,
            matches: Vec::new(),
            pending_before: Vec::new(),
            truncated: false,
        }
    }
}

fn numbered(number: Option<u64>, bytes: &[u8]) -> NumberedLine {
    NumberedLine {
        number: number.unwrap_or(0),
        text: String::from_utf8_lossy(bytes).trim_end_matches(['\r', '\n']).to_string(),
    }
}

impl Sink for Collector {
    type Error = io::Error;

    fn matched(&mut self, _searcher: &Searcher, mat: &SinkMatch<'_>) -> Result<bool, io::Error> {
        if self.matches.len() >= self.max {
            self.truncated = true;
            return Ok(false);
        }
        let before = std::mem::take(&mut self.pending_before);
        self.matches.push(LineMatch {
            line: numbered(mat.line_number(), mat.bytes()),
            before,
            after: Vec::new(),
        });
        Ok(true)
    }

    fn context(&mut self, _searcher: &Searcher, ctx: &SinkContext<'_>) -> Result<bool, io::Error> {
        let line = numbered(ctx.line_number(), ctx.bytes());
        match ctx.kind() {
            SinkContextKind::Before => self.pending_before.push(line),
            SinkContextKind::After => {
                if let Some(last) = self.matches.last_mut() {
                    last.after.push(line);
                }
            }
            SinkContextKind::Other => {}
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn source(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn searcher(file: &NamedTempFile) -> FileSearcher {
        FileSearcher::new(file.path(), &ContextConfig::default())
    }

    const SCRIPT: &str = "#!/usr/bin/env python3\nimport os\nimport sys\n\n\ndef main():\n    print(sys.argv)\n\n\nif __name__ == '__main__':\n    main()\n";

    #[test]
    fn test_regex_match_with_line_numbers() {
        let file = source(SCRIPT);
        let result = searcher(&file).search(&SearchQuery::new("^import").with_context(0)).unwrap();

        let SearchResult::Matches { matches, truncated, literal } = result else {
            panic!("expected matches");
        };
        assert!(!truncated);
        assert!(!literal);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].line.number, 2);
        assert_eq!(matches[0].line.text, "import os");
        assert_eq!(matches[1].line.number, 3);
    }

    #[test]
    fn test_search_is_case_sensitive() {
        let file = source(SCRIPT);
        let result = searcher(&file).search(&SearchQuery::new("IMPORT")).unwrap();
        assert_eq!(result, SearchResult::NoMatch);
    }

    #[test]
    fn test_context_window_is_attached() {
        let file = source(SCRIPT);
        let result = searcher(&file).search(&SearchQuery::new("def main").with_context(1)).unwrap();

        let SearchResult::Matches { matches, .. } = result else {
            panic!("expected matches");
        };
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].line.number, 6);
        assert_eq!(matches[0].before.len(), 1);
        assert_eq!(matches[0].before[0].number, 5);
        assert_eq!(matches[0].after[0].text, "    print(sys.argv)");
    }

    #[test]
    fn test_malformed_pattern_falls_back_to_literal() {
        let file = source("value = compute(a, b\nother = (x\n");
        let result = searcher(&file).search(&SearchQuery::new("compute(a")).unwrap();

        let SearchResult::Matches { matches, literal, .. } = result else {
            panic!("expected literal matches");
        };
        assert!(literal);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].line.number, 1);
    }

    #[test]
    fn test_result_cap_sets_truncated() {
        let content: String = (0..80).map(|i| format!("require('mod{}')\n", i)).collect();
        let file = source(&content);
        let result = searcher(&file).search(&SearchQuery::new("require").with_context(0)).unwrap();

        assert_eq!(result.match_count(), 50);
        assert!(matches!(result, SearchResult::Matches { truncated: true, .. }));
    }

    #[test]
    fn test_context_lines_are_capped() {
        let content: String = (1..=40).map(|i| format!("line {}\n", i)).collect();
        let file = source(&content);
        let result = searcher(&file).search(&SearchQuery::new("line 20").with_context(100)).unwrap();

        let SearchResult::Matches { matches, .. } = result else {
            panic!("expected matches");
        };
        assert_eq!(matches[0].before.len(), 10);
        assert_eq!(matches[0].after.len(), 10);
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let searcher = FileSearcher::new("/nonexistent/big.py", &ContextConfig::default());
        assert!(matches!(
            searcher.search(&SearchQuery::new("x")),
            Err(SearchError::Io { .. })
        ));
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(SearchResult::NoMatch.to_string(), "No matches found.");

        let file = source(SCRIPT);
        let rendered = searcher(&file)
            .search(&SearchQuery::new("^import os").with_context(1))
            .unwrap()
            .to_string();
        assert!(rendered.contains("1- #!/usr/bin/env python3"));
        assert!(rendered.contains("2: import os"));
        assert!(rendered.contains("3- import sys"));
    }
}
