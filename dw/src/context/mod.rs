//! Context Builder
//!
//! Decides how a source file is presented to the generator: small files are
//! embedded verbatim, anything at or above the threshold is described by size
//! and language only and exposed through a search capability.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

mod search;

pub use search::{
    FileSearcher, LineMatch, NumberedLine, SearchError, SearchQuery, SearchResult, SourceSearch,
};

use crate::config::ContextConfig;

/// Bytes read from the head of a file when looking for a shebang
const SHEBANG_PROBE_BYTES: usize = 256;

/// Failure to size or read the source; fatal for the task
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("cannot stat source file {path}: {source}")]
    Unsized {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("source path {path} is not a regular file")]
    NotAFile { path: PathBuf },

    #[error("cannot read source file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("source file {path} is not valid UTF-8")]
    Decode { path: PathBuf },
}

/// Coarse language classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageHint {
    Python,
    JavaScript,
    TypeScript,
    Shell,
    Ruby,
    Go,
    Rust,
    Java,
    C,
    Cpp,
    Php,
    Perl,
    R,
    Swift,
    Kotlin,
    CSharp,
    Scala,
    Lua,
    Unknown,
}

impl LanguageHint {
    /// Classify by extension, then by shebang line
    pub fn detect(path: &Path) -> Self {
        let by_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| Self::from_extension(&e.to_ascii_lowercase()))
            .unwrap_or(LanguageHint::Unknown);
        if by_ext != LanguageHint::Unknown {
            return by_ext;
        }

        match read_first_line(path) {
            Some(line) => Self::from_shebang(&line),
            None => LanguageHint::Unknown,
        }
    }

    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "py" | "pyw" => LanguageHint::Python,
            "js" | "mjs" | "cjs" => LanguageHint::JavaScript,
            "ts" => LanguageHint::TypeScript,
            "sh" | "bash" => LanguageHint::Shell,
            "rb" => LanguageHint::Ruby,
            "go" => LanguageHint::Go,
            "rs" => LanguageHint::Rust,
            "java" => LanguageHint::Java,
            "c" => LanguageHint::C,
            "cpp" | "cc" | "cxx" => LanguageHint::Cpp,
            "php" => LanguageHint::Php,
            "pl" => LanguageHint::Perl,
            "r" => LanguageHint::R,
            "swift" => LanguageHint::Swift,
            "kt" => LanguageHint::Kotlin,
            "cs" => LanguageHint::CSharp,
            "scala" => LanguageHint::Scala,
            "lua" => LanguageHint::Lua,
            _ => LanguageHint::Unknown,
        }
    }

    /// Interpret a `#!` line such as `#!/usr/bin/env -S python3 -u`
    pub fn from_shebang(line: &str) -> Self {
        let Some(rest) = line.strip_prefix("#!") else {
            return LanguageHint::Unknown;
        };
        let mut words = rest.split_whitespace();
        let Some(program) = words.next() else {
            return LanguageHint::Unknown;
        };
        let mut interpreter = program.rsplit('/').next().unwrap_or(program);
        if interpreter == "env" {
            interpreter = match words.find(|w| !w.starts_with('-')) {
                Some(w) => w,
                None => return LanguageHint::Unknown,
            };
        }

        // python3.12 -> python, node18 -> node
        let name = interpreter.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.');
        match name {
            "python" | "pypy" => LanguageHint::Python,
            "node" | "nodejs" | "deno" | "bun" => LanguageHint::JavaScript,
            "ts-node" => LanguageHint::TypeScript,
            "sh" | "bash" | "zsh" | "dash" | "ksh" => LanguageHint::Shell,
            "ruby" => LanguageHint::Ruby,
            "perl" => LanguageHint::Perl,
            "php" => LanguageHint::Php,
            "Rscript" => LanguageHint::R,
            "lua" => LanguageHint::Lua,
            _ => LanguageHint::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LanguageHint::Python => "Python",
            LanguageHint::JavaScript => "JavaScript",
            LanguageHint::TypeScript => "TypeScript",
            LanguageHint::Shell => "Shell",
            LanguageHint::Ruby => "Ruby",
            LanguageHint::Go => "Go",
            LanguageHint::Rust => "Rust",
            LanguageHint::Java => "Java",
            LanguageHint::C => "C",
            LanguageHint::Cpp => "C++",
            LanguageHint::Php => "PHP",
            LanguageHint::Perl => "Perl",
            LanguageHint::R => "R",
            LanguageHint::Swift => "Swift",
            LanguageHint::Kotlin => "Kotlin",
            LanguageHint::CSharp => "C#",
            LanguageHint::Scala => "Scala",
            LanguageHint::Lua => "Lua",
            LanguageHint::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LanguageHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn read_first_line(path: &Path) -> Option<String> {
    let mut buf = [0u8; SHEBANG_PROBE_BYTES];
    let n = File::open(path).ok()?.read(&mut buf).ok()?;
    let head = String::from_utf8_lossy(&buf[..n]);
    head.lines().next().map(str::to_string)
}

/// How the source file is presented to the generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceContext {
    /// Full text of a file below the threshold
    Embedded {
        file_name: String,
        language: LanguageHint,
        content: String,
    },
    /// Descriptor of a file at or above the threshold; never carries content
    Searchable {
        path: PathBuf,
        file_name: String,
        size: u64,
        language: LanguageHint,
    },
}

impl SourceContext {
    pub fn file_name(&self) -> &str {
        match self {
            SourceContext::Embedded { file_name, .. } | SourceContext::Searchable { file_name, .. } => file_name,
        }
    }

    pub fn language(&self) -> LanguageHint {
        match self {
            SourceContext::Embedded { language, .. } | SourceContext::Searchable { language, .. } => *language,
        }
    }

    pub fn is_searchable(&self) -> bool {
        matches!(self, SourceContext::Searchable { .. })
    }
}

/// Builds a `SourceContext` from a file, once per task
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    config: ContextConfig,
}

impl ContextBuilder {
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    pub fn threshold(&self) -> u64 {
        self.config.embed_threshold_bytes
    }

    pub fn build(&self, path: &Path) -> Result<SourceContext, ContextError> {
        debug!(?path, threshold = self.threshold(), "ContextBuilder::build: called");
        let metadata = fs::metadata(path).map_err(|source| ContextError::Unsized {
            path: path.to_path_buf(),
            source,
        })?;
        if !metadata.is_file() {
            return Err(ContextError::NotAFile {
                path: path.to_path_buf(),
            });
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let language = LanguageHint::detect(path);
        let size = metadata.len();

        if size < self.threshold() {
            let bytes = fs::read(path).map_err(|source| ContextError::Unreadable {
                path: path.to_path_buf(),
                source,
            })?;
            // The file may have grown since it was measured
            if (bytes.len() as u64) < self.threshold() {
                let content = String::from_utf8(bytes).map_err(|_| ContextError::Decode {
                    path: path.to_path_buf(),
                })?;
                info!(%file_name, size, %language, "Embedding source file");
                return Ok(SourceContext::Embedded {
                    file_name,
                    language,
                    content,
                });
            }
        }

        info!(%file_name, size, %language, "Source file exposed via search");
        Ok(SourceContext::Searchable {
            path: path.to_path_buf(),
            file_name,
            size,
            language,
        })
    }

    /// Search capability for a searchable context; `None` when embedded
    pub fn search_capability(&self, context: &SourceContext) -> Option<Arc<dyn SourceSearch>> {
        match context {
            SourceContext::Searchable { path, .. } => {
                Some(Arc::new(FileSearcher::new(path.clone(), &self.config)) as Arc<dyn SourceSearch>)
            }
            SourceContext::Embedded { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn builder(threshold: u64) -> ContextBuilder {
        ContextBuilder::new(ContextConfig {
            embed_threshold_bytes: threshold,
            ..ContextConfig::default()
        })
    }

    #[test]
    fn test_small_file_is_embedded() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "reverse.py", b"import sys\nprint(' '.join(reversed(input().split())))\n");

        let builder = ContextBuilder::default();
        let context = builder.build(&path).unwrap();
        match &context {
            SourceContext::Embedded {
                file_name,
                language,
                content,
            } => {
                assert_eq!(file_name, "reverse.py");
                assert_eq!(*language, LanguageHint::Python);
                assert!(content.contains("reversed"));
            }
            other => panic!("expected Embedded, got {:?}", other),
        }
        assert!(builder.search_capability(&context).is_none());
    }

    #[test]
    fn test_threshold_boundary() {
        let dir = TempDir::new().unwrap();
        let threshold = 64;
        let builder = builder(threshold);

        let below = write(&dir, "below.sh", &vec![b'a'; threshold as usize - 1]);
        let at = write(&dir, "at.sh", &vec![b'a'; threshold as usize]);
        let above = write(&dir, "above.sh", &vec![b'a'; threshold as usize + 1]);

        assert!(!builder.build(&below).unwrap().is_searchable());
        assert!(builder.build(&at).unwrap().is_searchable());
        assert!(builder.build(&above).unwrap().is_searchable());
    }

    #[test]
    fn test_searchable_carries_size_not_content() {
        let dir = TempDir::new().unwrap();
        let source = b"const fs = require('fs');\nconsole.log(1);\n";
        let path = write(&dir, "big.js", source);
        let builder = builder(10);

        let context = builder.build(&path).unwrap();
        match &context {
            SourceContext::Searchable { size, language, .. } => {
                assert_eq!(*size, source.len() as u64);
                assert_eq!(*language, LanguageHint::JavaScript);
            }
            other => panic!("expected Searchable, got {:?}", other),
        }

        let search = builder.search_capability(&context).unwrap();
        let result = search.search(&SearchQuery::new("require")).unwrap();
        assert_eq!(result.match_count(), 1);
    }

    #[test]
    fn test_missing_file_is_context_error() {
        let err = ContextBuilder::default().build(Path::new("/nonexistent/script.py")).unwrap_err();
        assert!(matches!(err, ContextError::Unsized { .. }));
    }

    #[test]
    fn test_directory_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = ContextBuilder::default().build(dir.path()).unwrap_err();
        assert!(matches!(err, ContextError::NotAFile { .. }));
    }

    #[test]
    fn test_invalid_utf8_is_decode_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "blob.py", &[0x66, 0x6f, 0xff, 0xfe, 0x0a]);
        let err = ContextBuilder::default().build(&path).unwrap_err();
        assert!(matches!(err, ContextError::Decode { .. }));
    }

    #[test]
    fn test_language_from_shebang() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "tool", b"#!/usr/bin/env python3\nprint('hi')\n");
        assert_eq!(LanguageHint::detect(&path), LanguageHint::Python);

        assert_eq!(LanguageHint::from_shebang("#!/bin/bash"), LanguageHint::Shell);
        assert_eq!(LanguageHint::from_shebang("#!/usr/bin/env -S node --no-warnings"), LanguageHint::JavaScript);
        assert_eq!(LanguageHint::from_shebang("#!/usr/bin/python3.12 -u"), LanguageHint::Python);
        assert_eq!(LanguageHint::from_shebang("import os"), LanguageHint::Unknown);
    }

    #[test]
    fn test_language_from_extension() {
        assert_eq!(LanguageHint::detect(Path::new("Main.java")), LanguageHint::Java);
        assert_eq!(LanguageHint::detect(Path::new("analyzer.CPP")), LanguageHint::Cpp);
        assert_eq!(LanguageHint::detect(Path::new("url_encoder.rs")), LanguageHint::Rust);
        assert_eq!(LanguageHint::Cpp.to_string(), "C++");
    }
}
