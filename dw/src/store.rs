//! Artifact persistence for successful runs

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

/// Give up after this many same-second collisions
const MAX_SUFFIX: u32 = 999;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("source path has no file name: {0}")]
    NoStem(PathBuf),
}

/// Durable home for a passing Dockerfile; write-only from the loop's view
pub trait ArtifactStore: Send + Sync {
    fn save(&self, source: &Path, artifact: &str, at: DateTime<Local>) -> Result<PathBuf, StoreError>;
}

/// Writes `<dir>/<stem>_<YYYYmmdd_HHMMSS>.Dockerfile`
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    dir: PathBuf,
}

impl FsArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_name(stem: &str, stamp: &str, suffix: u32) -> String {
        if suffix == 0 {
            format!("{}_{}.Dockerfile", stem, stamp)
        } else {
            format!("{}_{}_{}.Dockerfile", stem, stamp, suffix)
        }
    }
}

impl ArtifactStore for FsArtifactStore {
    fn save(&self, source: &Path, artifact: &str, at: DateTime<Local>) -> Result<PathBuf, StoreError> {
        debug!(?source, dir = ?self.dir, "FsArtifactStore::save: called");
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .ok_or_else(|| StoreError::NoStem(source.to_path_buf()))?;
        let stamp = at.format("%Y%m%d_%H%M%S").to_string();

        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let write_err = |path: &Path, source: io::Error| StoreError::Write {
            path: path.to_path_buf(),
            source,
        };
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| write_err(&self.dir, e))?;
        tmp.write_all(artifact.as_bytes()).map_err(|e| write_err(tmp.path(), e))?;
        tmp.as_file().sync_all().map_err(|e| write_err(tmp.path(), e))?;

        let mut suffix = 0;
        loop {
            let target = self.dir.join(Self::file_name(&stem, &stamp, suffix));
            match tmp.persist_noclobber(&target) {
                Ok(_) => {
                    info!(path = %target.display(), "Saved Dockerfile");
                    return Ok(target);
                }
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists && suffix < MAX_SUFFIX => {
                    debug!(?target, "FsArtifactStore::save: name taken, trying next suffix");
                    tmp = e.file;
                    suffix += 1;
                }
                Err(e) => return Err(write_err(&target, e.error)),
            }
        }
    }
}
