//! Persistence of the most recent connection-tracking report.
//!
//! The file is fully overwritten each cycle. Writes go through a sibling
//! temporary file and a rename so a crash never leaves a truncated
//! baseline behind.

use std::path::{Path, PathBuf};

use tcpscope_common::error::{Result, TcpscopeError};

/// File-backed store for the previous report.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Creates a store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` if a snapshot has been written.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Reads the stored report.
    ///
    /// # Errors
    ///
    /// Returns [`TcpscopeError::NotFound`] if no snapshot exists, or an I/O
    /// error if it cannot be read.
    pub fn load(&self) -> Result<String> {
        std::fs::read_to_string(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TcpscopeError::NotFound {
                    kind: "snapshot",
                    id: self.path.display().to_string(),
                }
            } else {
                TcpscopeError::Io {
                    path: self.path.clone(),
                    source: e,
                }
            }
        })
    }

    /// Replaces the stored report.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory, temporary file, or rename
    /// fails.
    pub fn save(&self, report: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| TcpscopeError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let tmp = self.tmp_path();
        std::fs::write(&tmp, report).map_err(|e| TcpscopeError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(TcpscopeError::Io {
                path: self.path.clone(),
                source: e,
            });
        }
        tracing::trace!(path = %self.path.display(), bytes = report.len(), "snapshot saved");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}
