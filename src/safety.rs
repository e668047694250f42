use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directories under the root that a patch run never writes into.
const FORBIDDEN_DIRS: &[&str] = &[".git", "node_modules"];

/// Resolves target paths against the patch root and keeps every write inside it.
#[derive(Debug, Clone)]
pub struct RootGuard {
    /// Canonical path to the root directory
    root: PathBuf,
    /// Canonical paths to forbidden directories
    forbidden_paths: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Path is outside root: {path} (root: {root})")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("Path is in forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("Failed to canonicalize {path}: {source}")]
    Canonicalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RootGuard {
    /// Create a guard for `root`, which must exist.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let root = canonicalize(root.as_ref())?;

        let forbidden_paths = FORBIDDEN_DIRS
            .iter()
            .filter_map(|dir| root.join(dir).canonicalize().ok())
            .collect();

        Ok(Self {
            root,
            forbidden_paths,
        })
    }

    /// Resolve `path` (relative paths are taken against the root) and check it.
    ///
    /// Returns the canonical absolute path. Symlinks are followed, so a link
    /// inside the root that points outside it is rejected.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        let canonical = canonicalize(&absolute)?;

        if !canonical.starts_with(&self.root) {
            return Err(SafetyError::OutsideRoot {
                path: canonical,
                root: self.root.clone(),
            });
        }

        for forbidden in &self.forbidden_paths {
            if canonical.starts_with(forbidden) {
                return Err(SafetyError::ForbiddenPath {
                    path: canonical,
                    forbidden: forbidden.clone(),
                });
            }
        }

        Ok(canonical)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn canonicalize(path: &Path) -> Result<PathBuf, SafetyError> {
    path.canonicalize().map_err(|source| {
        if source.kind() == ErrorKind::NotFound {
            SafetyError::NotFound(path.to_path_buf())
        } else {
            SafetyError::Canonicalize {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}
