//! Suite install layout.
//!
//! ```text
//! <root>/
//! └── repository/
//!     ├── testcases/   module *.config files and their artifacts
//!     ├── plans/       <plan>.xml
//!     ├── results/     one numbered directory per session
//!     └── logs/        created on demand
//! ```

use std::path::{Path, PathBuf};

pub type LayoutResult<T> = Result<T, LayoutError>;

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("{what} directory not found: {path}")]
    NotFound { what: &'static str, path: PathBuf },

    #[error("Failed to create {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Resolves the well-known directories of a suite install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteLayout {
    root: PathBuf,
}

impl SuiteLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repository_dir(&self) -> PathBuf {
        self.root.join("repository")
    }

    pub fn testcases_dir(&self) -> LayoutResult<PathBuf> {
        self.existing("testcases")
    }

    pub fn plans_dir(&self) -> LayoutResult<PathBuf> {
        self.existing("plans")
    }

    pub fn results_dir(&self) -> LayoutResult<PathBuf> {
        self.existing("results")
    }

    /// Returns the logs directory, creating it if needed.
    pub fn logs_dir(&self) -> LayoutResult<PathBuf> {
        let path = self.repository_dir().join("logs");
        std::fs::create_dir_all(&path).map_err(|source| LayoutError::Create {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Path of the plan file for `name`.
    pub fn plan_path(&self, name: &str) -> LayoutResult<PathBuf> {
        Ok(self.plans_dir()?.join(format!("{}.xml", name)))
    }

    fn existing(&self, what: &'static str) -> LayoutResult<PathBuf> {
        let path = self.repository_dir().join(what);
        if path.is_dir() {
            Ok(path)
        } else {
            Err(LayoutError::NotFound { what, path })
        }
    }
}
