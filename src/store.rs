//! Session-based result store.
//!
//! Each invocation writes into its own session directory under the results
//! directory:
//!
//! ```text
//! results/
//! ├── 0/test_result.xml
//! ├── 1/test_result.xml
//! └── 2/test_result.xml
//! ```
//!
//! Saves replace the file atomically, so a reader (or a crashed run) never
//! sees a half-written result.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::result::{InvocationResult, TestStatus};
use crate::xml::{self, XmlError};

/// Name of the result document inside a session directory.
pub const RESULT_FILE_NAME: &str = "test_result.xml";

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Session {0} not found")]
    SessionNotFound(u32),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: XmlError,
    },

    #[error("Failed to serialize results: {0}")]
    Serialize(#[source] XmlError),

    #[error("Result has no session directory")]
    NoSession,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// One line of `compat list results`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub id: u32,
    pub passed: usize,
    pub failed: usize,
    pub not_executed: usize,
    pub plan: String,
    pub start: i64,
    pub devices: Vec<String>,
}

impl SessionSummary {
    fn from_result(id: u32, result: &InvocationResult) -> Self {
        Self {
            id,
            passed: result.count_results(TestStatus::Pass),
            failed: result.count_results(TestStatus::Fail),
            not_executed: result.count_results(TestStatus::NotExecuted),
            plan: result.suite_plan.clone(),
            start: result.start,
            devices: result.device_serials().map(str::to_string).collect(),
        }
    }
}

/// Reads and writes invocation results under a results directory.
#[derive(Debug, Clone)]
pub struct ResultStore {
    results_dir: PathBuf,
}

impl ResultStore {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
        }
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    pub fn session_dir(&self, id: u32) -> PathBuf {
        self.results_dir.join(id.to_string())
    }

    /// Ids of existing sessions, ascending.
    pub fn session_ids(&self) -> StoreResult<Vec<u32>> {
        let entries = match std::fs::read_dir(&self.results_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.results_dir)(e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_error(&self.results_dir))?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(id) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Allocates the next session id and creates its directory.
    pub fn create_session(&self) -> StoreResult<u32> {
        let id = self
            .session_ids()?
            .last()
            .map_or(0, |last| last + 1);
        let dir = self.session_dir(id);
        std::fs::create_dir_all(&dir).map_err(io_error(&dir))?;
        debug!("Created result session {} at {}", id, dir.display());
        Ok(id)
    }

    /// Writes `result` into its session directory, replacing any previous
    /// version atomically.
    pub fn save(&self, result: &InvocationResult) -> StoreResult<PathBuf> {
        let dir = result.result_dir.as_ref().ok_or(StoreError::NoSession)?;
        std::fs::create_dir_all(dir).map_err(io_error(dir))?;
        let path = dir.join(RESULT_FILE_NAME);

        let xml = xml::write_result(result).map_err(StoreError::Serialize)?;

        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(io_error(dir))?;
        file.write_all(xml.as_bytes()).map_err(io_error(&path))?;
        file.as_file().sync_all().map_err(io_error(&path))?;
        file.persist(&path)
            .map_err(|e| io_error(&path)(e.error))?;

        debug!("Saved results to {}", path.display());
        Ok(path)
    }

    /// Loads the result recorded for session `id`.
    pub fn load(&self, id: u32) -> StoreResult<InvocationResult> {
        let dir = self.session_dir(id);
        let path = dir.join(RESULT_FILE_NAME);
        if !path.is_file() {
            return Err(StoreError::SessionNotFound(id));
        }
        let content = std::fs::read_to_string(&path).map_err(io_error(&path))?;
        let mut result = xml::parse_result(&content)
            .map_err(|source| StoreError::Parse { path, source })?;
        result.result_dir = Some(dir);
        Ok(result)
    }

    /// Summaries of every readable session, ordered by id.
    pub fn list(&self) -> StoreResult<Vec<SessionSummary>> {
        let mut summaries = Vec::new();
        for id in self.session_ids()? {
            match self.load(id) {
                Ok(result) => summaries.push(SessionSummary::from_result(id, &result)),
                Err(StoreError::SessionNotFound(_)) => {}
                Err(e) => warn!("Skipping session {}: {}", id, e),
            }
        }
        Ok(summaries)
    }
}
