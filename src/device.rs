//! Device handle abstraction.
//!
//! The harness never talks to hardware directly. Everything it needs from a
//! device under test goes through the [`Device`] trait:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                   Device                      │
//! │                                               │
//! │  abis()                  ──► Vec<String>      │
//! │  get_property(key)       ──► Option<String>   │
//! │  execute_shell_command() ──► ExecResult       │
//! │  push_file / pull_file                        │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Error Handling
//!
//! [`DeviceError::Unavailable`] is special: it means the device is gone and
//! nothing else can run on it. Preparers, sub-tests and the orchestrator pass
//! it through untouched so the whole run stops; every other error is local
//! to the module that hit it.

pub mod local;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Errors that can occur while talking to a device.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The device disappeared or never came up. Fatal to the whole run.
    #[error("Device {serial} not available: {reason}")]
    Unavailable { serial: String, reason: String },

    /// A command could not be started or its output could not be read.
    #[error("Failed to execute command: {0}")]
    ExecFailed(String),

    /// Failed to push a file to the device.
    #[error("Failed to push file: {0}")]
    PushFailed(String),

    /// Failed to pull a file from the device.
    #[error("Failed to pull file: {0}")]
    PullFailed(String),
}

impl DeviceError {
    /// Returns true for the run-ending "device not available" error.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, DeviceError::Unavailable { .. })
    }
}

/// Outcome of a shell command on a device.
///
/// A command that runs and exits non-zero is still `Ok`; check
/// [`success`](Self::success).
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ExecResult {
    /// Returns `true` if the command exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A device under test.
///
/// Implementations must be `Send + Sync` so a shard can hold one across
/// await points.
#[async_trait]
pub trait Device: Send + Sync {
    /// Serial number identifying the device.
    fn serial(&self) -> &str;

    /// ABIs the device reports, most preferred first.
    async fn abis(&self) -> DeviceResult<Vec<String>>;

    /// Reads a system property. `Ok(None)` if the property is unset.
    async fn get_property(&self, key: &str) -> DeviceResult<Option<String>>;

    /// Runs `command` through the device shell and collects its output.
    async fn execute_shell_command(&self, command: &str) -> DeviceResult<ExecResult>;

    /// Copies a host file to `remote` on the device.
    async fn push_file(&self, local: &Path, remote: &str) -> DeviceResult<()>;

    /// Copies `remote` from the device to a host file.
    async fn pull_file(&self, remote: &str, local: &Path) -> DeviceResult<()>;
}
