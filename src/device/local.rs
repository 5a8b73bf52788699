//! Host-local device implementation.
//!
//! Treats a directory on the host as the device: shell commands run as
//! child processes of the harness in that directory, files are pushed and
//! pulled with plain copies, and properties and ABIs come from
//! configuration. Useful for development, CI, and for suites whose
//! "device" is the host itself.
//!
//! # Characteristics
//!
//! | Feature | Support |
//! |---------|---------|
//! | Isolation | None (shares the host filesystem and network) |
//! | Shell commands | `{shell} -c "{command}"` in the working directory |
//! | File transfer | Local copies under the working directory |
//! | Properties | Static, from configuration |
//! | Availability | Online while the working directory exists |
//!
//! # Example Configuration
//!
//! ```toml
//! [[devices]]
//! type = "local"
//! serial = "host-0"
//! abis = ["x86_64", "x86"]
//! working_dir = "/tmp/device-root"
//!
//! [devices.properties]
//! "ro.build.type" = "userdebug"
//! ```
//!
//! # Example Usage
//!
//! ```no_run
//! use std::collections::BTreeMap;
//!
//! use compat_harness::config::LocalDeviceConfig;
//! use compat_harness::device::Device;
//! use compat_harness::device::local::LocalDevice;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let device = LocalDevice::new(LocalDeviceConfig {
//!         serial: "host-0".to_string(),
//!         abis: vec!["x86_64".to_string()],
//!         working_dir: Some("/tmp/device-root".into()),
//!         shell: "/bin/sh".to_string(),
//!         properties: BTreeMap::new(),
//!     });
//!
//!     let result = device.execute_shell_command("uname -m").await?;
//!     println!("{} exited with {}", device.serial(), result.exit_code);
//!     Ok(())
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use super::{Device, DeviceError, DeviceResult, ExecResult};
use crate::config::LocalDeviceConfig;

/// A device backed by a host directory.
///
/// The working directory stands in for the device's filesystem root:
/// remote paths such as `/data/local/tmp/foo` resolve beneath it. Removing
/// the directory makes the device unavailable, which suspends any run
/// using it.
pub struct LocalDevice {
    serial: String,
    abis: Vec<String>,
    working_dir: PathBuf,
    shell: String,
    properties: BTreeMap<String, String>,
}

impl LocalDevice {
    /// Creates a device from its configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Serial, ABIs, properties, shell and working directory.
    ///   Without a working directory the harness's current directory is
    ///   used.
    pub fn new(config: LocalDeviceConfig) -> Self {
        let working_dir = config
            .working_dir
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        Self {
            serial: config.serial,
            abis: config.abis,
            working_dir,
            shell: config.shell,
            properties: config.properties,
        }
    }

    /// Returns the directory acting as the device root.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    fn unavailable(&self, reason: impl Into<String>) -> DeviceError {
        DeviceError::Unavailable {
            serial: self.serial.clone(),
            reason: reason.into(),
        }
    }

    /// Fails with [`DeviceError::Unavailable`] once the working directory
    /// is gone.
    fn check_online(&self) -> DeviceResult<()> {
        if self.working_dir.is_dir() {
            Ok(())
        } else {
            Err(self.unavailable(format!(
                "working directory {} is missing",
                self.working_dir.display()
            )))
        }
    }

    /// Maps a device path to its host path under the working directory.
    fn resolve(&self, remote: &str) -> PathBuf {
        self.working_dir.join(remote.trim_start_matches('/'))
    }
}

#[async_trait]
impl Device for LocalDevice {
    fn serial(&self) -> &str {
        &self.serial
    }

    async fn abis(&self) -> DeviceResult<Vec<String>> {
        self.check_online()?;
        Ok(self.abis.clone())
    }

    /// Properties come from configuration; unknown keys are `None`.
    async fn get_property(&self, key: &str) -> DeviceResult<Option<String>> {
        self.check_online()?;
        Ok(self.properties.get(key).cloned())
    }

    /// Runs `command` through the configured shell and waits for it.
    ///
    /// A non-zero exit is reported in the [`ExecResult`], not as an error.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Unavailable`] if the working directory is
    /// missing or the shell cannot be spawned.
    async fn execute_shell_command(&self, command: &str) -> DeviceResult<ExecResult> {
        self.check_online()?;
        debug!("[{}] $ {}", self.serial, command);

        let start = Instant::now();
        let output = tokio::process::Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| self.unavailable(format!("failed to spawn {}: {}", self.shell, e)))?;

        Ok(ExecResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: start.elapsed(),
        })
    }

    /// Copies `local` to `remote` under the working directory, creating
    /// parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::PushFailed`] if the copy fails.
    async fn push_file(&self, local: &Path, remote: &str) -> DeviceResult<()> {
        self.check_online()?;
        let dest = self.resolve(remote);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DeviceError::PushFailed(e.to_string()))?;
        }
        tokio::fs::copy(local, &dest)
            .await
            .map_err(|e| DeviceError::PushFailed(format!("{}: {}", local.display(), e)))?;
        Ok(())
    }

    /// Copies `remote` from under the working directory to `local`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::PullFailed`] if the copy fails.
    async fn pull_file(&self, remote: &str, local: &Path) -> DeviceResult<()> {
        self.check_online()?;
        let src = self.resolve(remote);
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DeviceError::PullFailed(e.to_string()))?;
        }
        tokio::fs::copy(&src, local)
            .await
            .map_err(|e| DeviceError::PullFailed(format!("{}: {}", src.display(), e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(dir: &Path) -> LocalDevice {
        let mut properties = BTreeMap::new();
        properties.insert("ro.build.type".to_string(), "user".to_string());
        LocalDevice::new(LocalDeviceConfig {
            serial: "host-0".to_string(),
            abis: vec!["x86_64".to_string()],
            working_dir: Some(dir.to_path_buf()),
            shell: "/bin/sh".to_string(),
            properties,
        })
    }

    #[tokio::test]
    async fn test_execute_shell_command() {
        let dir = tempfile::tempdir().unwrap();
        let device = device(dir.path());

        let ok = device.execute_shell_command("echo hello").await.unwrap();
        assert!(ok.success());
        assert_eq!(ok.stdout.trim(), "hello");

        let failed = device
            .execute_shell_command("echo oops >&2; exit 3")
            .await
            .unwrap();
        assert_eq!(failed.exit_code, 3);
        assert_eq!(failed.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_push_and_pull() {
        let dir = tempfile::tempdir().unwrap();
        let host = tempfile::tempdir().unwrap();
        let device = device(dir.path());

        let local = host.path().join("payload.txt");
        std::fs::write(&local, "data").unwrap();
        device.push_file(&local, "/data/local/tmp/payload.txt").await.unwrap();
        assert!(dir.path().join("data/local/tmp/payload.txt").exists());

        let back = host.path().join("back.txt");
        device.pull_file("data/local/tmp/payload.txt", &back).await.unwrap();
        assert_eq!(std::fs::read_to_string(back).unwrap(), "data");
    }

    #[tokio::test]
    async fn test_properties_and_abis() {
        let dir = tempfile::tempdir().unwrap();
        let device = device(dir.path());
        assert_eq!(
            device.get_property("ro.build.type").await.unwrap().as_deref(),
            Some("user")
        );
        assert_eq!(device.get_property("missing").await.unwrap(), None);
        assert_eq!(device.abis().await.unwrap(), vec!["x86_64".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_working_dir_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone");
        let device = device(&gone);
        let err = device.execute_shell_command("true").await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
