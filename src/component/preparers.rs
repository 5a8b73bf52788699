//! Built-in target preparers.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{ComponentError, ComponentResult, ModuleContext, PreparerError, PreparerResult, TargetPreparer};
use crate::module::ComponentSpec;

pub const RUN_COMMAND: &str = "run-command";
pub const FILE_PUSHER: &str = "file-pusher";
pub const BUILD_CHECK: &str = "build-check";
pub const DEVICE_INFO: &str = "device-info";

/// Prefix of build attributes recorded by [`DeviceInfoCollector`].
pub const DEVICE_INFO_GENERIC: &str = "DEVICE_INFO_GENERIC_";

const PUSH_SEPARATOR: &str = "->";

/// Runs shell commands on the device at setup and teardown.
///
/// Options: `run-command` (repeatable), `teardown-command` (repeatable).
#[derive(Debug, Clone)]
pub struct RunCommand {
    commands: Vec<String>,
    teardown_commands: Vec<String>,
}

impl RunCommand {
    pub fn from_spec(spec: &ComponentSpec) -> ComponentResult<Self> {
        Ok(Self {
            commands: spec.option_values("run-command").to_vec(),
            teardown_commands: spec.option_values("teardown-command").to_vec(),
        })
    }
}

#[async_trait]
impl TargetPreparer for RunCommand {
    fn class(&self) -> &str {
        RUN_COMMAND
    }

    async fn set_up(&mut self, ctx: &ModuleContext<'_>) -> PreparerResult<()> {
        for command in &self.commands {
            let output = ctx.device.execute_shell_command(command).await?;
            if !output.success() {
                return Err(PreparerError::Setup(format!(
                    "Command '{}' exited with code {}: {}",
                    command,
                    output.exit_code,
                    output.stderr.trim()
                )));
            }
            debug!("[{}] {} ok in {:?}", ctx.module_name, command, output.duration);
        }
        Ok(())
    }

    async fn tear_down(
        &mut self,
        ctx: &ModuleContext<'_>,
        _cause: Option<&str>,
    ) -> PreparerResult<()> {
        for command in &self.teardown_commands {
            let output = ctx.device.execute_shell_command(command).await?;
            if !output.success() {
                warn!(
                    "[{}] teardown command '{}' exited with code {}",
                    ctx.module_name, command, output.exit_code
                );
            }
        }
        Ok(())
    }
}

/// Pushes files from the testcases directory onto the device.
///
/// Options: `push` values `local->remote` (local paths relative to the
/// testcases directory unless absolute), `cleanup` to remove pushed files
/// at teardown.
#[derive(Debug, Clone)]
pub struct FilePusher {
    pushes: Vec<(PathBuf, String)>,
    cleanup: bool,
    pushed: Vec<String>,
}

impl FilePusher {
    pub fn from_spec(spec: &ComponentSpec) -> ComponentResult<Self> {
        let mut pushes = Vec::new();
        for value in spec.option_values("push") {
            let (local, remote) = value
                .split_once(PUSH_SEPARATOR)
                .map(|(l, r)| (l.trim(), r.trim()))
                .filter(|(l, r)| !l.is_empty() && !r.is_empty())
                .ok_or_else(|| {
                    ComponentError::invalid(
                        FILE_PUSHER,
                        "push",
                        format!("expected 'local->remote', got '{}'", value),
                    )
                })?;
            pushes.push((PathBuf::from(local), remote.to_string()));
        }
        Ok(Self {
            pushes,
            cleanup: spec.flag("cleanup"),
            pushed: Vec::new(),
        })
    }

    fn resolve(ctx: &ModuleContext<'_>, local: &Path) -> PreparerResult<PathBuf> {
        if local.is_absolute() {
            return Ok(local.to_path_buf());
        }
        let testcases = ctx
            .build
            .layout()
            .testcases_dir()
            .map_err(|e| PreparerError::Setup(e.to_string()))?;
        Ok(testcases.join(local))
    }
}

#[async_trait]
impl TargetPreparer for FilePusher {
    fn class(&self) -> &str {
        FILE_PUSHER
    }

    async fn set_up(&mut self, ctx: &ModuleContext<'_>) -> PreparerResult<()> {
        for (local, remote) in &self.pushes {
            let source = Self::resolve(ctx, local)?;
            if !source.exists() {
                return Err(PreparerError::Setup(format!(
                    "Local file {} does not exist",
                    source.display()
                )));
            }
            ctx.device.push_file(&source, remote).await?;
            debug!("[{}] pushed {} to {}", ctx.module_name, source.display(), remote);
            self.pushed.push(remote.clone());
        }
        Ok(())
    }

    async fn tear_down(
        &mut self,
        ctx: &ModuleContext<'_>,
        _cause: Option<&str>,
    ) -> PreparerResult<()> {
        if !self.cleanup {
            return Ok(());
        }
        for remote in self.pushed.drain(..) {
            let output = ctx
                .device
                .execute_shell_command(&format!("rm -f '{}'", remote.replace('\'', r"'\''")))
                .await?;
            if !output.success() {
                warn!("[{}] failed to remove {}", ctx.module_name, remote);
            }
        }
        Ok(())
    }
}

/// Checks that a device property has an expected value.
///
/// Options: `property` (default `ro.build.type`), `expected` (required,
/// compared case-insensitively), `throw-error` to fail setup on mismatch
/// instead of logging.
#[derive(Debug, Clone)]
pub struct BuildCheck {
    property: String,
    expected: String,
    throw_error: bool,
}

impl BuildCheck {
    pub fn from_spec(spec: &ComponentSpec) -> ComponentResult<Self> {
        let expected = spec
            .option("expected")
            .ok_or_else(|| ComponentError::invalid(BUILD_CHECK, "expected", "option is mandatory"))?;
        Ok(Self {
            property: spec.option("property").unwrap_or("ro.build.type").to_string(),
            expected: expected.to_string(),
            throw_error: spec.flag("throw-error"),
        })
    }
}

#[async_trait]
impl TargetPreparer for BuildCheck {
    fn class(&self) -> &str {
        BUILD_CHECK
    }

    async fn set_up(&mut self, ctx: &ModuleContext<'_>) -> PreparerResult<()> {
        let actual = ctx.device.get_property(&self.property).await?;
        let matches = actual
            .as_deref()
            .is_some_and(|value| value.eq_ignore_ascii_case(&self.expected));
        if matches {
            return Ok(());
        }

        let msg = format!(
            "Expected {} \"{}\" but found \"{}\"",
            self.property,
            self.expected,
            actual.as_deref().unwrap_or_default()
        );
        if self.throw_error {
            Err(PreparerError::Setup(msg))
        } else {
            warn!("[{}] {}", ctx.module_name, msg);
            Ok(())
        }
    }
}

/// Copies device properties into the build context and pulls device-side
/// info files into the session directory.
///
/// Options: `property` (repeatable) becomes the build attribute
/// `DEVICE_INFO_GENERIC_<property>`; `pull` (repeatable) names device files
/// copied into the session directory, under `dest-dir` if given.
#[derive(Debug, Clone)]
pub struct DeviceInfoCollector {
    properties: Vec<String>,
    pulls: Vec<String>,
    dest_dir: Option<String>,
}

impl DeviceInfoCollector {
    pub fn from_spec(spec: &ComponentSpec) -> ComponentResult<Self> {
        Ok(Self {
            properties: spec.option_values("property").to_vec(),
            pulls: spec.option_values("pull").to_vec(),
            dest_dir: spec.option("dest-dir").map(str::to_string),
        })
    }
}

#[async_trait]
impl TargetPreparer for DeviceInfoCollector {
    fn class(&self) -> &str {
        DEVICE_INFO
    }

    async fn set_up(&mut self, ctx: &ModuleContext<'_>) -> PreparerResult<()> {
        for property in &self.properties {
            match ctx.device.get_property(property).await? {
                Some(value) => {
                    ctx.build
                        .add_attribute(format!("{}{}", DEVICE_INFO_GENERIC, property), value);
                }
                None => debug!("[{}] property {} is unset", ctx.module_name, property),
            }
        }

        if self.pulls.is_empty() {
            return Ok(());
        }
        let Some(result_dir) = ctx.result_dir else {
            warn!("[{}] no session directory, skipping device info files", ctx.module_name);
            return Ok(());
        };
        let dest = match &self.dest_dir {
            Some(dir) => result_dir.join(dir),
            None => result_dir.to_path_buf(),
        };
        if let Err(e) = std::fs::create_dir_all(&dest) {
            warn!("Failed to create {}: {}", dest.display(), e);
            return Ok(());
        }
        for remote in &self.pulls {
            let Some(file_name) = Path::new(remote).file_name() else {
                continue;
            };
            match ctx.device.pull_file(remote, &dest.join(file_name)).await {
                Ok(()) => info!("Collected {} from {}", remote, ctx.device.serial()),
                Err(e) if e.is_unavailable() => return Err(e.into()),
                Err(e) => warn!("Failed to pull {}: {}", remote, e),
            }
        }
        Ok(())
    }
}
