//! Configuration schema definitions for the harness.
//!
//! # Schema Overview
//!
//! ```text
//! Config (root)
//! ├── SuiteConfig            - Suite identity, install root, ABI vocabulary
//! ├── DeviceConfig[]         - Tagged enum selecting the device type
//! │   └── Local              - Host directory acting as a device
//! └── RunConfig              - Sharding and preparer gating defaults
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::abi::SUPPORTED_ABIS;

/// Root configuration structure.
///
/// # TOML Structure
///
/// ```toml
/// [suite]
/// name = "CTS"
/// version = "7.0_r1"
/// root = "~/android-cts"
///
/// [[devices]]
/// type = "local"
/// serial = "host-0"
/// abis = ["arm64-v8a", "armeabi-v7a"]
///
/// [run]
/// shards = 1
/// ```
///
/// # Example
///
/// ```
/// use compat_harness::config::Config;
///
/// let config: Config = toml::from_str(r#"
///     [suite]
///     root = "/opt/suite"
///
///     [[devices]]
///     type = "local"
///     serial = "host-0"
/// "#).unwrap();
/// assert_eq!(config.suite.name, "CTS");
/// assert_eq!(config.devices.len(), 1);
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub suite: SuiteConfig,

    /// Devices available to the run. Shard `k` runs on the `k`th device.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    #[serde(default)]
    pub run: RunConfig,
}

/// Suite identity and install location.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `name` | `CTS` |
/// | `version` | `1.0` |
/// | `supported_abis` | every ABI the harness knows |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SuiteConfig {
    #[serde(default = "default_suite_name")]
    pub name: String,

    #[serde(default = "default_suite_version")]
    pub version: String,

    /// Install root containing `repository/`. `~` and `$VAR` are expanded.
    pub root: String,

    /// ABI vocabulary used for ABI resolution and filter parsing.
    #[serde(default = "default_supported_abis")]
    pub supported_abis: Vec<String>,
}

fn default_suite_name() -> String {
    "CTS".to_string()
}

fn default_suite_version() -> String {
    "1.0".to_string()
}

fn default_supported_abis() -> Vec<String> {
    SUPPORTED_ABIS.iter().map(|abi| abi.to_string()).collect()
}

/// Device configuration.
///
/// Tagged on `type` like every pluggable section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DeviceConfig {
    /// A host directory acting as the device.
    Local(LocalDeviceConfig),
}

impl DeviceConfig {
    pub fn serial(&self) -> &str {
        match self {
            DeviceConfig::Local(local) => &local.serial,
        }
    }
}

/// Configuration for a host-local device.
///
/// # Example
///
/// ```toml
/// [[devices]]
/// type = "local"
/// serial = "host-0"
/// abis = ["x86_64"]
/// working_dir = "/tmp/device-root"
/// shell = "/bin/bash"
///
/// [devices.properties]
/// "ro.product.model" = "emulator"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalDeviceConfig {
    pub serial: String,

    /// ABIs the device reports. Default: `["x86_64"]`.
    #[serde(default = "default_device_abis")]
    pub abis: Vec<String>,

    /// Directory commands run in and files are pushed under.
    ///
    /// If not specified, uses the current working directory.
    pub working_dir: Option<PathBuf>,

    /// Commands are executed via `{shell} -c "{command}"`.
    ///
    /// Default: `/bin/sh`
    #[serde(default = "default_shell")]
    pub shell: String,

    /// System properties answered by `get_property`.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

fn default_device_abis() -> Vec<String> {
    vec!["x86_64".to_string()]
}

fn default_shell() -> String {
    "/bin/sh".to_string()
}

/// Defaults for `compat run`; command-line flags override them.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RunConfig {
    /// Number of shards. `0` and `1` both mean unsharded.
    #[serde(default)]
    pub shards: usize,

    /// Skip preparers gated on preconditions.
    #[serde(default)]
    pub skip_preconditions: bool,

    /// Skip preparers gated on device info collection.
    #[serde(default)]
    pub skip_device_info: bool,
}
