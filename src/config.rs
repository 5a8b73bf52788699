//! Configuration loading and schema definitions.
//!
//! The harness reads a single `compat.toml` describing the suite install,
//! the devices to run on, and run defaults.

pub mod schema;

pub use schema::*;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Loads configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read (e.g., doesn't exist or permission denied)
/// - The file contains invalid TOML syntax
/// - The configuration doesn't match the expected schema
///
/// # Example
///
/// ```no_run
/// use compat_harness::config::load_config;
/// use std::path::Path;
///
/// let config = load_config(Path::new("compat.toml"))?;
/// println!("Suite: {} {}", config.suite.name, config.suite.version);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Loads configuration from a TOML string.
///
/// # Example
///
/// ```
/// use compat_harness::config::load_config_str;
///
/// let config = load_config_str(r#"
///     [suite]
///     name = "CTS"
///     root = "/opt/cts"
///
///     [run]
///     shards = 2
/// "#)?;
///
/// assert_eq!(config.run.shards, 2);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;

    Ok(config)
}

impl SuiteConfig {
    /// Returns the install root with `~` and environment variables expanded.
    pub fn expanded_root(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.root)
            .with_context(|| format!("Failed to expand suite root: {}", self.root))?;
        Ok(PathBuf::from(expanded.as_ref()))
    }
}
