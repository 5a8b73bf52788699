//! ABI vocabulary and module id helpers.
//!
//! A module is instantiated once per ABI; its id is the ABI name and the
//! module name joined by a single space (`"arm64-v8a CtsFooTestCases"`).

use std::fmt;

use serde::{Deserialize, Serialize};

/// ABIs the suite knows how to run against.
pub const SUPPORTED_ABIS: &[&str] = &[
    "armeabi",
    "armeabi-v7a",
    "arm64-v8a",
    "x86",
    "x86_64",
    "mips",
    "mips64",
];

const ABIS_64: &[&str] = &["arm64-v8a", "x86_64", "mips64"];

/// A CPU / instruction-set variant a module is run for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Abi {
    name: String,
    bitness: String,
}

impl Abi {
    /// Creates an ABI, deriving its bitness from the name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let bitness = bitness_of(&name).to_string();
        Self { name, bitness }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `"64"` or `"32"`.
    pub fn bitness(&self) -> &str {
        &self.bitness
    }
}

impl fmt::Display for Abi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Returns the bitness of the named ABI.
pub fn bitness_of(abi: &str) -> &'static str {
    if ABIS_64.contains(&abi) { "64" } else { "32" }
}

/// Returns true if `abi` is one of [`SUPPORTED_ABIS`].
pub fn is_supported(abi: &str) -> bool {
    SUPPORTED_ABIS.contains(&abi)
}

/// Builds a module id from an ABI and a module name.
pub fn create_id(abi: &str, name: &str) -> String {
    format!("{} {}", abi, name)
}

/// Splits a module id back into `(abi, name)`.
///
/// Returns `None` if the id has no ABI component.
pub fn parse_id(id: &str) -> Option<(&str, &str)> {
    id.split_once(' ')
}
