//! Build context shared by every shard of an invocation.
//!
//! Carries the suite identity, the install layout, and a map of build
//! attributes that preparers may add to (device info collection, for
//! example). Clones share the attribute map, so every shard of a run sees
//! and contributes to the same set.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::layout::SuiteLayout;

#[derive(Debug, Clone)]
pub struct BuildContext {
    suite_name: String,
    suite_version: String,
    harness_version: String,
    layout: SuiteLayout,
    attributes: Arc<Mutex<BTreeMap<String, String>>>,
}

impl BuildContext {
    pub fn new(
        suite_name: impl Into<String>,
        suite_version: impl Into<String>,
        layout: SuiteLayout,
    ) -> Self {
        Self {
            suite_name: suite_name.into(),
            suite_version: suite_version.into(),
            harness_version: env!("CARGO_PKG_VERSION").to_string(),
            layout,
            attributes: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn suite_name(&self) -> &str {
        &self.suite_name
    }

    pub fn suite_version(&self) -> &str {
        &self.suite_version
    }

    pub fn harness_version(&self) -> &str {
        &self.harness_version
    }

    pub fn layout(&self) -> &SuiteLayout {
        &self.layout
    }

    pub fn add_attribute(&self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    pub fn attribute(&self, key: &str) -> Option<String> {
        self.attributes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Snapshot of every attribute recorded so far.
    pub fn attributes(&self) -> BTreeMap<String, String> {
        self.attributes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
