//! Module definitions: the unit of scheduling.
//!
//! A [`ModuleDefinition`] is one ABI-specific instantiation of a module
//! configuration file. It holds *descriptors* for its preparers and
//! sub-tests rather than live components, so definitions are cheap to clone
//! and can be handed to any shard; components are built from the
//! descriptors by a [`ComponentRegistry`](crate::component::ComponentRegistry)
//! right before the module runs.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::abi::{self, Abi};
use crate::filter::NamePattern;

/// Descriptor of a preparer or sub-test: a registered class name plus its
/// options, each option holding an ordered list of values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub class: String,
    pub options: BTreeMap<String, Vec<String>>,
}

impl ComponentSpec {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            options: BTreeMap::new(),
        }
    }

    /// Appends a value to `key`.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_option(key, value);
        self
    }

    pub fn add_option(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.options.entry(key.into()).or_default().push(value.into());
    }

    /// Returns the last value given for `key`.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .get(key)
            .and_then(|values| values.last())
            .map(String::as_str)
    }

    /// Returns every value given for `key`, in order.
    pub fn option_values(&self, key: &str) -> &[String] {
        self.options.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Parses `key` as a boolean, defaulting to `false`.
    pub fn flag(&self, key: &str) -> bool {
        self.option(key)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }
}

/// A runnable module for one ABI.
#[derive(Debug, Clone)]
pub struct ModuleDefinition {
    id: String,
    name: String,
    name_pattern: NamePattern,
    abi: Abi,
    preparers: Vec<ComponentSpec>,
    tests: Vec<ComponentSpec>,
    include_filters: Vec<String>,
    exclude_filters: Vec<String>,
}

impl ModuleDefinition {
    pub fn new(
        name: impl Into<String>,
        abi: Abi,
        preparers: Vec<ComponentSpec>,
        tests: Vec<ComponentSpec>,
    ) -> Self {
        let name = name.into();
        Self {
            id: abi::create_id(abi.name(), &name),
            name_pattern: NamePattern::new(&name),
            name,
            abi,
            preparers,
            tests,
            include_filters: Vec::new(),
            exclude_filters: Vec::new(),
        }
    }

    /// `abi + " " + name`, unique across a repository.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The module name compiled as a pattern, for filters that are
    /// matched against it.
    pub fn name_pattern(&self) -> &NamePattern {
        &self.name_pattern
    }

    pub fn abi(&self) -> &Abi {
        &self.abi
    }

    pub fn preparers(&self) -> &[ComponentSpec] {
        &self.preparers
    }

    pub fn tests(&self) -> &[ComponentSpec] {
        &self.tests
    }

    /// Test-level include filters forwarded to sub-tests.
    pub fn include_filters(&self) -> &[String] {
        &self.include_filters
    }

    /// Test-level exclude filters forwarded to sub-tests.
    pub fn exclude_filters(&self) -> &[String] {
        &self.exclude_filters
    }

    pub fn add_include_filter(&mut self, test: impl Into<String>) {
        let test = test.into();
        if !self.include_filters.contains(&test) {
            self.include_filters.push(test);
        }
    }

    pub fn add_exclude_filter(&mut self, test: impl Into<String>) {
        let test = test.into();
        if !self.exclude_filters.contains(&test) {
            self.exclude_filters.push(test);
        }
    }

    /// Appends a module argument to every sub-test descriptor.
    pub fn add_module_arg(&mut self, key: &str, value: &str) {
        for test in &mut self.tests {
            test.add_option(key, value);
        }
    }

    /// Returns true if the module name fully matches `pattern`.
    pub fn name_matches(&self, pattern: &NamePattern) -> bool {
        pattern.is_match(&self.name)
    }
}

impl PartialEq for ModuleDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.preparers == other.preparers
            && self.tests == other.tests
            && self.include_filters == other.include_filters
            && self.exclude_filters == other.exclude_filters
    }
}

impl Eq for ModuleDefinition {}

impl PartialOrd for ModuleDefinition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ModuleDefinition {
    /// Orders by name; the id breaks ties between ABIs of one module.
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.id.cmp(&other.id))
    }
}
