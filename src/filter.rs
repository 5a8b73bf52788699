//! Include / exclude filters over `(abi, module name, test name)`.
//!
//! A filter's string form is `["!"] [abi " "] name [" " test]`:
//!
//! | Input | abi | name | test | include |
//! |-------|-----|------|------|---------|
//! | `CtsFoo` | - | `CtsFoo` | - | yes |
//! | `!CtsFoo` | - | `CtsFoo` | - | no |
//! | `arm64-v8a CtsFoo` | `arm64-v8a` | `CtsFoo` | - | yes |
//! | `CtsFoo a.B#c` | - | `CtsFoo` | `a.B#c` | yes |
//! | `arm64-v8a CtsFoo a.B#c` | `arm64-v8a` | `CtsFoo` | `a.B#c` | yes |
//!
//! Two-token filters are ambiguous; they are resolved against a caller
//! supplied ABI vocabulary: if the first token is a known ABI the filter is
//! `abi name`, otherwise it is `name test`.
//!
//! # Example
//!
//! ```
//! use compat_harness::filter::TestFilter;
//!
//! let filter: TestFilter = "!mips64 ModuleName com.android.foobar.Blah#testAllTheThings"
//!     .parse()
//!     .unwrap();
//! assert_eq!(filter.abi(), Some("mips64"));
//! assert_eq!(filter.name(), "ModuleName");
//! assert!(!filter.is_include());
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use regex::Regex;

use crate::abi::SUPPORTED_ABIS;
use crate::module::ModuleDefinition;

const EXCLUDE_PREFIX: char = '!';

/// Errors produced while building or parsing a [`TestFilter`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    /// The filter string was empty (or only `!`).
    #[error("Empty filter")]
    Empty,

    /// The filter string could not be split into `[abi] name [test]`.
    #[error("Could not parse filter: {0}")]
    Malformed(String),

    /// A component contained whitespace and would not survive a round trip.
    #[error("Filter component '{0}' must not contain whitespace")]
    Whitespace(String),
}

/// A name compiled once as an anchored, full-match regex.
///
/// Names that are not valid patterns compile to nothing and never match as
/// patterns; callers still compare them literally.
#[derive(Debug, Clone)]
pub struct NamePattern {
    regex: Option<Regex>,
}

impl NamePattern {
    pub fn new(pattern: &str) -> Self {
        Self {
            regex: Regex::new(&format!("^(?:{})$", pattern)).ok(),
        }
    }

    /// Returns true if the pattern matches all of `text`.
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(text))
    }
}

/// A structured include or exclude predicate.
///
/// The name's pattern is compiled when the filter is built, so matching a
/// filter against many modules never recompiles it.
#[derive(Debug, Clone)]
pub struct TestFilter {
    abi: Option<String>,
    name: String,
    test: Option<String>,
    include: bool,
    pattern: NamePattern,
}

impl TestFilter {
    /// Creates a filter from its parts.
    ///
    /// # Errors
    ///
    /// Fails if `name` is empty or any component contains whitespace.
    pub fn new(
        abi: Option<&str>,
        name: &str,
        test: Option<&str>,
        include: bool,
    ) -> Result<Self, FilterError> {
        if name.is_empty() {
            return Err(FilterError::Empty);
        }
        for part in abi.into_iter().chain(Some(name)).chain(test) {
            if part.is_empty() || part.chars().any(char::is_whitespace) {
                return Err(FilterError::Whitespace(part.to_string()));
            }
        }
        Ok(Self {
            abi: abi.map(str::to_string),
            name: name.to_string(),
            test: test.map(str::to_string),
            include,
            pattern: NamePattern::new(name),
        })
    }

    /// Shorthand for an include filter.
    pub fn include(abi: Option<&str>, name: &str, test: Option<&str>) -> Result<Self, FilterError> {
        Self::new(abi, name, test, true)
    }

    /// Shorthand for an exclude filter.
    pub fn exclude(abi: Option<&str>, name: &str, test: Option<&str>) -> Result<Self, FilterError> {
        Self::new(abi, name, test, false)
    }

    /// Parses a filter, disambiguating two-token forms with `abis`.
    pub fn parse_with_abis<S: AsRef<str>>(filter: &str, abis: &[S]) -> Result<Self, FilterError> {
        let (include, body) = match filter.strip_prefix(EXCLUDE_PREFIX) {
            Some(rest) => (false, rest),
            None => (true, filter),
        };
        let parts: Vec<&str> = body.split_whitespace().collect();
        match parts.as_slice() {
            [] => Err(FilterError::Empty),
            [name] => Self::new(None, name, None, include),
            [first, second] => {
                if abis.iter().any(|abi| abi.as_ref() == *first) {
                    Self::new(Some(first), second, None, include)
                } else {
                    Self::new(None, first, Some(second), include)
                }
            }
            [abi, name, test] => Self::new(Some(abi), name, Some(test), include),
            _ => Err(FilterError::Malformed(filter.to_string())),
        }
    }

    pub fn abi(&self) -> Option<&str> {
        self.abi.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn test(&self) -> Option<&str> {
        self.test.as_deref()
    }

    pub fn is_include(&self) -> bool {
        self.include
    }

    /// Returns true if this filter only narrows a module's sub-tests.
    pub fn is_test_level(&self) -> bool {
        self.test.is_some()
    }

    /// Returns true if this filter applies to the module `(abi, name)`.
    ///
    /// Names are compared literally, then with the filter name as a pattern
    /// against the module name, then the other way round. Invalid patterns
    /// never match.
    pub fn matches_module(&self, abi: &str, name: &str) -> bool {
        self.matches_with(abi, name, &NamePattern::new(name))
    }

    /// Same as [`matches_module`](Self::matches_module), reusing the
    /// module's own compiled name pattern.
    pub fn matches(&self, module: &ModuleDefinition) -> bool {
        self.matches_with(module.abi().name(), module.name(), module.name_pattern())
    }

    fn matches_with(&self, abi: &str, name: &str, name_pattern: &NamePattern) -> bool {
        if let Some(filter_abi) = &self.abi
            && filter_abi != abi
        {
            return false;
        }
        self.name == name || self.pattern.is_match(name) || name_pattern.is_match(&self.name)
    }

    fn key(&self) -> (Option<&str>, &str, Option<&str>, bool) {
        (self.abi(), self.name(), self.test(), self.include)
    }
}

impl PartialEq for TestFilter {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for TestFilter {}

impl Hash for TestFilter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for TestFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.include {
            write!(f, "{}", EXCLUDE_PREFIX)?;
        }
        if let Some(abi) = &self.abi {
            write!(f, "{} ", abi)?;
        }
        f.write_str(&self.name)?;
        if let Some(test) = &self.test {
            write!(f, " {}", test)?;
        }
        Ok(())
    }
}

impl FromStr for TestFilter {
    type Err = FilterError;

    /// Parses against [`SUPPORTED_ABIS`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_with_abis(s, SUPPORTED_ABIS)
    }
}
