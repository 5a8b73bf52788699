//! Test plans: named, reusable module selections.
//!
//! ```xml
//! <TestPlan name="cts-camera" version="1.0">
//!   <Module name="CtsCameraTestCases">
//!     <Option key="include-filter" value="android.hardware.cts.CameraTest"/>
//!     <Option key="timeout" value="600"/>
//!   </Module>
//!   <Module name="arm64-v8a CtsMediaTestCases"/>
//! </TestPlan>
//! ```
//!
//! Module order and option order are preserved exactly as added.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::filter::{FilterError, TestFilter};
use crate::xml::{self, XmlError};

const PLAN_TAG: &str = "TestPlan";
const MODULE_TAG: &str = "Module";
const OPTION_TAG: &str = "Option";

/// Option key whose values become test-level include filters.
pub const INCLUDE_FILTER_OPTION: &str = "include-filter";
/// Option key whose values become test-level exclude filters.
pub const EXCLUDE_FILTER_OPTION: &str = "exclude-filter";

pub type PlanResult<T> = Result<T, PlanError>;

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Module '{0}' is not part of the plan")]
    ModuleNotFound(String),

    #[error("Invalid plan module '{module}': {source}")]
    Filter {
        module: String,
        #[source]
        source: FilterError,
    },

    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Filters and module arguments derived from a plan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanFilters {
    pub includes: Vec<TestFilter>,
    pub excludes: Vec<TestFilter>,
    /// `(module, key, value)` triples applied as module arguments.
    pub module_args: Vec<(String, String, String)>,
}

/// A named selection of modules with per-module options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestPlan {
    name: String,
    version: String,
    modules: IndexMap<String, IndexMap<String, Vec<String>>>,
}

impl TestPlan {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: "1.0".to_string(),
            modules: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Module names, in the order they were added.
    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn module_options(&self, module: &str) -> Option<&IndexMap<String, Vec<String>>> {
        self.modules.get(module)
    }

    /// Adds a module. Adding an existing module keeps its options.
    pub fn add_module(&mut self, module: impl Into<String>) {
        self.modules.entry(module.into()).or_default();
    }

    /// Appends `value` to option `key` of `module`.
    ///
    /// # Errors
    ///
    /// [`PlanError::ModuleNotFound`] if the module was not added first.
    pub fn add_module_option(
        &mut self,
        module: &str,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> PlanResult<()> {
        let options = self
            .modules
            .get_mut(module)
            .ok_or_else(|| PlanError::ModuleNotFound(module.to_string()))?;
        options.entry(key.into()).or_default().push(value.into());
        Ok(())
    }

    /// Converts the plan into run filters.
    ///
    /// Each module yields a module-level include. `include-filter` and
    /// `exclude-filter` values become test-level filters for that module;
    /// every other option becomes a module argument.
    pub fn filters(&self) -> PlanResult<PlanFilters> {
        let mut filters = PlanFilters::default();
        for (module, options) in &self.modules {
            let filter_error = |source| PlanError::Filter {
                module: module.clone(),
                source,
            };
            let include: TestFilter = module.parse().map_err(filter_error)?;
            if include.is_test_level() {
                return Err(filter_error(FilterError::Malformed(module.clone())));
            }
            let (abi, name) = (include.abi(), include.name());

            for (key, values) in options {
                for value in values {
                    match key.as_str() {
                        INCLUDE_FILTER_OPTION => filters
                            .includes
                            .push(TestFilter::include(abi, name, Some(value)).map_err(filter_error)?),
                        EXCLUDE_FILTER_OPTION => filters
                            .excludes
                            .push(TestFilter::exclude(abi, name, Some(value)).map_err(filter_error)?),
                        _ => filters
                            .module_args
                            .push((name.to_string(), key.clone(), value.clone())),
                    }
                }
            }
            filters.includes.push(include);
        }
        Ok(filters)
    }

    /// Serializes the plan to XML.
    pub fn to_xml(&self) -> PlanResult<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(XmlError::from)?;

        let mut root = BytesStart::new(PLAN_TAG);
        root.push_attribute(("name", self.name.as_str()));
        root.push_attribute(("version", self.version.as_str()));
        writer.write_event(Event::Start(root)).map_err(XmlError::from)?;

        for (module, options) in &self.modules {
            let mut element = BytesStart::new(MODULE_TAG);
            element.push_attribute(("name", module.as_str()));
            if options.is_empty() {
                writer.write_event(Event::Empty(element)).map_err(XmlError::from)?;
                continue;
            }
            writer.write_event(Event::Start(element)).map_err(XmlError::from)?;
            for (key, values) in options {
                for value in values {
                    let mut option = BytesStart::new(OPTION_TAG);
                    option.push_attribute(("key", key.as_str()));
                    option.push_attribute(("value", value.as_str()));
                    writer.write_event(Event::Empty(option)).map_err(XmlError::from)?;
                }
            }
            writer
                .write_event(Event::End(BytesEnd::new(MODULE_TAG)))
                .map_err(XmlError::from)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new(PLAN_TAG)))
            .map_err(XmlError::from)?;
        let mut out = String::from_utf8_lossy(&writer.into_inner()).into_owned();
        out.push('\n');
        Ok(out)
    }

    /// Parses a plan document.
    ///
    /// # Errors
    ///
    /// Fails on malformed XML, a root other than `<TestPlan>`, or an
    /// `<Option>` outside a `<Module>`.
    pub fn from_xml(content: &str) -> PlanResult<Self> {
        let mut reader = Reader::from_str(content);
        let mut plan: Option<TestPlan> = None;
        let mut module: Option<String> = None;

        loop {
            let (element, empty) = match reader.read_event().map_err(XmlError::from)? {
                Event::Start(e) => (e, false),
                Event::Empty(e) => (e, true),
                Event::End(e) => {
                    if e.name().as_ref() == MODULE_TAG.as_bytes() {
                        module = None;
                    }
                    continue;
                }
                Event::Eof => break,
                _ => continue,
            };

            let name = xml::element_name(&element);
            let mut attrs = xml::attributes(&element)?;
            if plan.is_none() {
                if name != PLAN_TAG {
                    return Err(XmlError::UnexpectedRoot {
                        expected: PLAN_TAG.to_string(),
                        found: name,
                    }
                    .into());
                }
                let mut new_plan = TestPlan::new(xml::required(&mut attrs, PLAN_TAG, "name")?);
                if let Some(version) = attrs.remove("version") {
                    new_plan.version = version;
                }
                plan = Some(new_plan);
                continue;
            }
            let Some(current) = plan.as_mut() else {
                continue;
            };

            match name.as_str() {
                MODULE_TAG => {
                    let module_name = xml::required(&mut attrs, MODULE_TAG, "name")?;
                    current.add_module(module_name.clone());
                    if !empty {
                        module = Some(module_name);
                    }
                }
                OPTION_TAG => {
                    let key = xml::required(&mut attrs, OPTION_TAG, "key")?;
                    let value = xml::required(&mut attrs, OPTION_TAG, "value")?;
                    let owner = module.as_deref().ok_or_else(|| XmlError::MissingAttribute {
                        element: OPTION_TAG.to_string(),
                        attribute: "enclosing Module".to_string(),
                    })?;
                    current.add_module_option(owner, key, value)?;
                }
                _ => {}
            }
        }

        plan.ok_or_else(|| XmlError::MissingRoot(PLAN_TAG.to_string()).into())
    }

    pub fn load(path: &Path) -> PlanResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| PlanError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_xml(&content)
    }

    pub fn save(&self, path: &Path) -> PlanResult<()> {
        let xml = self.to_xml()?;
        std::fs::write(path, xml).map_err(|source| PlanError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
