//! Module configuration files.
//!
//! Every `<Module>.config` in the testcases directory describes one module:
//!
//! ```xml
//! <configuration description="Config for CTS Foo test cases">
//!   <target_preparer class="file-pusher">
//!     <option name="push" value="CtsFooData.bin->/data/local/tmp/foo.bin"/>
//!     <option name="cleanup" value="true"/>
//!   </target_preparer>
//!   <test class="shell-test">
//!     <option name="case" value="testFoo=/data/local/tmp/foo --check"/>
//!   </test>
//! </configuration>
//! ```

use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::component::{ComponentError, ComponentKind};
use crate::module::ComponentSpec;
use crate::xml::{self, XmlError};

/// Extension of module configuration files.
pub const CONFIG_EXT: &str = "config";

const ROOT_TAG: &str = "configuration";
const PREPARER_TAG: &str = "target_preparer";
const TEST_TAG: &str = "test";
const OPTION_TAG: &str = "option";

pub type ConfigResult<T> = Result<T, ConfigError>;

/// A module configuration that cannot be loaded. Always names the file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: XmlError,
    },

    #[error("Invalid component in {path}: {source}")]
    Component {
        path: PathBuf,
        #[source]
        source: ComponentError,
    },

    #[error("<option> outside a component in {0}")]
    StrayOption(PathBuf),

    #[error("Module config name is not valid UTF-8: {0}")]
    InvalidName(PathBuf),
}

/// The parsed contents of one configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleConfig {
    pub description: Option<String>,
    pub preparers: Vec<ComponentSpec>,
    pub tests: Vec<ComponentSpec>,
}

impl ModuleConfig {
    /// Reads and parses a configuration file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Parses configuration XML. `path` is only used in errors.
    pub fn parse(content: &str, path: &Path) -> ConfigResult<Self> {
        let parse_error = |source: XmlError| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = Reader::from_str(content);
        let mut config: Option<ModuleConfig> = None;
        let mut current: Option<(ComponentKind, ComponentSpec)> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| parse_error(XmlError::from(e)))?;
            let (element, empty) = match event {
                Event::Start(e) => (e, false),
                Event::Empty(e) => (e, true),
                Event::End(e) => {
                    let name = e.name();
                    let name = name.as_ref();
                    if name == PREPARER_TAG.as_bytes() || name == TEST_TAG.as_bytes() {
                        if let (Some(config), Some((kind, spec))) = (config.as_mut(), current.take())
                        {
                            config.push(kind, spec);
                        }
                    }
                    continue;
                }
                Event::Eof => break,
                _ => continue,
            };

            let name = xml::element_name(&element);
            if config.is_none() {
                if name != ROOT_TAG {
                    return Err(parse_error(XmlError::UnexpectedRoot {
                        expected: ROOT_TAG.to_string(),
                        found: name,
                    }));
                }
                let mut attrs = xml::attributes(&element).map_err(parse_error)?;
                config = Some(ModuleConfig {
                    description: attrs.remove("description"),
                    ..Default::default()
                });
                continue;
            }

            match name.as_str() {
                PREPARER_TAG | TEST_TAG => {
                    let kind = if name == PREPARER_TAG {
                        ComponentKind::Preparer
                    } else {
                        ComponentKind::Test
                    };
                    let spec = component_spec(&element, &name).map_err(parse_error)?;
                    if empty {
                        if let Some(config) = config.as_mut() {
                            config.push(kind, spec);
                        }
                    } else {
                        current = Some((kind, spec));
                    }
                }
                OPTION_TAG => {
                    let mut attrs = xml::attributes(&element).map_err(parse_error)?;
                    let key = xml::required(&mut attrs, OPTION_TAG, "name").map_err(parse_error)?;
                    let value =
                        xml::required(&mut attrs, OPTION_TAG, "value").map_err(parse_error)?;
                    let (_, spec) = current
                        .as_mut()
                        .ok_or_else(|| ConfigError::StrayOption(path.to_path_buf()))?;
                    spec.add_option(key, value);
                }
                _ => {}
            }
        }

        config.ok_or_else(|| parse_error(XmlError::MissingRoot(ROOT_TAG.to_string())))
    }

    fn push(&mut self, kind: ComponentKind, spec: ComponentSpec) {
        match kind {
            ComponentKind::Preparer => self.preparers.push(spec),
            ComponentKind::Test => self.tests.push(spec),
        }
    }
}

fn component_spec(element: &BytesStart<'_>, tag: &str) -> Result<ComponentSpec, XmlError> {
    let mut attrs = xml::attributes(element)?;
    Ok(ComponentSpec::new(xml::required(&mut attrs, tag, "class")?))
}

/// Module name for a configuration file: its file stem.
pub fn module_name(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|stem| stem.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<!-- Copyright notice -->
<configuration description="Config for CTS Foo">
  <target_preparer class="run-command">
    <option name="run-command" value="mkdir -p /data/local/tmp/foo"/>
    <option name="teardown-command" value="rm -rf /data/local/tmp/foo"/>
  </target_preparer>
  <target_preparer class="build-check">
    <option name="expected" value="user"/>
  </target_preparer>
  <test class="shell-test">
    <option name="class" value="android.foo.cts.FooTest"/>
    <option name="case" value="testA=true"/>
    <option name="case" value="testB=test 1 -eq 1 &amp;&amp; true"/>
  </test>
  <test class="shell-test"/>
</configuration>"#;

    #[test]
    fn test_parse_config() {
        let config = ModuleConfig::parse(CONFIG, Path::new("CtsFoo.config")).unwrap();
        assert_eq!(config.description.as_deref(), Some("Config for CTS Foo"));
        assert_eq!(config.preparers.len(), 2);
        assert_eq!(config.preparers[0].class, "run-command");
        assert_eq!(
            config.preparers[0].option("teardown-command"),
            Some("rm -rf /data/local/tmp/foo")
        );
        assert_eq!(config.preparers[1].option("expected"), Some("user"));
        assert_eq!(config.tests.len(), 2);
        assert_eq!(
            config.tests[0].option_values("case"),
            ["testA=true", "testB=test 1 -eq 1 && true"]
        );
        assert!(config.tests[1].options.is_empty());
    }

    #[test]
    fn test_wrong_root_names_the_file() {
        let err = ModuleConfig::parse("<TestPlan/>", Path::new("CtsBar.config")).unwrap_err();
        assert!(err.to_string().contains("CtsBar.config"));
        assert!(matches!(
            err,
            ConfigError::Parse {
                source: XmlError::UnexpectedRoot { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_missing_class_is_an_error() {
        let xml = "<configuration><test><option name=\"a\" value=\"b\"/></test></configuration>";
        assert!(ModuleConfig::parse(xml, Path::new("x.config")).is_err());
    }

    #[test]
    fn test_stray_option_is_an_error() {
        let xml = "<configuration><option name=\"a\" value=\"b\"/></configuration>";
        assert!(matches!(
            ModuleConfig::parse(xml, Path::new("x.config")),
            Err(ConfigError::StrayOption(_))
        ));
    }

    #[test]
    fn test_module_name_is_file_stem() {
        assert_eq!(module_name(Path::new("/t/CtsFoo.config")), Some("CtsFoo"));
    }
}
