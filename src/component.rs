//! Target preparers and sub-tests.
//!
//! A module is a list of preparers followed by a list of sub-tests. Both are
//! described in module configuration files by a class name and options
//! ([`ComponentSpec`]) and instantiated through a [`ComponentRegistry`] right
//! before the module runs.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         module run                            │
//! │                                                               │
//! │  TargetPreparer::set_up      (in order)                       │
//! │        │                                                      │
//! │        ▼                                                      │
//! │  SubTest::run ──► TestListener ──► events ──► ModuleResult    │
//! │        │                                                      │
//! │        ▼                                                      │
//! │  TargetPreparer::tear_down   (reverse order)                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Built-in Components
//!
//! | Class | Kind | Module |
//! |-------|------|--------|
//! | `run-command` | preparer | [`preparers::RunCommand`] |
//! | `file-pusher` | preparer | [`preparers::FilePusher`] |
//! | `build-check` | preparer, gated on preconditions | [`preparers::BuildCheck`] |
//! | `device-info` | preparer, gated on device info | [`preparers::DeviceInfoCollector`] |
//! | `shell-test` | sub-test | [`shell_test::ShellTest`] |

pub mod preparers;
pub mod shell_test;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use crate::abi::Abi;
use crate::context::BuildContext;
use crate::device::{Device, DeviceError, DeviceResult};
use crate::event::TestListener;
use crate::module::ComponentSpec;

pub type PreparerResult<T> = Result<T, PreparerError>;
pub type ComponentResult<T> = Result<T, ComponentError>;

/// Errors raised by a preparer.
#[derive(Debug, thiserror::Error)]
pub enum PreparerError {
    /// The module cannot run; the rest of the invocation continues.
    #[error("Setup failed: {0}")]
    Setup(String),

    /// The device went away; the invocation stops.
    #[error(transparent)]
    Device(DeviceError),
}

impl From<DeviceError> for PreparerError {
    /// Only an unavailable device is fatal to the run; any other device
    /// error just fails the module's setup.
    fn from(error: DeviceError) -> Self {
        if error.is_unavailable() {
            PreparerError::Device(error)
        } else {
            PreparerError::Setup(error.to_string())
        }
    }
}

/// Errors building a component from its descriptor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComponentError {
    #[error("Unknown {kind} class '{class}'")]
    UnknownClass { kind: ComponentKind, class: String },

    #[error("Invalid option '{option}' for '{class}': {reason}")]
    InvalidOption {
        class: String,
        option: String,
        reason: String,
    },
}

impl ComponentError {
    pub(crate) fn invalid(class: &str, option: &str, reason: impl Into<String>) -> Self {
        ComponentError::InvalidOption {
            class: class.to_string(),
            option: option.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Preparer,
    Test,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentKind::Preparer => f.write_str("target_preparer"),
            ComponentKind::Test => f.write_str("test"),
        }
    }
}

/// Run-wide switches that gated preparers consult.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunFlags {
    pub skip_preconditions: bool,
    pub skip_device_info: bool,
}

/// Everything a component can see while a module runs.
pub struct ModuleContext<'a> {
    pub device: &'a dyn Device,
    pub build: &'a BuildContext,
    pub abi: &'a Abi,
    pub module_name: &'a str,
    pub result_dir: Option<&'a Path>,
    pub flags: RunFlags,
}

/// Prepares a device before a module's tests run.
#[async_trait]
pub trait TargetPreparer: Send {
    /// Registered class name, used to label setup failures.
    fn class(&self) -> &str;

    async fn set_up(&mut self, ctx: &ModuleContext<'_>) -> PreparerResult<()>;

    /// Undoes `set_up`. `cause` carries the module's failure, if any.
    async fn tear_down(
        &mut self,
        _ctx: &ModuleContext<'_>,
        _cause: Option<&str>,
    ) -> PreparerResult<()> {
        Ok(())
    }
}

/// Narrowing by test name, for sub-tests that support it.
pub trait SupportsFiltering {
    fn add_include_filter(&mut self, filter: &str);
    fn add_exclude_filter(&mut self, filter: &str);
}

/// A runnable unit of tests within a module.
#[async_trait]
pub trait SubTest: Send {
    fn class(&self) -> &str;

    /// Runs the tests, reporting progress through `listener`.
    async fn run(&mut self, ctx: &ModuleContext<'_>, listener: &TestListener) -> DeviceResult<()>;

    /// Returns the filtering capability if this sub-test has one.
    fn filtering(&mut self) -> Option<&mut dyn SupportsFiltering> {
        None
    }
}

/// Skip predicate attached to a preparer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Skipped under `--skip-preconditions`.
    Preconditions,
    /// Skipped under `--skip-device-info`.
    DeviceInfo,
}

impl Gate {
    pub fn skips(&self, flags: RunFlags) -> bool {
        match self {
            Gate::Preconditions => flags.skip_preconditions,
            Gate::DeviceInfo => flags.skip_device_info,
        }
    }
}

/// A preparer that only runs when its gate is open.
pub struct Gated<P> {
    gate: Gate,
    inner: P,
}

impl<P: TargetPreparer> Gated<P> {
    pub fn new(gate: Gate, inner: P) -> Self {
        Self { gate, inner }
    }

    pub fn gate(&self) -> Gate {
        self.gate
    }
}

#[async_trait]
impl<P: TargetPreparer> TargetPreparer for Gated<P> {
    fn class(&self) -> &str {
        self.inner.class()
    }

    async fn set_up(&mut self, ctx: &ModuleContext<'_>) -> PreparerResult<()> {
        if self.gate.skips(ctx.flags) {
            info!("Skipping {} ({:?} gate closed)", self.inner.class(), self.gate);
            return Ok(());
        }
        self.inner.set_up(ctx).await
    }

    async fn tear_down(
        &mut self,
        ctx: &ModuleContext<'_>,
        cause: Option<&str>,
    ) -> PreparerResult<()> {
        if self.gate.skips(ctx.flags) {
            return Ok(());
        }
        self.inner.tear_down(ctx, cause).await
    }
}

type PreparerFactory =
    Box<dyn Fn(&ComponentSpec) -> ComponentResult<Box<dyn TargetPreparer>> + Send + Sync>;
type SubTestFactory = Box<dyn Fn(&ComponentSpec) -> ComponentResult<Box<dyn SubTest>> + Send + Sync>;

/// Maps class names to component constructors.
#[derive(Default)]
pub struct ComponentRegistry {
    preparers: BTreeMap<String, PreparerFactory>,
    tests: BTreeMap<String, SubTestFactory>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in component.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_preparer(preparers::RUN_COMMAND, |spec| {
            Ok(Box::new(preparers::RunCommand::from_spec(spec)?))
        });
        registry.register_preparer(preparers::FILE_PUSHER, |spec| {
            Ok(Box::new(preparers::FilePusher::from_spec(spec)?))
        });
        registry.register_preparer(preparers::BUILD_CHECK, |spec| {
            Ok(Box::new(Gated::new(
                Gate::Preconditions,
                preparers::BuildCheck::from_spec(spec)?,
            )))
        });
        registry.register_preparer(preparers::DEVICE_INFO, |spec| {
            Ok(Box::new(Gated::new(
                Gate::DeviceInfo,
                preparers::DeviceInfoCollector::from_spec(spec)?,
            )))
        });
        registry.register_sub_test(shell_test::SHELL_TEST, |spec| {
            Ok(Box::new(shell_test::ShellTest::from_spec(spec)?))
        });
        registry
    }

    pub fn register_preparer<F>(&mut self, class: impl Into<String>, factory: F)
    where
        F: Fn(&ComponentSpec) -> ComponentResult<Box<dyn TargetPreparer>> + Send + Sync + 'static,
    {
        self.preparers.insert(class.into(), Box::new(factory));
    }

    pub fn register_sub_test<F>(&mut self, class: impl Into<String>, factory: F)
    where
        F: Fn(&ComponentSpec) -> ComponentResult<Box<dyn SubTest>> + Send + Sync + 'static,
    {
        self.tests.insert(class.into(), Box::new(factory));
    }

    pub fn preparer(&self, spec: &ComponentSpec) -> ComponentResult<Box<dyn TargetPreparer>> {
        let factory = self
            .preparers
            .get(&spec.class)
            .ok_or_else(|| ComponentError::UnknownClass {
                kind: ComponentKind::Preparer,
                class: spec.class.clone(),
            })?;
        factory(spec)
    }

    pub fn sub_test(&self, spec: &ComponentSpec) -> ComponentResult<Box<dyn SubTest>> {
        let factory = self
            .tests
            .get(&spec.class)
            .ok_or_else(|| ComponentError::UnknownClass {
                kind: ComponentKind::Test,
                class: spec.class.clone(),
            })?;
        factory(spec)
    }

    /// Checks that `spec` names a known class with valid options.
    pub fn validate(&self, kind: ComponentKind, spec: &ComponentSpec) -> ComponentResult<()> {
        match kind {
            ComponentKind::Preparer => self.preparer(spec).map(drop),
            ComponentKind::Test => self.sub_test(spec).map(drop),
        }
    }

    pub fn preparer_classes(&self) -> impl Iterator<Item = &str> {
        self.preparers.keys().map(String::as_str)
    }

    pub fn test_classes(&self) -> impl Iterator<Item = &str> {
        self.tests.keys().map(String::as_str)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeDevice;
    use super::*;
    use crate::layout::SuiteLayout;

    struct Recording {
        ran: bool,
    }

    #[async_trait]
    impl TargetPreparer for Recording {
        fn class(&self) -> &str {
            "recording"
        }

        async fn set_up(&mut self, _ctx: &ModuleContext<'_>) -> PreparerResult<()> {
            self.ran = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_gate_skips_when_flag_set() {
        let device = FakeDevice::new("d", &["x86"]);
        let build = BuildContext::new("CTS", "1", SuiteLayout::new("/nonexistent"));
        let abi = Abi::new("x86");
        let mut ctx = ModuleContext {
            device: &device,
            build: &build,
            abi: &abi,
            module_name: "CtsFoo",
            result_dir: None,
            flags: RunFlags {
                skip_preconditions: true,
                skip_device_info: false,
            },
        };

        let mut gated = Gated::new(Gate::Preconditions, Recording { ran: false });
        gated.set_up(&ctx).await.unwrap();
        assert!(!gated.inner.ran);

        ctx.flags.skip_preconditions = false;
        gated.set_up(&ctx).await.unwrap();
        assert!(gated.inner.ran);

        let mut info = Gated::new(Gate::DeviceInfo, Recording { ran: false });
        ctx.flags.skip_device_info = true;
        info.set_up(&ctx).await.unwrap();
        assert!(!info.inner.ran);
        assert_eq!(info.class(), "recording");
    }

    #[test]
    fn test_registry_validation() {
        let registry = ComponentRegistry::with_builtins();
        assert!(registry
            .validate(ComponentKind::Preparer, &ComponentSpec::new("run-command"))
            .is_ok());
        assert!(registry
            .validate(ComponentKind::Test, &ComponentSpec::new("shell-test"))
            .is_ok());

        let err = registry
            .validate(ComponentKind::Test, &ComponentSpec::new("run-command"))
            .unwrap_err();
        assert_eq!(
            err,
            ComponentError::UnknownClass {
                kind: ComponentKind::Test,
                class: "run-command".to_string()
            }
        );

        let bad = ComponentSpec::new("shell-test").with_option("case", "no-equals-sign");
        assert!(matches!(
            registry.validate(ComponentKind::Test, &bad),
            Err(ComponentError::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = ComponentRegistry::new();
        registry.register_preparer("recording", |_| Ok(Box::new(Recording { ran: false })));
        let preparer = registry
            .preparer(&ComponentSpec::new("recording"))
            .unwrap();
        assert_eq!(preparer.class(), "recording");
        assert_eq!(registry.preparer_classes().collect::<Vec<_>>(), vec!["recording"]);
    }

    #[test]
    fn test_only_unavailable_is_fatal() {
        let fatal: PreparerError = DeviceError::Unavailable {
            serial: "d".to_string(),
            reason: "gone".to_string(),
        }
        .into();
        assert!(matches!(fatal, PreparerError::Device(_)));

        let local: PreparerError = DeviceError::PushFailed("x".to_string()).into();
        assert!(matches!(local, PreparerError::Setup(_)));
    }
}
