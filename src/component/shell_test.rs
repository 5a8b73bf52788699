//! A sub-test whose test cases are shell commands.
//!
//! ```xml
//! <test class="shell-test">
//!   <option name="class" value="android.os.cts.BuildTest"/>
//!   <option name="case" value="testAbis=getprop ro.product.cpu.abilist | grep -q arm"/>
//!   <option name="case" value="testSdk=test $(getprop ro.build.version.sdk) -ge 24"/>
//! </test>
//! ```
//!
//! Each `case` is `method=command` and reports as `class#method`. The class
//! defaults to the module name. A command exiting 0 passes; anything else
//! fails with stderr as the stack trace.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{ComponentError, ComponentResult, ModuleContext, SubTest, SupportsFiltering};
use crate::device::DeviceResult;
use crate::event::{TestIdentifier, TestListener};
use crate::module::ComponentSpec;

pub const SHELL_TEST: &str = "shell-test";

#[derive(Debug, Clone)]
struct ShellCase {
    method: String,
    command: String,
}

#[derive(Debug, Clone)]
pub struct ShellTest {
    class: Option<String>,
    cases: Vec<ShellCase>,
    include_filters: Vec<String>,
    exclude_filters: Vec<String>,
}

impl ShellTest {
    pub fn from_spec(spec: &ComponentSpec) -> ComponentResult<Self> {
        let mut cases = Vec::new();
        for value in spec.option_values("case") {
            let (method, command) = value
                .split_once('=')
                .map(|(m, c)| (m.trim(), c.trim()))
                .filter(|(m, c)| !m.is_empty() && !c.is_empty())
                .ok_or_else(|| {
                    ComponentError::invalid(
                        SHELL_TEST,
                        "case",
                        format!("expected 'method=command', got '{}'", value),
                    )
                })?;
            if method.contains('#') || method.chars().any(char::is_whitespace) {
                return Err(ComponentError::invalid(
                    SHELL_TEST,
                    "case",
                    format!("invalid method name '{}'", method),
                ));
            }
            cases.push(ShellCase {
                method: method.to_string(),
                command: command.to_string(),
            });
        }
        Ok(Self {
            class: spec.option("class").map(str::to_string),
            cases,
            include_filters: Vec::new(),
            exclude_filters: Vec::new(),
        })
    }

    /// Returns true if the test `class#method` survives the filters.
    ///
    /// A filter names either a whole class or a single `class#method`.
    fn should_run(&self, test: &TestIdentifier) -> bool {
        let full = test.to_string();
        let hit = |filter: &String| *filter == full || *filter == test.class;
        (self.include_filters.is_empty() || self.include_filters.iter().any(hit))
            && !self.exclude_filters.iter().any(hit)
    }
}

impl SupportsFiltering for ShellTest {
    fn add_include_filter(&mut self, filter: &str) {
        self.include_filters.push(filter.to_string());
    }

    fn add_exclude_filter(&mut self, filter: &str) {
        self.exclude_filters.push(filter.to_string());
    }
}

#[async_trait]
impl SubTest for ShellTest {
    fn class(&self) -> &str {
        SHELL_TEST
    }

    async fn run(&mut self, ctx: &ModuleContext<'_>, listener: &TestListener) -> DeviceResult<()> {
        let class = self.class.as_deref().unwrap_or(ctx.module_name);
        for case in &self.cases {
            let test = TestIdentifier::new(class, &case.method);
            if !self.should_run(&test) {
                debug!("[{}] filtered out {}", ctx.module_name, test);
                continue;
            }

            listener.test_started(&test);
            match ctx.device.execute_shell_command(&case.command).await {
                Ok(output) if output.success() => {}
                Ok(output) => listener.test_failed(
                    &test,
                    format!("Command exited with code {}", output.exit_code),
                    output.stderr,
                ),
                Err(e) if e.is_unavailable() => {
                    listener.run_failed(e.to_string());
                    return Err(e);
                }
                Err(e) => {
                    warn!("[{}] {} could not run: {}", ctx.module_name, test, e);
                    listener.test_failed(&test, e.to_string(), String::new());
                }
            }
            listener.test_ended(&test);
        }
        Ok(())
    }

    fn filtering(&mut self) -> Option<&mut dyn SupportsFiltering> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::Abi;
    use crate::component::RunFlags;
    use crate::component::testing::FakeDevice;
    use crate::context::BuildContext;
    use crate::layout::SuiteLayout;
    use crate::result::{ModuleResult, TestStatus};

    fn spec() -> ComponentSpec {
        ComponentSpec::new(SHELL_TEST)
            .with_option("class", "a.B")
            .with_option("case", "testOne=true")
            .with_option("case", "testTwo=false")
            .with_option("case", "testThree=echo ok")
    }

    async fn run(device: &FakeDevice, test: &mut ShellTest) -> (DeviceResult<()>, ModuleResult) {
        let build = BuildContext::new("CTS", "1", SuiteLayout::new("/nonexistent"));
        let abi = Abi::new("x86");
        let ctx = ModuleContext {
            device,
            build: &build,
            abi: &abi,
            module_name: "CtsFoo",
            result_dir: None,
            flags: RunFlags::default(),
        };
        let (listener, mut recorder) = TestListener::channel();
        let outcome = test.run(&ctx, &listener).await;
        let mut module = ModuleResult::new("x86 CtsFoo");
        recorder.drain_into(&mut module);
        (outcome, module)
    }

    #[tokio::test]
    async fn test_exit_code_decides_outcome() {
        let device = FakeDevice::new("d", &["x86"]);
        device.respond(0, "");
        device.respond(1, "assertion failed");
        let mut test = ShellTest::from_spec(&spec()).unwrap();

        let (outcome, module) = run(&device, &mut test).await;
        outcome.unwrap();
        assert_eq!(module.count_results(TestStatus::Pass), 2);
        let failed = module.case("a.B").unwrap().result("testTwo").unwrap();
        assert_eq!(failed.status(), Some(TestStatus::Fail));
        assert_eq!(failed.stack_trace(), Some("assertion failed"));
        assert_eq!(device.commands(), vec!["true", "false", "echo ok"]);
    }

    #[tokio::test]
    async fn test_filters_select_cases() {
        let device = FakeDevice::new("d", &["x86"]);
        let mut test = ShellTest::from_spec(&spec()).unwrap();
        {
            let filtering = test.filtering().unwrap();
            filtering.add_include_filter("a.B");
            filtering.add_exclude_filter("a.B#testTwo");
        }
        let (_, module) = run(&device, &mut test).await;
        let case = module.case("a.B").unwrap();
        assert!(case.result("testOne").is_some());
        assert!(case.result("testTwo").is_none());
        assert_eq!(device.commands(), vec!["true", "echo ok"]);

        let mut only = ShellTest::from_spec(&spec()).unwrap();
        only.add_include_filter("a.B#testThree");
        let device = FakeDevice::new("d", &["x86"]);
        run(&device, &mut only).await.0.unwrap();
        assert_eq!(device.commands(), vec!["echo ok"]);
    }

    #[tokio::test]
    async fn test_class_defaults_to_module_name() {
        let device = FakeDevice::new("d", &["x86"]);
        let spec = ComponentSpec::new(SHELL_TEST).with_option("case", "testIt=true");
        let mut test = ShellTest::from_spec(&spec).unwrap();
        let (_, module) = run(&device, &mut test).await;
        assert!(module.case("CtsFoo").unwrap().result("testIt").is_some());
    }

    #[tokio::test]
    async fn test_unavailable_device_stops_the_run() {
        let device = FakeDevice::new("d", &["x86"]);
        device.go_offline();
        let mut test = ShellTest::from_spec(&spec()).unwrap();
        let (outcome, module) = run(&device, &mut test).await;
        assert!(outcome.unwrap_err().is_unavailable());
        let started = module.case("a.B").unwrap().result("testOne").unwrap();
        assert_eq!(started.status(), None);
    }

    #[test]
    fn test_rejects_bad_cases() {
        let spec = ComponentSpec::new(SHELL_TEST).with_option("case", "=true");
        assert!(ShellTest::from_spec(&spec).is_err());
        let spec = ComponentSpec::new(SHELL_TEST).with_option("case", "bad name=true");
        assert!(ShellTest::from_spec(&spec).is_err());
    }
}
