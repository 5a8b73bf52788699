//! In-memory invocation result model.
//!
//! ```text
//! InvocationResult
//! └── ModuleResult        ("abi name", device serial)
//!     └── CaseResult      (test class)
//!         └── TestResult  (method, status, timing, failure, metrics)
//! ```
//!
//! Every level answers [`count_results`](InvocationResult::count_results);
//! the count at a level is the sum over its children.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::abi;
use crate::filter::TestFilter;

/// Method name under which a preparer's setup failure is recorded, as
/// `<preparer class>#setUp`.
pub const SETUP_METHOD: &str = "setUp";

/// Outcome of a single test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestStatus {
    Pass,
    Fail,
    NotExecuted,
}

impl TestStatus {
    pub const ALL: [TestStatus; 3] = [TestStatus::Pass, TestStatus::Fail, TestStatus::NotExecuted];

    /// The status as written to result files.
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Pass => "pass",
            TestStatus::Fail => "fail",
            TestStatus::NotExecuted => "not-executed",
        }
    }

    /// Returns true if a retry session should run this test again.
    pub fn needs_retry(&self) -> bool {
        matches!(self, TestStatus::Fail | TestStatus::NotExecuted)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pass" => Ok(TestStatus::Pass),
            "fail" => Ok(TestStatus::Fail),
            "not-executed" => Ok(TestStatus::NotExecuted),
            other => Err(format!("unknown test status '{}'", other)),
        }
    }
}

macro_rules! report_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($name), other)),
                }
            }
        }
    };
}

report_enum!(
    /// How a metric's values should be read.
    ScoreType {
        HigherBetter => "higher_better",
        LowerBetter => "lower_better",
        Neutral => "neutral",
        Warning => "warning",
    }
);

report_enum!(
    /// Unit of a metric's values.
    ScoreUnit {
        None => "none",
        Ms => "ms",
        Fps => "fps",
        Ops => "ops",
        Kbps => "kbps",
        Mbps => "mbps",
        Byte => "byte",
        Count => "count",
        Score => "score",
    }
);

/// A named series of measurements reported by a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Where the metric was produced, usually `class#method:line`.
    pub source: String,
    pub message: String,
    pub score_type: ScoreType,
    pub unit: ScoreUnit,
    pub values: Vec<f64>,
}

impl Metric {
    pub fn new(
        source: impl Into<String>,
        message: impl Into<String>,
        score_type: ScoreType,
        unit: ScoreUnit,
        values: Vec<f64>,
    ) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
            score_type,
            unit,
            values,
        }
    }
}

/// Metrics attached to a test: one headline summary and any details.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportLog {
    pub summary: Option<Metric>,
    pub details: Vec<Metric>,
}

impl ReportLog {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.details.is_empty()
    }
}

/// Result of one test method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestResult {
    name: String,
    status: Option<TestStatus>,
    start: i64,
    end: i64,
    message: Option<String>,
    stack_trace: Option<String>,
    report_log: Option<ReportLog>,
}

impl TestResult {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Method name, without the class.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `None` until the test reports an outcome.
    pub fn status(&self) -> Option<TestStatus> {
        self.status
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }

    pub fn report_log(&self) -> Option<&ReportLog> {
        self.report_log.as_ref()
    }

    pub fn set_start(&mut self, millis: i64) {
        self.start = millis;
    }

    pub fn set_end(&mut self, millis: i64) {
        self.end = millis;
    }

    pub fn set_report_log(&mut self, report_log: ReportLog) {
        self.report_log = Some(report_log);
    }

    /// Sets the status unless one was already recorded this attempt.
    ///
    /// Returns true if the status was applied.
    pub fn set_status(&mut self, status: TestStatus) -> bool {
        if self.status.is_some() {
            return false;
        }
        self.status = Some(status);
        true
    }

    /// Marks the test passed. No effect on an already-failed test.
    pub fn passed(&mut self, report_log: Option<ReportLog>) {
        if self.set_status(TestStatus::Pass)
            && let Some(log) = report_log
        {
            self.report_log = Some(log);
        }
    }

    /// Marks the test failed with a message and stack trace.
    pub fn failed(&mut self, message: impl Into<String>, stack_trace: impl Into<String>) {
        if self.set_status(TestStatus::Fail) {
            self.message = Some(message.into());
            self.stack_trace = Some(stack_trace.into());
        }
    }

    pub fn not_executed(&mut self) {
        self.set_status(TestStatus::NotExecuted);
    }

    /// Clears the outcome so the test can be recorded again by a retry.
    pub fn reset(&mut self) {
        self.status = None;
        self.message = None;
        self.stack_trace = None;
        self.report_log = None;
        self.start = 0;
        self.end = 0;
    }

    /// Restores a failure read from a result file.
    pub(crate) fn set_failure(&mut self, message: Option<String>, stack_trace: Option<String>) {
        self.message = message;
        self.stack_trace = stack_trace;
    }
}

/// Results for one test class within a module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseResult {
    name: String,
    results: Vec<TestResult>,
}

impl CaseResult {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            results: Vec::new(),
        }
    }

    /// Test class name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    pub fn result(&self, method: &str) -> Option<&TestResult> {
        self.results.iter().find(|r| r.name == method)
    }

    pub fn get_or_create_result(&mut self, method: &str) -> &mut TestResult {
        let index = match self.results.iter().position(|r| r.name == method) {
            Some(index) => index,
            None => {
                self.results.push(TestResult::new(method));
                self.results.len() - 1
            }
        };
        &mut self.results[index]
    }

    pub fn count_results(&self, status: TestStatus) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == Some(status))
            .count()
    }
}

/// Results for one module on one ABI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleResult {
    id: String,
    abi: String,
    name: String,
    device: Option<String>,
    cases: Vec<CaseResult>,
}

impl ModuleResult {
    /// Creates a result for module id `abi name`.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let (abi, name) = match abi::parse_id(&id) {
            Some((abi, name)) => (abi.to_string(), name.to_string()),
            None => (String::new(), id.clone()),
        };
        Self {
            id,
            abi,
            name,
            device: None,
            cases: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn abi(&self) -> &str {
        &self.abi
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn set_device(&mut self, serial: impl Into<String>) {
        self.device = Some(serial.into());
    }

    pub fn cases(&self) -> &[CaseResult] {
        &self.cases
    }

    pub fn case(&self, class: &str) -> Option<&CaseResult> {
        self.cases.iter().find(|c| c.name == class)
    }

    pub fn get_or_create_case(&mut self, class: &str) -> &mut CaseResult {
        let index = match self.cases.iter().position(|c| c.name == class) {
            Some(index) => index,
            None => {
                self.cases.push(CaseResult::new(class));
                self.cases.len() - 1
            }
        };
        &mut self.cases[index]
    }

    /// Looks up `class#method`, creating the case and test as needed.
    pub fn get_or_create_result(&mut self, test: &str) -> &mut TestResult {
        let (class, method) = split_test_name(test);
        self.get_or_create_case(class).get_or_create_result(method)
    }

    pub fn count_results(&self, status: TestStatus) -> usize {
        self.cases.iter().map(|c| c.count_results(status)).sum()
    }

    /// Removes `class#method`, and its case if that leaves it empty.
    pub fn remove_result(&mut self, test: &str) -> Option<TestResult> {
        let (class, method) = split_test_name(test);
        let index = self.cases.iter().position(|c| c.name == class)?;
        let case = &mut self.cases[index];
        let position = case.results.iter().position(|r| r.name == method)?;
        let removed = case.results.remove(position);
        if case.results.is_empty() {
            self.cases.remove(index);
        }
        Some(removed)
    }

    /// Returns true if a preparer failed to set this module up.
    pub fn setup_failed(&self) -> bool {
        self.cases.iter().any(|case| {
            case.result(SETUP_METHOD)
                .is_some_and(|r| r.status.is_some_and(|s| s.needs_retry()))
        })
    }
}

/// Splits `class#method` into its halves. A name without `#` is all class.
pub fn split_test_name(test: &str) -> (&str, &str) {
    test.split_once('#').unwrap_or((test, ""))
}

/// Everything recorded by one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvocationResult {
    pub start: i64,
    pub end: i64,
    pub suite_name: String,
    pub suite_version: String,
    pub suite_plan: String,
    pub report_version: String,
    pub host_name: String,
    pub os_name: String,
    pub os_arch: String,
    pub harness_version: String,
    /// Build attributes collected from devices (`DEVICE_INFO_GENERIC_*`).
    pub build_attributes: BTreeMap<String, String>,
    /// Session this invocation is a retry of, if any.
    pub retry_session: Option<u32>,
    pub result_dir: Option<PathBuf>,
    serials: BTreeSet<String>,
    modules: Vec<ModuleResult>,
}

impl InvocationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn modules(&self) -> &[ModuleResult] {
        &self.modules
    }

    pub fn module(&self, id: &str) -> Option<&ModuleResult> {
        self.modules.iter().find(|m| m.id == id)
    }

    pub fn get_or_create_module(&mut self, id: &str) -> &mut ModuleResult {
        let index = match self.modules.iter().position(|m| m.id == id) {
            Some(index) => index,
            None => {
                self.modules.push(ModuleResult::new(id));
                self.modules.len() - 1
            }
        };
        &mut self.modules[index]
    }

    pub fn add_device_serial(&mut self, serial: impl Into<String>) {
        self.serials.insert(serial.into());
    }

    pub fn device_serials(&self) -> impl Iterator<Item = &str> {
        self.serials.iter().map(String::as_str)
    }

    pub fn count_results(&self, status: TestStatus) -> usize {
        self.modules.iter().map(|m| m.count_results(status)).sum()
    }

    /// Builds one include filter `abi name class#method` per test that
    /// failed or was not executed.
    ///
    /// A module whose setup failed never ran its tests, so it is retried
    /// whole with a single `abi name` filter.
    pub fn synthesize_retry_filters(&self) -> Vec<TestFilter> {
        let mut filters = Vec::new();
        for module in &self.modules {
            let abi = (!module.abi.is_empty()).then_some(module.abi.as_str());
            if module.setup_failed() {
                match TestFilter::include(abi, &module.name, None) {
                    Ok(filter) => filters.push(filter),
                    Err(e) => tracing::warn!("Skipping unretryable module {}: {}", module.id, e),
                }
                continue;
            }
            for case in &module.cases {
                for result in &case.results {
                    if !result.status.is_some_and(|s| s.needs_retry()) {
                        continue;
                    }
                    let test = format!("{}#{}", case.name, result.name);
                    match TestFilter::include(abi, &module.name, Some(&test)) {
                        Ok(filter) => filters.push(filter),
                        Err(e) => tracing::warn!("Skipping unretryable test {}: {}", test, e),
                    }
                }
            }
        }
        filters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_write_once() {
        let mut result = TestResult::new("testFoo");
        assert_eq!(result.status(), None);

        result.failed("boom", "trace");
        result.passed(None);
        assert_eq!(result.status(), Some(TestStatus::Fail));
        assert_eq!(result.message(), Some("boom"));

        result.reset();
        assert_eq!(result.status(), None);
        assert_eq!(result.message(), None);
        result.passed(None);
        assert_eq!(result.status(), Some(TestStatus::Pass));
    }

    #[test]
    fn test_counts_sum_over_children() {
        let mut invocation = InvocationResult::new();
        let module = invocation.get_or_create_module("x86 ModuleA");
        module.get_or_create_result("a.Foo#test1").passed(None);
        module.get_or_create_result("a.Foo#test2").failed("m", "s");
        module.get_or_create_result("a.Bar#test3").passed(None);
        module.get_or_create_result("a.Bar#test4");

        let other = invocation.get_or_create_module("x86_64 ModuleA");
        other.get_or_create_result("a.Foo#test1").not_executed();

        assert_eq!(invocation.count_results(TestStatus::Pass), 2);
        assert_eq!(invocation.count_results(TestStatus::Fail), 1);
        assert_eq!(invocation.count_results(TestStatus::NotExecuted), 1);

        for status in TestStatus::ALL {
            let total: usize = invocation
                .modules()
                .iter()
                .map(|m| m.cases().iter().map(|c| c.count_results(status)).sum::<usize>())
                .sum();
            assert_eq!(invocation.count_results(status), total);
        }
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut invocation = InvocationResult::new();
        invocation.get_or_create_module("x86 ModuleA");
        invocation.get_or_create_module("x86 ModuleA");
        assert_eq!(invocation.modules().len(), 1);

        let module = invocation.get_or_create_module("x86 ModuleA");
        assert_eq!(module.abi(), "x86");
        assert_eq!(module.name(), "ModuleA");
        module.get_or_create_result("a.Foo#test1");
        module.get_or_create_result("a.Foo#test1");
        assert_eq!(module.cases().len(), 1);
        assert_eq!(module.cases()[0].results().len(), 1);
    }

    #[test]
    fn test_retry_filters_cover_failed_and_not_executed() {
        let mut invocation = InvocationResult::new();
        let module = invocation.get_or_create_module("arm64-v8a CtsFoo");
        module.get_or_create_result("a.B#fail1").failed("m", "s");
        module.get_or_create_result("a.B#fail2").failed("m", "s");
        module.get_or_create_result("a.B#skipped").not_executed();
        for i in 0..5 {
            module
                .get_or_create_result(&format!("a.C#pass{}", i))
                .passed(None);
        }

        let filters: Vec<String> = invocation
            .synthesize_retry_filters()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            filters,
            vec![
                "arm64-v8a CtsFoo a.B#fail1",
                "arm64-v8a CtsFoo a.B#fail2",
                "arm64-v8a CtsFoo a.B#skipped",
            ]
        );
        let parsed: TestFilter = filters[0].parse().unwrap();
        assert_eq!(parsed.abi(), Some("arm64-v8a"));
        assert_eq!(parsed.test(), Some("a.B#fail1"));
    }

    #[test]
    fn test_setup_failure_retries_the_whole_module() {
        let mut invocation = InvocationResult::new();
        let broken = invocation.get_or_create_module("x86 CtsBroken");
        broken
            .get_or_create_result(&format!("run-command#{}", SETUP_METHOD))
            .failed("exit 2", "exit 2");
        let flaky = invocation.get_or_create_module("x86 CtsFlaky");
        flaky.get_or_create_result("a.B#testA").failed("m", "s");

        let filters: Vec<String> = invocation
            .synthesize_retry_filters()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(filters, vec!["x86 CtsBroken", "x86 CtsFlaky a.B#testA"]);
    }

    #[test]
    fn test_remove_result_drops_empty_case() {
        let mut module = ModuleResult::new("x86 CtsFoo");
        module.get_or_create_result("run-command#setUp").failed("m", "s");
        module.get_or_create_result("a.B#testA").passed(None);
        assert!(module.setup_failed());

        let removed = module.remove_result("run-command#setUp").unwrap();
        assert_eq!(removed.status(), Some(TestStatus::Fail));
        assert!(module.case("run-command").is_none());
        assert!(!module.setup_failed());
        assert!(module.remove_result("a.B#missing").is_none());
        assert_eq!(module.count_results(TestStatus::Pass), 1);
    }

    #[test]
    fn test_report_enums_parse_their_display() {
        for unit in ["none", "ms", "fps", "ops", "kbps", "mbps", "byte", "count", "score"] {
            assert_eq!(unit.parse::<ScoreUnit>().unwrap().as_str(), unit);
        }
        for kind in ["higher_better", "lower_better", "neutral", "warning"] {
            assert_eq!(kind.parse::<ScoreType>().unwrap().to_string(), kind);
        }
        assert!("furlongs".parse::<ScoreUnit>().is_err());
        assert_eq!("not-executed".parse::<TestStatus>(), Ok(TestStatus::NotExecuted));
    }
}
