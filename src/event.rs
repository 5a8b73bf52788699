//! Test progress events.
//!
//! Sub-tests report through a [`TestListener`], which only enqueues
//! [`InvocationEvent`]s on an unbounded channel. The orchestrator owns the
//! matching [`ResultRecorder`] and folds the events into the module's
//! result record on its own task, so the record is never shared.

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::result::{ModuleResult, ReportLog};

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A test within a module: `class#method`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestIdentifier {
    pub class: String,
    pub method: String,
}

impl TestIdentifier {
    pub fn new(class: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            method: method.into(),
        }
    }
}

impl fmt::Display for TestIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.class, self.method)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InvocationEvent {
    TestStarted { test: TestIdentifier, at: i64 },
    TestFailed { test: TestIdentifier, message: String, stack_trace: String },
    TestMetrics { test: TestIdentifier, report: ReportLog },
    TestEnded { test: TestIdentifier, at: i64 },
    RunFailed { message: String },
}

/// Sending half handed to sub-tests.
#[derive(Debug, Clone)]
pub struct TestListener {
    tx: mpsc::UnboundedSender<InvocationEvent>,
}

impl TestListener {
    /// Creates a listener and the recorder that consumes its events.
    pub fn channel() -> (Self, ResultRecorder) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self { tx },
            ResultRecorder {
                rx,
                run_failures: Vec::new(),
            },
        )
    }

    fn send(&self, event: InvocationEvent) {
        if self.tx.send(event).is_err() {
            warn!("Dropping test event: recorder is gone");
        }
    }

    pub fn test_started(&self, test: &TestIdentifier) {
        self.send(InvocationEvent::TestStarted {
            test: test.clone(),
            at: now_millis(),
        });
    }

    pub fn test_failed(
        &self,
        test: &TestIdentifier,
        message: impl Into<String>,
        stack_trace: impl Into<String>,
    ) {
        self.send(InvocationEvent::TestFailed {
            test: test.clone(),
            message: message.into(),
            stack_trace: stack_trace.into(),
        });
    }

    pub fn test_metrics(&self, test: &TestIdentifier, report: ReportLog) {
        self.send(InvocationEvent::TestMetrics {
            test: test.clone(),
            report,
        });
    }

    pub fn test_ended(&self, test: &TestIdentifier) {
        self.send(InvocationEvent::TestEnded {
            test: test.clone(),
            at: now_millis(),
        });
    }

    pub fn run_failed(&self, message: impl Into<String>) {
        self.send(InvocationEvent::RunFailed {
            message: message.into(),
        });
    }
}

/// Receiving half: applies queued events to a module result.
#[derive(Debug)]
pub struct ResultRecorder {
    rx: mpsc::UnboundedReceiver<InvocationEvent>,
    run_failures: Vec<String>,
}

impl ResultRecorder {
    /// Applies every event queued so far to `module`.
    pub fn drain_into(&mut self, module: &mut ModuleResult) {
        while let Ok(event) = self.rx.try_recv() {
            self.apply(module, event);
        }
    }

    /// Run-level failures reported since the recorder was created.
    pub fn run_failures(&self) -> &[String] {
        &self.run_failures
    }

    fn apply(&mut self, module: &mut ModuleResult, event: InvocationEvent) {
        match event {
            InvocationEvent::TestStarted { test, at } => {
                debug!("[{}] started {}", module.id(), test);
                let result = module
                    .get_or_create_case(&test.class)
                    .get_or_create_result(&test.method);
                result.reset();
                result.set_start(at);
            }
            InvocationEvent::TestFailed {
                test,
                message,
                stack_trace,
            } => {
                module
                    .get_or_create_case(&test.class)
                    .get_or_create_result(&test.method)
                    .failed(message, stack_trace);
            }
            InvocationEvent::TestMetrics { test, report } => {
                module
                    .get_or_create_case(&test.class)
                    .get_or_create_result(&test.method)
                    .set_report_log(report);
            }
            InvocationEvent::TestEnded { test, at } => {
                let result = module
                    .get_or_create_case(&test.class)
                    .get_or_create_result(&test.method);
                result.set_end(at);
                result.passed(None);
                let status = result.status();
                debug!("[{}] ended {}: {:?}", module.id(), test, status);
            }
            InvocationEvent::RunFailed { message } => {
                warn!("[{}] run failed: {}", module.id(), message);
                self.run_failures.push(message);
            }
        }
    }
}

/// Marks every test that started but never reported an outcome as not
/// executed, so a retry session picks it up.
pub fn close_incomplete(module: &mut ModuleResult) {
    let incomplete: Vec<String> = module
        .cases()
        .iter()
        .flat_map(|case| {
            case.results()
                .iter()
                .filter(|r| r.status().is_none())
                .map(move |r| format!("{}#{}", case.name(), r.name()))
        })
        .collect();
    for test in incomplete {
        let result = module.get_or_create_result(&test);
        result.not_executed();
        if result.end() == 0 {
            result.set_end(now_millis());
        }
    }
}
