//! Invocation orchestration.
//!
//! An [`Orchestrator`] drives one shard of an invocation against one device:
//! it resolves the ABIs to run, selects and shards modules from the
//! repository, then runs each module's preparers and sub-tests while
//! recording results into the invocation shared by every shard.
//!
//! # Architecture
//!
//! ```text
//!   Device               ModuleRepository            ResultStore
//!     │                         │                         ▲
//!     │ abis()                  │                         │ save()
//!     ▼                         │                         │
//!  AbiResolution ──► scan() ───►│                         │
//!                               │ select(includes,        │
//!                               │        excludes)        │
//!                               ▼                         │
//!                     Vec<ModuleDefinition>               │
//!                               │                         │
//!                               │ ShardScheduler          │
//!                               ▼                         │
//!                      worklist (this shard)              │
//!                               │                         │
//!          ┌────────────────────┴──────────────┐          │
//!          │ per module, from the checkpoint   │          │
//!          │   preparers  set_up               │          │
//!          │   sub-tests  run ──► TestListener │          │
//!          │   preparers  tear_down (reverse)  │          │
//!          └────────────────────┬──────────────┘          │
//!                               ▼                         │
//!                  ResultRecorder::drain_into ──► InvocationResult
//! ```
//!
//! # States
//!
//! `Init → AbiResolution → ModuleSetup → Running → Done | Suspended`.
//! A suspended orchestrator keeps its worklist and checkpoint; calling
//! [`Orchestrator::run`] again resumes with the module that was
//! interrupted.
//!
//! # Module Selection
//!
//! 1. **Retry**: every failed or not-executed test of a previous session.
//!    Modules whose setup failed are retried whole.
//! 2. **Module**: a single module (optionally a single test) by name or
//!    unique pattern.
//! 3. **Default**: the include/exclude filters given, plus those of the
//!    plan when one is named. A module given a module argument is included.
//!
//! Selecting nothing is an error rather than an empty run.

pub mod shard;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::abi::Abi;
use crate::component::{
    ComponentError, ComponentRegistry, ModuleContext, PreparerError, RunFlags, SubTest,
    TargetPreparer,
};
use crate::context::BuildContext;
use crate::device::{Device, DeviceError};
use crate::event::{self, TestListener};
use crate::filter::{FilterError, TestFilter};
use crate::layout::LayoutError;
use crate::module::ModuleDefinition;
use crate::plan::{PlanError, TestPlan};
use crate::repository::{ModuleRepository, RepositoryError};
use crate::result::{InvocationResult, SETUP_METHOD, TestStatus};
use crate::store::{ResultStore, StoreError};
use crate::xml;

pub use shard::ShardScheduler;

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Component(#[from] ComponentError),
}

impl OrchestratorError {
    /// Returns true if the run stopped because its device went away.
    pub fn is_device_unavailable(&self) -> bool {
        matches!(self, OrchestratorError::Device(e) if e.is_unavailable())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Init,
    AbiResolution,
    ModuleSetup,
    Running,
    Done,
    Suspended,
}

/// What to run, as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Plan to run in default mode.
    pub plan: Option<String>,
    /// Single module name or full-match pattern.
    pub module: Option<String>,
    /// Single `class#method` (or class) within `module`.
    pub test: Option<String>,
    /// Restricts the run to one ABI.
    pub abi: Option<String>,
    pub include_filters: Vec<String>,
    pub exclude_filters: Vec<String>,
    /// Session to retry.
    pub retry: Option<u32>,
    /// Number of shards to split into; see [`Orchestrator::split`].
    pub shards: usize,
    pub shard_index: usize,
    pub total_shards: usize,
    /// `module:key:value` arguments appended to the module's sub-tests.
    pub module_args: Vec<String>,
    pub flags: RunFlags,
}

/// Collaborators shared by every shard of an invocation.
#[derive(Clone)]
pub struct InvocationEnv {
    pub build: BuildContext,
    pub registry: Arc<ComponentRegistry>,
    pub store: ResultStore,
    pub result: Arc<Mutex<InvocationResult>>,
    /// The session being retried, as loaded before any shard started.
    ///
    /// Shards derive their retry filters from this snapshot, so they agree
    /// on the candidates even while `result` is being updated in place.
    /// When absent, the session is loaded from the store.
    pub retried: Option<Arc<InvocationResult>>,
}

/// Creates the invocation record for a new session.
pub fn begin_invocation(build: &BuildContext, plan: &str, result_dir: PathBuf) -> InvocationResult {
    let mut result = InvocationResult::new();
    result.start = event::now_millis();
    result.suite_name = build.suite_name().to_string();
    result.suite_version = build.suite_version().to_string();
    result.suite_plan = plan.to_string();
    result.report_version = xml::REPORT_VERSION.to_string();
    result.host_name = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    result.os_name = std::env::consts::OS.to_string();
    result.os_arch = std::env::consts::ARCH.to_string();
    result.harness_version = build.harness_version().to_string();
    result.result_dir = Some(result_dir);
    result
}

/// Reopens a stored session for a retry.
///
/// The session keeps its directory, start time and every recorded result;
/// retried tests are overwritten in place as they run again. Build
/// attributes collected by the earlier run are carried into `build`.
pub fn resume_invocation(
    build: &BuildContext,
    previous: InvocationResult,
    session: u32,
) -> InvocationResult {
    for (key, value) in &previous.build_attributes {
        build.add_attribute(key.clone(), value.clone());
    }
    let mut result = previous;
    result.report_version = xml::REPORT_VERSION.to_string();
    result.host_name = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    result.os_name = std::env::consts::OS.to_string();
    result.os_arch = std::env::consts::ARCH.to_string();
    result.harness_version = build.harness_version().to_string();
    result.retry_session = Some(session);
    result
}

/// Outcome of one shard's run.
///
/// # Exit Codes
///
/// | Code | Meaning |
/// |------|---------|
/// | 0 | All tests passed |
/// | 1 | Some tests failed or weren't run, or the run ended early |
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Modules whose run completed.
    pub modules_run: usize,
    pub passed: usize,
    pub failed: usize,
    pub not_executed: usize,
    /// The module loop stopped before the worklist was exhausted.
    pub ended_early: bool,
    pub session: Option<u32>,
}

impl RunSummary {
    pub fn success(&self) -> bool {
        self.failed == 0 && self.not_executed == 0 && !self.ended_early
    }

    pub fn exit_code(&self) -> i32 {
        if self.success() { 0 } else { 1 }
    }

    /// Folds another shard's summary into this one.
    pub fn merge(&mut self, other: &RunSummary) {
        self.modules_run += other.modules_run;
        self.passed += other.passed;
        self.failed += other.failed;
        self.not_executed += other.not_executed;
        self.ended_early |= other.ended_early;
        self.session = self.session.or(other.session);
    }
}

/// How a single module run can end badly.
enum ModuleFailure {
    /// Fatal to the invocation; the module is retried on resume.
    Unavailable(DeviceError),
    /// Ends this shard's loop.
    Other(String),
}

pub struct Orchestrator {
    options: RunOptions,
    supported_abis: Vec<String>,
    state: OrchestratorState,
    modules: Vec<ModuleDefinition>,
    checkpoint: usize,
    modules_run: usize,
    ended_early: bool,
}

impl Orchestrator {
    pub fn new(options: RunOptions, supported_abis: Vec<String>) -> Self {
        Self {
            options,
            supported_abis,
            state: OrchestratorState::Init,
            modules: Vec::new(),
            checkpoint: 0,
            modules_run: 0,
            ended_early: false,
        }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// This shard's worklist, empty until module setup has run.
    pub fn modules(&self) -> &[ModuleDefinition] {
        &self.modules
    }

    /// Index of the next module to run.
    pub fn checkpoint(&self) -> usize {
        self.checkpoint
    }

    /// Turns a multi-shard request into one orchestrator per shard.
    ///
    /// With `shards > 1`, this instance becomes shard 0 and the returned
    /// copies are shards `1..shards`. Otherwise nothing is returned.
    pub fn split(&mut self) -> Vec<Orchestrator> {
        let shards = self.options.shards;
        if shards <= 1 {
            return Vec::new();
        }
        self.options.shards = 0;
        self.options.total_shards = shards;
        self.options.shard_index = 0;
        (1..shards)
            .map(|index| {
                let mut options = self.options.clone();
                options.shard_index = index;
                Orchestrator::new(options, self.supported_abis.clone())
            })
            .collect()
    }

    /// Runs (or resumes) this shard against `device`.
    ///
    /// # Errors
    ///
    /// Invalid arguments and setup problems fail before any module runs.
    /// An unavailable device suspends the orchestrator and returns the
    /// device error; everything recorded so far has been persisted.
    pub async fn run(
        &mut self,
        device: &dyn Device,
        env: &InvocationEnv,
    ) -> OrchestratorResult<RunSummary> {
        if self.modules.is_empty() {
            self.state = OrchestratorState::AbiResolution;
            let abis = match self.resolve_abis(device).await {
                Ok(abis) => abis,
                Err(e) => return Err(self.fail(e)),
            };

            self.state = OrchestratorState::ModuleSetup;
            let candidates = match self.setup_modules(&abis, env) {
                Ok(modules) => modules,
                Err(e) => return Err(self.fail(e)),
            };
            let scheduler = ShardScheduler::new(self.options.total_shards);
            self.modules = scheduler.assignment(&candidates, self.options.shard_index);
            self.checkpoint = 0;
            info!(
                "[{}] shard {}/{}: {} of {} modules",
                device.serial(),
                self.options.shard_index,
                scheduler.total_shards(),
                self.modules.len(),
                candidates.len()
            );
        }

        self.state = OrchestratorState::Running;
        {
            let mut result = env.result.lock().await;
            result.add_device_serial(device.serial());
        }

        while self.checkpoint < self.modules.len() {
            let module = self.modules[self.checkpoint].clone();
            info!("[{}] Running module {}", device.serial(), module.id());
            let outcome = self.run_module(&module, device, env).await;
            let saved = persist(env).await;
            if let Err(e) = &saved {
                error!("Failed to save results: {}", e);
            }

            match outcome {
                Err(ModuleFailure::Unavailable(e)) => {
                    error!("[{}] Device unavailable during {}: {}", device.serial(), module.id(), e);
                    self.state = OrchestratorState::Suspended;
                    return Err(e.into());
                }
                _ if saved.is_err() => {
                    self.ended_early = true;
                    break;
                }
                Err(ModuleFailure::Other(message)) => {
                    self.checkpoint += 1;
                    self.modules_run += 1;
                    error!("[{}] Stopping after {}: {}", device.serial(), module.id(), message);
                    self.ended_early = true;
                    break;
                }
                Ok(()) => {
                    self.checkpoint += 1;
                    self.modules_run += 1;
                }
            }
        }

        self.state = OrchestratorState::Done;
        Ok(self.summary(env).await)
    }

    fn fail(&mut self, error: OrchestratorError) -> OrchestratorError {
        self.state = OrchestratorState::Done;
        error
    }

    /// Device ABIs that the suite supports, narrowed by the `abi` option.
    async fn resolve_abis(&self, device: &dyn Device) -> OrchestratorResult<Vec<Abi>> {
        let device_abis = device.abis().await?;
        let abis: Vec<Abi> = device_abis
            .iter()
            .filter(|abi| self.supported_abis.contains(*abi))
            .filter(|abi| self.options.abi.as_deref().is_none_or(|wanted| wanted == abi.as_str()))
            .map(Abi::new)
            .collect();

        if abis.is_empty() {
            return Err(OrchestratorError::InvalidArgument(format!(
                "Device {} doesn't support {}",
                device.serial(),
                self.options
                    .abi
                    .as_deref()
                    .unwrap_or("any supported ABI")
            )));
        }
        debug!(
            "[{}] Running ABIs: {:?}",
            device.serial(),
            abis.iter().map(Abi::name).collect::<Vec<_>>()
        );
        Ok(abis)
    }

    /// Selects every candidate module across all shards.
    fn setup_modules(
        &mut self,
        abis: &[Abi],
        env: &InvocationEnv,
    ) -> OrchestratorResult<Vec<ModuleDefinition>> {
        let testcases = env.build.layout().testcases_dir()?;
        let repository = ModuleRepository::scan(&testcases, abis, &env.registry)?;

        let mut includes = self.parse_filters(&self.options.include_filters, true)?;
        let mut excludes = self.parse_filters(&self.options.exclude_filters, false)?;
        let mut module_args = parse_module_args(&self.options.module_args)?;

        if let Some(session) = self.options.retry {
            self.options.include_filters.clear();
            self.options.exclude_filters.clear();
            self.options.module = None;
            self.options.test = None;
            excludes.clear();
            let previous = match &env.retried {
                Some(previous) => Arc::clone(previous),
                None => Arc::new(env.store.load(session)?),
            };
            includes = previous.synthesize_retry_filters();
            if includes.is_empty() {
                return Err(OrchestratorError::InvalidArgument(format!(
                    "Nothing to retry: session {} has no failed or not executed tests",
                    session
                )));
            }
            info!("Retrying {} filters from session {}", includes.len(), session);
        } else if let Some(pattern) = self.options.module.clone() {
            let name = resolve_module_name(&repository, &pattern)?;
            let test = self.options.test.as_deref();
            includes = vec![TestFilter::include(self.options.abi.as_deref(), &name, test)?];
            if test.is_some() {
                excludes.clear();
            } else {
                excludes.retain(|f| f.name() == name && f.is_test_level());
            }
        } else {
            for (name, _, _) in &module_args {
                let filter = TestFilter::include(None, name, None)?;
                if !includes.contains(&filter) {
                    includes.push(filter);
                }
            }
            if let Some(plan) = &self.options.plan {
                let plan = TestPlan::load(&env.build.layout().plan_path(plan)?)?;
                let filters = plan.filters()?;
                includes.extend(filters.includes);
                excludes.extend(filters.excludes);
                module_args.extend(filters.module_args);
            }
        }

        let mut modules = repository.select(&includes, &excludes);
        if modules.is_empty() {
            return Err(OrchestratorError::InvalidArgument(
                "Nothing to do. Use 'list modules' to see available modules, and \
                 'list results' to see available sessions to re-run."
                    .to_string(),
            ));
        }
        for (name, key, value) in &module_args {
            for module in modules.iter_mut().filter(|m| m.name() == name) {
                module.add_module_arg(key, value);
            }
        }
        Ok(modules)
    }

    fn parse_filters(&self, filters: &[String], include: bool) -> OrchestratorResult<Vec<TestFilter>> {
        filters
            .iter()
            .map(|raw| -> OrchestratorResult<TestFilter> {
                let parsed = TestFilter::parse_with_abis(raw, &self.supported_abis)?;
                Ok(TestFilter::new(parsed.abi(), parsed.name(), parsed.test(), include)?)
            })
            .collect()
    }

    async fn run_module(
        &self,
        module: &ModuleDefinition,
        device: &dyn Device,
        env: &InvocationEnv,
    ) -> Result<(), ModuleFailure> {
        let mut preparers: Vec<Box<dyn TargetPreparer>> = Vec::new();
        for spec in module.preparers() {
            preparers.push(env.registry.preparer(spec).map_err(other)?);
        }
        let mut tests: Vec<Box<dyn SubTest>> = Vec::new();
        for spec in module.tests() {
            let mut test = env.registry.sub_test(spec).map_err(other)?;
            match test.filtering() {
                Some(filtering) => {
                    for filter in module.include_filters() {
                        filtering.add_include_filter(filter);
                    }
                    for filter in module.exclude_filters() {
                        filtering.add_exclude_filter(filter);
                    }
                }
                None if !module.include_filters().is_empty()
                    || !module.exclude_filters().is_empty() =>
                {
                    warn!("[{}] {} does not support filtering", module.id(), spec.class);
                }
                None => {}
            }
            tests.push(test);
        }

        let result_dir = env.result.lock().await.result_dir.clone();
        let ctx = ModuleContext {
            device,
            build: &env.build,
            abi: module.abi(),
            module_name: module.name(),
            result_dir: result_dir.as_deref(),
            flags: self.options.flags,
        };
        let (listener, mut recorder) = TestListener::channel();

        let mut set_up = 0;
        let mut cause: Option<String> = None;
        let mut outcome = Ok(());
        for preparer in preparers.iter_mut() {
            match preparer.set_up(&ctx).await {
                Ok(()) => set_up += 1,
                Err(PreparerError::Setup(message)) => {
                    warn!("[{}] {} setup failed: {}", module.id(), preparer.class(), message);
                    record_setup_failure(env, module, device, preparer.class(), &message).await;
                    cause = Some(message);
                    break;
                }
                Err(PreparerError::Device(e)) => {
                    cause = Some(e.to_string());
                    outcome = Err(ModuleFailure::Unavailable(e));
                    break;
                }
            }
        }

        if cause.is_none() {
            for test in tests.iter_mut() {
                match test.run(&ctx, &listener).await {
                    Ok(()) => {}
                    Err(e) if e.is_unavailable() => {
                        cause = Some(e.to_string());
                        outcome = Err(ModuleFailure::Unavailable(e));
                        break;
                    }
                    Err(e) => {
                        listener.run_failed(e.to_string());
                        cause = Some(e.to_string());
                        outcome = Err(ModuleFailure::Other(e.to_string()));
                        break;
                    }
                }
            }
        }

        if !matches!(outcome, Err(ModuleFailure::Unavailable(_))) {
            for preparer in preparers[..set_up].iter_mut().rev() {
                match preparer.tear_down(&ctx, cause.as_deref()).await {
                    Ok(()) => {}
                    Err(PreparerError::Setup(message)) => {
                        warn!("[{}] {} teardown failed: {}", module.id(), preparer.class(), message);
                    }
                    Err(PreparerError::Device(e)) => {
                        outcome = Err(ModuleFailure::Unavailable(e));
                        break;
                    }
                }
            }
        }

        let mut result = env.result.lock().await;
        let module_result = result.get_or_create_module(module.id());
        module_result.set_device(device.serial());
        if set_up == preparers.len() {
            for preparer in &preparers {
                module_result.remove_result(&format!("{}#{}", preparer.class(), SETUP_METHOD));
            }
        }
        recorder.drain_into(module_result);
        event::close_incomplete(module_result);
        outcome
    }

    async fn summary(&self, env: &InvocationEnv) -> RunSummary {
        let result = env.result.lock().await;
        let mut summary = RunSummary {
            modules_run: self.modules_run,
            ended_early: self.ended_early,
            session: session_id(result.result_dir.as_deref()),
            ..Default::default()
        };
        for module in &self.modules[..self.checkpoint] {
            if let Some(recorded) = result.module(module.id()) {
                summary.passed += recorded.count_results(TestStatus::Pass);
                summary.failed += recorded.count_results(TestStatus::Fail);
                summary.not_executed += recorded.count_results(TestStatus::NotExecuted);
            }
        }
        summary
    }
}

fn other(error: ComponentError) -> ModuleFailure {
    ModuleFailure::Other(error.to_string())
}

/// Records a preparer failure as a failed `<class>#setUp` test.
async fn record_setup_failure(
    env: &InvocationEnv,
    module: &ModuleDefinition,
    device: &dyn Device,
    class: &str,
    message: &str,
) {
    let now = event::now_millis();
    let mut result = env.result.lock().await;
    let module_result = result.get_or_create_module(module.id());
    module_result.set_device(device.serial());
    let test = module_result.get_or_create_result(&format!("{}#{}", class, SETUP_METHOD));
    test.reset();
    test.set_start(now);
    test.failed(message, message);
    test.set_end(now);
}

async fn persist(env: &InvocationEnv) -> Result<(), StoreError> {
    let mut result = env.result.lock().await;
    result.end = event::now_millis();
    result.build_attributes = env.build.attributes();
    env.store.save(&result)?;
    Ok(())
}

fn session_id(dir: Option<&std::path::Path>) -> Option<u32> {
    dir?.file_name()?.to_str()?.parse().ok()
}

/// Resolves a module name or pattern to exactly one module name.
fn resolve_module_name(repository: &ModuleRepository, pattern: &str) -> OrchestratorResult<String> {
    if repository.get_module_names().contains(&pattern) {
        return Ok(pattern.to_string());
    }
    match repository.get_modules_matching(pattern).as_slice() {
        [name] => Ok(name.to_string()),
        [] => Err(OrchestratorError::InvalidArgument(format!(
            "No modules found matching {}",
            pattern
        ))),
        names => Err(OrchestratorError::InvalidArgument(format!(
            "Multiple modules found matching {}: {}",
            pattern,
            names.join(", ")
        ))),
    }
}

/// Parses `module:key:value` arguments.
fn parse_module_args(args: &[String]) -> OrchestratorResult<Vec<(String, String, String)>> {
    args.iter()
        .map(|arg| {
            let mut parts = arg.splitn(3, ':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(module), Some(key), Some(value)) if !module.is_empty() && !key.is_empty() => {
                    Ok((module.to_string(), key.to_string(), value.to_string()))
                }
                _ => Err(OrchestratorError::InvalidArgument(format!(
                    "Could not parse module-arg '{}', expected module:key:value",
                    arg
                ))),
            }
        })
        .collect()
}
