//! compat-harness: host-side runner for compatibility test suites.
//!
//! A suite install holds module configuration files, test plans and
//! numbered result sessions. The harness selects modules with filters,
//! plans or a previous session's failures, shards them across devices,
//! runs each module's preparers and sub-tests, and records everything into
//! a versioned XML result file per session.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Repository**: every module of the suite, one instance per ABI
//! - **Filters and plans**: which modules and tests to run
//! - **Components**: target preparers and sub-tests built from module configs
//! - **Orchestrator**: ABI resolution, module setup, sharding and the module loop
//! - **Results**: the invocation record, its XML form and the session store
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use compat_harness::component::ComponentRegistry;
//! use compat_harness::config::{self, DeviceConfig};
//! use compat_harness::context::BuildContext;
//! use compat_harness::device::local::LocalDevice;
//! use compat_harness::layout::SuiteLayout;
//! use compat_harness::orchestrator::{self, InvocationEnv, Orchestrator, RunOptions};
//! use compat_harness::store::ResultStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = config::load_config(std::path::Path::new("compat.toml"))?;
//!     let layout = SuiteLayout::new(config.suite.expanded_root()?);
//!     let store = ResultStore::new(layout.results_dir()?);
//!     let build = BuildContext::new(&config.suite.name, &config.suite.version, layout);
//!
//!     let session = store.create_session()?;
//!     let result = orchestrator::begin_invocation(&build, "cts", store.session_dir(session));
//!     let env = InvocationEnv {
//!         build,
//!         registry: Arc::new(ComponentRegistry::with_builtins()),
//!         store,
//!         result: Arc::new(tokio::sync::Mutex::new(result)),
//!         retried: None,
//!     };
//!
//!     let DeviceConfig::Local(device) = &config.devices[0];
//!     let device = LocalDevice::new(device.clone());
//!     let mut orchestrator = Orchestrator::new(RunOptions::default(), config.suite.supported_abis);
//!     let summary = orchestrator.run(&device, &env).await?;
//!     std::process::exit(summary.exit_code());
//! }
//! ```

pub mod abi;
pub mod component;
pub mod config;
pub mod config_file;
pub mod context;
pub mod device;
pub mod event;
pub mod filter;
pub mod layout;
pub mod module;
pub mod orchestrator;
pub mod plan;
pub mod report;
pub mod repository;
pub mod result;
pub mod store;
pub mod xml;

// Re-export commonly used types
pub use config::{Config, load_config};
pub use filter::TestFilter;
pub use module::ModuleDefinition;
pub use orchestrator::{Orchestrator, RunOptions, RunSummary};
pub use repository::ModuleRepository;
pub use result::InvocationResult;
pub use store::ResultStore;
