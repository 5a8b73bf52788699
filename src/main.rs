//! compat CLI - compatibility suite harness.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::Mutex;
use tracing::{Level, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use compat_harness::abi::Abi;
use compat_harness::component::{ComponentRegistry, RunFlags};
use compat_harness::config::{self, Config, DeviceConfig};
use compat_harness::context::BuildContext;
use compat_harness::device::local::LocalDevice;
use compat_harness::event;
use compat_harness::layout::SuiteLayout;
use compat_harness::orchestrator::{self, InvocationEnv, Orchestrator, RunOptions, RunSummary};
use compat_harness::plan::TestPlan;
use compat_harness::report;
use compat_harness::repository::ModuleRepository;
use compat_harness::store::ResultStore;

#[derive(Parser)]
#[command(name = "compat")]
#[command(about = "Compatibility test suite harness", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "compat.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run modules on the configured devices
    Run(RunArgs),

    /// List modules, result sessions or plans
    List {
        #[arg(value_enum)]
        what: ListKind,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Validate the configuration, module configs and plans
    Validate,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Plan to run
    #[arg(long)]
    plan: Option<String>,

    /// Run a single module (name or full-match pattern)
    #[arg(short, long)]
    module: Option<String>,

    /// Run a single test of the module (`class#method`)
    #[arg(short, long, requires = "module")]
    test: Option<String>,

    /// Only run this ABI
    #[arg(short, long)]
    abi: Option<String>,

    /// Include filter `[abi] module [test]` (repeatable)
    #[arg(long = "include-filter")]
    include_filters: Vec<String>,

    /// Exclude filter `[abi] module [test]` (repeatable)
    #[arg(long = "exclude-filter")]
    exclude_filters: Vec<String>,

    /// Retry the failed and not executed tests of a session
    #[arg(short, long, conflicts_with_all = ["plan", "module"])]
    retry: Option<u32>,

    /// Number of shards, one device each
    #[arg(long)]
    shard: Option<usize>,

    /// Module argument `module:key:value` (repeatable)
    #[arg(long = "module-arg")]
    module_args: Vec<String>,

    /// Skip precondition checks
    #[arg(long)]
    skip_preconditions: bool,

    /// Skip device info collection
    #[arg(long)]
    skip_device_info: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ListKind {
    Modules,
    Results,
    Plans,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run(args) => {
            let code = run(&cli.config, args).await?;
            std::process::exit(code);
        }
        Commands::List { what, format } => list(&cli.config, what, format),
        Commands::Validate => validate(&cli.config),
    }
}

fn load(config_path: &Path) -> Result<(Config, SuiteLayout)> {
    let config = config::load_config(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    let layout = SuiteLayout::new(config.suite.expanded_root()?);
    Ok((config, layout))
}

async fn run(config_path: &Path, args: RunArgs) -> Result<i32> {
    let (config, layout) = load(config_path)?;
    info!("Loaded configuration from {}", config_path.display());

    let shards = args.shard.unwrap_or(config.run.shards).max(1);
    if config.devices.is_empty() {
        bail!("No devices configured in {}", config_path.display());
    }
    if shards > config.devices.len() {
        bail!(
            "{} shards requested but only {} devices configured",
            shards,
            config.devices.len()
        );
    }

    let store = ResultStore::new(layout.results_dir()?);
    let build = BuildContext::new(&config.suite.name, &config.suite.version, layout);
    let (session, result, retried) = match args.retry {
        Some(session) => {
            let previous = store
                .load(session)
                .with_context(|| format!("Cannot retry session {}", session))?;
            let result = orchestrator::resume_invocation(&build, previous.clone(), session);
            info!("Retrying session {} ({})", session, result.suite_plan);
            (session, result, Some(Arc::new(previous)))
        }
        None => {
            let plan_label = match (&args.plan, &args.module) {
                (Some(plan), _) => plan.clone(),
                (None, Some(module)) => module.clone(),
                (None, None) => "custom".to_string(),
            };
            let session = store.create_session()?;
            let result =
                orchestrator::begin_invocation(&build, &plan_label, store.session_dir(session));
            info!("Starting session {} ({})", session, plan_label);
            (session, result, None)
        }
    };

    let env = InvocationEnv {
        build,
        registry: Arc::new(ComponentRegistry::with_builtins()),
        store,
        result: Arc::new(Mutex::new(result)),
        retried,
    };

    let options = RunOptions {
        plan: args.plan,
        module: args.module,
        test: args.test,
        abi: args.abi,
        include_filters: args.include_filters,
        exclude_filters: args.exclude_filters,
        retry: args.retry,
        shards,
        module_args: args.module_args,
        flags: RunFlags {
            skip_preconditions: args.skip_preconditions || config.run.skip_preconditions,
            skip_device_info: args.skip_device_info || config.run.skip_device_info,
        },
        ..Default::default()
    };

    let mut first = Orchestrator::new(options, config.suite.supported_abis.clone());
    let others = first.split();
    let mut orchestrators = vec![first];
    orchestrators.extend(others);

    let devices: Vec<LocalDevice> = config
        .devices
        .iter()
        .take(orchestrators.len())
        .map(|device| match device {
            DeviceConfig::Local(local) => LocalDevice::new(local.clone()),
        })
        .collect();

    let started = Instant::now();
    let env = &env;
    let outcomes = futures::future::join_all(
        orchestrators
            .iter_mut()
            .zip(devices.iter())
            .map(|(orchestrator, device)| orchestrator.run(device, env)),
    )
    .await;

    let mut summary = RunSummary {
        session: Some(session),
        ..Default::default()
    };
    let mut failed_shards = 0;
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(shard) => summary.merge(&shard),
            Err(e) if e.is_device_unavailable() => {
                warn!("Shard {} suspended: {}", index, e);
                summary.ended_early = true;
            }
            Err(e) => {
                error!("Shard {} failed: {}", index, e);
                failed_shards += 1;
            }
        }
    }

    if failed_shards == orchestrators.len() {
        bail!("Every shard failed to start");
    }

    {
        let mut result = env.result.lock().await;
        result.end = event::now_millis();
        result.build_attributes = env.build.attributes();
        let path = env.store.save(&result)?;
        info!("Results saved to {}", path.display());
    }

    report::print_summary(&summary, started.elapsed());
    Ok(if failed_shards > 0 { 1 } else { summary.exit_code() })
}

fn list(config_path: &Path, what: ListKind, format: Format) -> Result<()> {
    let (config, layout) = load(config_path)?;
    match what {
        ListKind::Modules => {
            let abis: Vec<Abi> = config.suite.supported_abis.iter().map(Abi::new).collect();
            let repository = ModuleRepository::scan(
                &layout.testcases_dir()?,
                &abis,
                &ComponentRegistry::with_builtins(),
            )?;
            let ids = repository.get_module_ids();
            if format == Format::Json {
                println!("{}", serde_json::to_string_pretty(&ids)?);
            } else {
                for id in ids {
                    println!("{}", id);
                }
            }
        }
        ListKind::Results => {
            let sessions = ResultStore::new(layout.results_dir()?).list()?;
            if format == Format::Json {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
            } else {
                print!("{}", report::format_sessions(&sessions));
            }
        }
        ListKind::Plans => {
            let plans = plan_names(&layout.plans_dir()?)?;
            if format == Format::Json {
                println!("{}", serde_json::to_string_pretty(&plans)?);
            } else {
                for plan in plans {
                    println!("{}", plan);
                }
            }
        }
    }
    Ok(())
}

fn plan_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "xml") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

fn validate(config_path: &Path) -> Result<()> {
    let (config, layout) = match load(config_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };

    let abis: Vec<Abi> = config.suite.supported_abis.iter().map(Abi::new).collect();
    let repository = ModuleRepository::scan(
        &layout.testcases_dir()?,
        &abis,
        &ComponentRegistry::with_builtins(),
    )?;
    let plans = plan_names(&layout.plans_dir()?)?;
    for plan in &plans {
        let path = layout.plan_path(plan)?;
        TestPlan::load(&path)
            .and_then(|plan| plan.filters().map(drop))
            .with_context(|| format!("Invalid plan {}", path.display()))?;
    }

    println!("Configuration is valid!");
    println!();
    println!("Settings:");
    println!("  Suite: {} {}", config.suite.name, config.suite.version);
    println!("  Root: {}", layout.root().display());
    println!("  Modules: {}", repository.get_module_names().len());
    println!("  Plans: {}", plans.len());
    println!(
        "  Devices: {}",
        config
            .devices
            .iter()
            .map(DeviceConfig::serial)
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}
