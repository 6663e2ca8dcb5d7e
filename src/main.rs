use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use compute_engine::clock::SystemClock;
use compute_engine::cli::{Cli, Commands};
use compute_engine::config::{load_config, load_config_from, CeConfig};
use compute_engine::index::NoopIndexer;
use compute_engine::observability::init_tracing;
use compute_engine::pipeline::{report_steps, CeServices};
use compute_engine::purge::PurgeTask;
use compute_engine::queue::{
    Activity, CeQueue, FsReportStore, ReportCleanupListener, ReportTaskProcessor, TaskStatus,
    TaskSubmit, WorkerPool, WorkerPoolOptions,
};
use compute_engine::report::ScannerReport;
use compute_engine::storage::InMemoryStorage;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            reports,
            config,
            state,
            workers,
            profile,
            verbose,
        } => {
            init_tracing(verbose);
            let config = read_config(config.as_deref())?;
            run(RunOptions {
                reports,
                state,
                workers,
                profile,
                config,
            })
        }
        Commands::CheckConfig { config, verbose } => {
            init_tracing(verbose);
            check_config(config.as_deref())
        }
    }
}

struct RunOptions {
    reports: Vec<PathBuf>,
    state: Option<PathBuf>,
    workers: Option<usize>,
    profile: bool,
    config: CeConfig,
}

fn read_config(path: Option<&Path>) -> Result<CeConfig> {
    match path {
        Some(path) => Ok(load_config_from(path)?),
        None => Ok(load_config()),
    }
}

fn run(options: RunOptions) -> Result<()> {
    let config = options.config;
    let storage = Arc::new(match &options.state {
        Some(path) => InMemoryStorage::load(path)
            .with_context(|| format!("Failed to load state from {}", path.display()))?,
        None => InMemoryStorage::new(),
    });
    let work_root = config
        .workers
        .work_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("compute-engine"));
    let reports = Arc::new(FsReportStore::new(work_root.join("reports"))?);

    let settings = Arc::new(config.settings());
    let services = CeServices {
        storage: storage.clone(),
        indexer: Arc::new(NoopIndexer),
        clock: Arc::new(SystemClock),
        settings: Arc::clone(&settings),
        active_rules: Arc::new(config.active_rules()?),
    };

    let queue = Arc::new(CeQueue::new(
        storage.clone(),
        reports.clone(),
        Arc::clone(&services.clock),
    ));
    queue.add_listener(Arc::new(ReportCleanupListener::new(reports)));

    let mut submitted = Vec::with_capacity(options.reports.len());
    for path in &options.reports {
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read report {}", path.display()))?;
        let report = ScannerReport::from_slice(&bytes)
            .with_context(|| format!("Invalid report {}", path.display()))?;
        let task = queue.submit(TaskSubmit::report(report.metadata.project_key), &bytes)?;
        submitted.push((path.clone(), task.uuid));
    }

    let profiling = options.profile || config.purge.profiling;
    let processor = Arc::new(ReportTaskProcessor::new(services).with_profiling(profiling));
    let purge = Arc::new(PurgeTask::new(
        storage.clone(),
        settings,
        Arc::new(SystemClock),
    ));
    let pool = WorkerPool::start(
        WorkerPoolOptions {
            count: options.workers.unwrap_or(config.workers.count),
            poll_interval: Duration::from_millis(config.workers.poll_interval_ms),
            work_root: work_root.join("tasks"),
        },
        Arc::clone(&queue),
        processor,
        Some(purge),
    )?;
    while !queue.wait_until_empty(Duration::from_secs(1))? {}
    pool.shutdown();

    let mut failed = 0;
    for (path, task_uuid) in &submitted {
        match queue.activity(task_uuid)? {
            Some(activity) => {
                if activity.status != TaskStatus::Success {
                    failed += 1;
                }
                print_activity(path, &activity);
            }
            None => {
                failed += 1;
                println!("{} {}", "MISSING".red().bold(), path.display());
            }
        }
    }

    if let Some(path) = &options.state {
        storage
            .save(path)
            .with_context(|| format!("Failed to save state to {}", path.display()))?;
    }

    if failed > 0 {
        bail!("{} of {} task(s) did not succeed", failed, submitted.len());
    }
    Ok(())
}

fn print_activity(path: &Path, activity: &Activity) {
    let status = match activity.status {
        TaskStatus::Success => activity.status.as_str().green().bold(),
        TaskStatus::Failed => activity.status.as_str().red().bold(),
        _ => activity.status.as_str().yellow().bold(),
    };
    let elapsed = activity
        .execution_time_ms
        .map(|ms| format!(" ({} ms)", ms))
        .unwrap_or_default();
    println!(
        "{} {} [{}]{}",
        status,
        path.display(),
        activity.task.component_key,
        elapsed
    );
    if let Some(message) = &activity.error_message {
        println!("    {}", message.dimmed());
    }
}

fn check_config(path: Option<&Path>) -> Result<()> {
    let config = read_config(path)?;
    config.active_rules()?;

    println!("{}", "Configuration is valid".green().bold());
    println!("  workers: {}", config.workers.count);
    println!("  poll interval: {} ms", config.workers.poll_interval_ms);
    println!("  steps: {}", report_steps().len());
    println!("  active rules: {}", config.active_rules.len());
    println!("{}", "Settings".bold());
    let settings = config.settings();
    for key in settings.keys() {
        println!("  {} = {}", key, settings.get_string(key).unwrap_or(""));
    }
    Ok(())
}
