use super::{CeQueue, Task, TaskContainer, TaskStatus};
use crate::errors::{CeError, Result};
use crate::observability::Profiler;
use crate::pipeline::{report_steps, CeServices, StepExecutor, TaskContext};
use crate::purge::PurgeTask;
use crate::report::ScannerReport;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

/// What a successful task produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskResult {
    pub analysis_uuid: Option<String>,
}

/// Runs one task whose report is available in `container`.
pub trait TaskProcessor: Send + Sync {
    fn process(&self, task: &Task, container: &TaskContainer) -> Result<TaskResult>;
}

/// Runs the report pipeline.
pub struct ReportTaskProcessor {
    services: CeServices,
    profiling: bool,
}

impl ReportTaskProcessor {
    pub fn new(services: CeServices) -> Self {
        Self {
            services,
            profiling: false,
        }
    }

    pub fn with_profiling(mut self, profiling: bool) -> Self {
        self.profiling = profiling;
        self
    }
}

impl TaskProcessor for ReportTaskProcessor {
    fn process(&self, task: &Task, container: &TaskContainer) -> Result<TaskResult> {
        let report = ScannerReport::from_slice(&container.report_bytes()?)?;
        if report.metadata.project_key != task.component_key {
            return Err(CeError::report(format!(
                "Report of project {} submitted for component {}",
                report.metadata.project_key, task.component_key
            )));
        }

        let mut ctx = TaskContext::new(task.clone(), report, self.services.clone())?;
        let profiler = Arc::new(Profiler::new());
        let mut executor = StepExecutor::new(report_steps()).with_profiler(Arc::clone(&profiler));
        let timings = executor.execute(&mut ctx)?;

        debug!(steps = timings.len(), "Report processed");
        if self.profiling {
            info!("Step profiling\n{}", profiler.report().to_summary());
        }
        Ok(TaskResult {
            analysis_uuid: Some(ctx.analysis.uuid),
        })
    }
}

/// One compute engine worker: takes a task, runs it, removes it, purges.
pub struct CeWorker {
    uuid: String,
    queue: Arc<CeQueue>,
    processor: Arc<dyn TaskProcessor>,
    purge: Option<Arc<PurgeTask>>,
    work_root: PathBuf,
}

impl CeWorker {
    pub fn new(
        uuid: impl Into<String>,
        queue: Arc<CeQueue>,
        processor: Arc<dyn TaskProcessor>,
        work_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            queue,
            processor,
            purge: None,
            work_root: work_root.into(),
        }
    }

    pub fn with_purge(mut self, purge: Arc<PurgeTask>) -> Self {
        self.purge = Some(purge);
        self
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Process the next task, if any. Returns whether a task was taken.
    pub fn run_once(&self) -> Result<bool> {
        match self.queue.peek(&self.uuid)? {
            Some(task) => {
                self.execute(task)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Process a task already peeked for this worker.
    pub fn execute(&self, task: Task) -> Result<()> {
        let span = info_span!("task", uuid = %task.uuid, component = %task.component_key);
        let _guard = span.enter();
        info!(attempt = task.execution_count, "Executing task");

        match self.process(&task) {
            Ok(result) => {
                self.queue
                    .remove(&task, TaskStatus::Success, None, result.analysis_uuid)?;
            }
            Err(err) => {
                error!(error = %err, category = err.category(), "Task failed");
                self.queue.remove(&task, TaskStatus::Failed, Some(&err), None)?;
            }
        }

        if let Some(purge) = &self.purge {
            let purged = panic::catch_unwind(AssertUnwindSafe(|| {
                purge.purge_by_key(&task.component_key)
            }));
            if let Err(payload) = purged {
                error!(panic = %panic_message(payload.as_ref()), "Purge panicked");
            }
        }
        Ok(())
    }

    /// The container lives only for the duration of this call.
    fn process(&self, task: &Task) -> Result<TaskResult> {
        let report = self
            .queue
            .load_report(&task.uuid)?
            .ok_or_else(|| CeError::report(format!("No report found for task {}", task.uuid)))?;
        let container = TaskContainer::create(&self.work_root, &task.uuid, &report)?;

        panic::catch_unwind(AssertUnwindSafe(|| self.processor.process(task, &container)))
            .unwrap_or_else(|payload| {
                Err(CeError::state(format!(
                    "Task processing panicked: {}",
                    panic_message(payload.as_ref())
                )))
            })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Settings of a [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct WorkerPoolOptions {
    pub count: usize,
    pub poll_interval: Duration,
    pub work_root: PathBuf,
}

/// A fixed number of worker threads blocking on the queue until shutdown.
pub struct WorkerPool {
    queue: Arc<CeQueue>,
    workers: Vec<String>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Recover tasks left behind by previous workers, then start the threads.
    pub fn start(
        options: WorkerPoolOptions,
        queue: Arc<CeQueue>,
        processor: Arc<dyn TaskProcessor>,
        purge: Option<Arc<PurgeTask>>,
    ) -> Result<Self> {
        if options.count == 0 {
            return Err(CeError::config("Worker count must be at least 1"));
        }
        let workers: Vec<String> = (0..options.count).map(|_| Uuid::new_v4().to_string()).collect();

        let reset = queue.reset_tasks_with_unknown_workers(&workers)?;
        let canceled = queue.cancel_worn_outs()?;
        if reset > 0 || canceled > 0 {
            info!(reset, canceled, "Recovered tasks of previous workers");
        }

        let mut handles = Vec::with_capacity(workers.len());
        for (index, worker_uuid) in workers.iter().enumerate() {
            let mut worker = CeWorker::new(
                worker_uuid.clone(),
                Arc::clone(&queue),
                Arc::clone(&processor),
                options.work_root.clone(),
            );
            if let Some(purge) = &purge {
                worker = worker.with_purge(Arc::clone(purge));
            }
            let poll_interval = options.poll_interval;
            let handle = thread::Builder::new()
                .name(format!("ce-worker-{}", index))
                .spawn(move || worker_loop(worker, poll_interval))?;
            handles.push(handle);
        }
        info!(workers = handles.len(), "Worker pool started");

        Ok(Self {
            queue,
            workers,
            handles,
        })
    }

    pub fn worker_uuids(&self) -> &[String] {
        &self.workers
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Stop taking tasks and wait for running ones to finish.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.queue.shutdown();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("Worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(worker: CeWorker, poll_interval: Duration) {
    let queue = Arc::clone(&worker.queue);
    debug!(worker = worker.uuid(), "Worker started");
    while !queue.is_shutdown() {
        match queue.wait_for_task(worker.uuid(), poll_interval) {
            Ok(Some(task)) => {
                if let Err(e) = worker.execute(task) {
                    error!(worker = worker.uuid(), error = %e, "Failed to complete task");
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!(worker = worker.uuid(), error = %e, "Failed to peek queue");
                thread::sleep(poll_interval);
            }
        }
    }
    debug!(worker = worker.uuid(), "Worker stopped");
}
