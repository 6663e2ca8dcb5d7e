use super::{Activity, QueueListener, ReportStore, Task, TaskStatus, TaskSubmit};
use crate::clock::Clock;
use crate::errors::{CeError, Result};
use crate::storage::Storage;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Status of the workers as seen by an administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkersPauseStatus {
    /// Paused and no task is running
    Paused,
    /// Paused, but tasks are still running
    Pausing,
    Resumed,
}

#[derive(Debug, Default)]
struct QueueState {
    submits_paused: bool,
    workers_paused: bool,
    shutdown: bool,
}

/// Queue of compute engine tasks.
///
/// Tasks are rows of the storage queue table; the report blob of each task is
/// kept in a [`ReportStore`] until the task is removed. Every state change of
/// the queue happens under one mutex, and waiting workers are woken through a
/// condition variable.
pub struct CeQueue {
    storage: Arc<dyn Storage>,
    reports: Arc<dyn ReportStore>,
    clock: Arc<dyn Clock>,
    listeners: RwLock<Vec<Arc<dyn QueueListener>>>,
    state: Mutex<QueueState>,
    signal: Condvar,
}

impl CeQueue {
    pub fn new(storage: Arc<dyn Storage>, reports: Arc<dyn ReportStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            reports,
            clock,
            listeners: RwLock::new(Vec::new()),
            state: Mutex::new(QueueState::default()),
            signal: Condvar::new(),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn QueueListener>) {
        self.listeners.write().push(listener);
    }

    /// Store the report, then queue a PENDING task for it.
    pub fn submit(&self, submit: TaskSubmit, report: &[u8]) -> Result<Task> {
        let state = self.state.lock();
        let task = self.submit_locked(&state, submit, report)?;
        drop(state);
        self.signal.notify_all();
        Ok(task)
    }

    /// Like [`submit`](Self::submit), unless a task is already pending for
    /// the same component.
    pub fn submit_unique(&self, submit: TaskSubmit, report: &[u8]) -> Result<Option<Task>> {
        let state = self.state.lock();
        let already_pending = self
            .storage
            .queue()
            .select_tasks()?
            .iter()
            .any(|t| t.is_pending() && t.component_key == submit.component_key);
        if already_pending {
            debug!(component = %submit.component_key, "A task is already pending, submit ignored");
            return Ok(None);
        }
        let task = self.submit_locked(&state, submit, report)?;
        drop(state);
        self.signal.notify_all();
        Ok(Some(task))
    }

    fn submit_locked(&self, state: &QueueState, submit: TaskSubmit, report: &[u8]) -> Result<Task> {
        if state.submits_paused {
            return Err(CeError::queue(
                "Compute Engine does not currently accept new tasks",
            ));
        }
        let task = Task {
            uuid: Uuid::new_v4().to_string(),
            task_type: submit.task_type,
            component_key: submit.component_key,
            component_uuid: submit.component_uuid,
            branch: submit.branch,
            submitter: submit.submitter,
            status: TaskStatus::Pending,
            worker_uuid: None,
            execution_count: 0,
            submitted_at: self.clock.now_millis(),
            started_at: None,
        };

        self.reports.store(&task.uuid, report)?;
        if let Err(err) = self.storage.queue().insert_task(task.clone()) {
            if let Err(cleanup) = self.reports.delete(&task.uuid) {
                warn!(task = %task.uuid, error = %cleanup, "Failed to delete report of rejected task");
            }
            return Err(err);
        }
        info!(task = %task.uuid, component = %task.component_key, "Task submitted");
        Ok(task)
    }

    /// Take the oldest runnable task for `worker_uuid`.
    ///
    /// Tasks left IN_PROGRESS by the same worker (after a crash) are reset to
    /// PENDING first; they keep their execution count and are therefore not
    /// picked again.
    pub fn peek(&self, worker_uuid: &str) -> Result<Option<Task>> {
        let state = self.state.lock();
        self.peek_locked(&state, worker_uuid)
    }

    fn peek_locked(&self, state: &QueueState, worker_uuid: &str) -> Result<Option<Task>> {
        if state.workers_paused {
            return Ok(None);
        }
        let queue = self.storage.queue();
        let tasks = queue.select_tasks()?;
        for task in tasks
            .iter()
            .filter(|t| t.status == TaskStatus::InProgress && t.worker_uuid.as_deref() == Some(worker_uuid))
        {
            debug!(task = %task.uuid, worker = worker_uuid, "Resetting task left in progress");
            queue.update_task(Task {
                status: TaskStatus::Pending,
                started_at: None,
                ..task.clone()
            })?;
        }

        let Some(next) = tasks
            .into_iter()
            .filter(|t| t.is_pending() && t.execution_count == 0)
            .min_by_key(|t| t.submitted_at)
        else {
            return Ok(None);
        };

        let task = Task {
            status: TaskStatus::InProgress,
            worker_uuid: Some(worker_uuid.to_string()),
            execution_count: next.execution_count + 1,
            started_at: Some(self.clock.now_millis()),
            ..next
        };
        queue.update_task(task.clone())?;
        debug!(task = %task.uuid, worker = worker_uuid, "Task peeked");
        Ok(Some(task))
    }

    /// Block until a task is available for the worker, the timeout expires or
    /// the queue shuts down.
    pub fn wait_for_task(&self, worker_uuid: &str, timeout: Duration) -> Result<Option<Task>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return Ok(None);
            }
            if let Some(task) = self.peek_locked(&state, worker_uuid)? {
                return Ok(Some(task));
            }
            if self.signal.wait_until(&mut state, deadline).timed_out() {
                return Ok(None);
            }
        }
    }

    /// Remove a task from the queue and record its activity.
    ///
    /// An error may only accompany a FAILED status. Listeners are notified
    /// once the activity is stored; their failures are logged and ignored.
    pub fn remove(
        &self,
        task: &Task,
        status: TaskStatus,
        error: Option<&CeError>,
        analysis_uuid: Option<String>,
    ) -> Result<Activity> {
        let state = self.state.lock();
        let activity = self.remove_locked(&state, task, status, error, analysis_uuid)?;
        drop(state);
        self.notify_listeners(&activity);
        self.signal.notify_all();
        Ok(activity)
    }

    fn remove_locked(
        &self,
        _state: &QueueState,
        task: &Task,
        status: TaskStatus,
        error: Option<&CeError>,
        analysis_uuid: Option<String>,
    ) -> Result<Activity> {
        if !status.is_terminal() {
            return Err(CeError::queue(format!(
                "Task can only be removed with a terminal status, got {}",
                status
            )));
        }
        if error.is_some() && status != TaskStatus::Failed {
            return Err(CeError::queue("Error can be provided only when status is FAILED"));
        }

        let queued = self
            .storage
            .queue()
            .delete_task(&task.uuid)?
            .ok_or_else(|| CeError::queue(format!("Task {} does not exist in queue", task.uuid)))?;

        let now = self.clock.now_millis();
        let activity = Activity {
            execution_time_ms: queued.started_at.map(|started| now - started),
            task: queued,
            status,
            error_message: error.map(|e| e.to_string()),
            error_type: error.map(|e| e.category().to_string()),
            analysis_uuid,
            executed_at: now,
        };
        self.storage.queue().insert_activity(activity.clone())?;
        info!(task = %task.uuid, %status, "Task removed from queue");
        Ok(activity)
    }

    fn notify_listeners(&self, activity: &Activity) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            if let Err(err) = listener.on_remove(&activity.task, activity.status) {
                warn!(task = %activity.task.uuid, error = %err, "Queue listener failed");
            }
        }
    }

    /// Cancel a PENDING task.
    pub fn cancel(&self, task_uuid: &str) -> Result<Activity> {
        let state = self.state.lock();
        let task = self
            .storage
            .queue()
            .select_task(task_uuid)?
            .ok_or_else(|| CeError::queue(format!("Task {} does not exist in queue", task_uuid)))?;
        if !task.is_pending() {
            return Err(CeError::queue("Task is in progress and can't be canceled"));
        }
        let activity = self.remove_locked(&state, &task, TaskStatus::Canceled, None, None)?;
        drop(state);
        self.notify_listeners(&activity);
        self.signal.notify_all();
        Ok(activity)
    }

    /// Cancel every PENDING task. Tasks in progress are left alone.
    pub fn cancel_all(&self) -> Result<usize> {
        self.cancel_matching(|_| true)
    }

    /// Cancel PENDING tasks that were already started once and reset.
    pub fn cancel_worn_outs(&self) -> Result<usize> {
        self.cancel_matching(|task| task.execution_count >= 1)
    }

    /// Listeners hear about every task removed before a failure, which is
    /// then returned.
    fn cancel_matching(&self, filter: impl Fn(&Task) -> bool) -> Result<usize> {
        let state = self.state.lock();
        let mut removed = Vec::new();
        let mut failure = None;
        match self.storage.queue().select_tasks() {
            Ok(tasks) => {
                for task in tasks.iter().filter(|t| t.is_pending() && filter(t)) {
                    match self.remove_locked(&state, task, TaskStatus::Canceled, None, None) {
                        Ok(activity) => removed.push(activity),
                        Err(err) => {
                            failure = Some(err);
                            break;
                        }
                    }
                }
            }
            Err(err) => failure = Some(err),
        }
        drop(state);
        for activity in &removed {
            self.notify_listeners(activity);
        }
        self.signal.notify_all();
        match failure {
            Some(err) => Err(err),
            None => Ok(removed.len()),
        }
    }

    /// Reset to PENDING the tasks in progress on workers that no longer exist.
    pub fn reset_tasks_with_unknown_workers(&self, known_workers: &[String]) -> Result<usize> {
        let _state = self.state.lock();
        let known: HashSet<&str> = known_workers.iter().map(String::as_str).collect();
        let queue = self.storage.queue();
        let mut reset = 0;
        for task in queue.select_tasks()? {
            let orphan = task
                .worker_uuid
                .as_deref()
                .map_or(true, |worker| !known.contains(worker));
            if task.status == TaskStatus::InProgress && orphan {
                queue.update_task(Task {
                    status: TaskStatus::Pending,
                    started_at: None,
                    ..task
                })?;
                reset += 1;
            }
        }
        Ok(reset)
    }

    pub fn pause_submits(&self) {
        self.state.lock().submits_paused = true;
    }

    pub fn resume_submits(&self) {
        self.state.lock().submits_paused = false;
    }

    pub fn is_submit_paused(&self) -> bool {
        self.state.lock().submits_paused
    }

    pub fn pause_workers(&self) {
        self.state.lock().workers_paused = true;
    }

    pub fn resume_workers(&self) {
        self.state.lock().workers_paused = false;
        self.signal.notify_all();
    }

    pub fn workers_pause_status(&self) -> Result<WorkersPauseStatus> {
        let state = self.state.lock();
        if !state.workers_paused {
            return Ok(WorkersPauseStatus::Resumed);
        }
        let running = self
            .storage
            .queue()
            .select_tasks()?
            .iter()
            .any(|t| t.status == TaskStatus::InProgress);
        Ok(if running {
            WorkersPauseStatus::Pausing
        } else {
            WorkersPauseStatus::Paused
        })
    }

    /// Wake every waiting worker and make them stop.
    pub fn shutdown(&self) {
        self.state.lock().shutdown = true;
        self.signal.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }

    /// Block until no task is left in the queue or the timeout expires.
    /// Returns whether the queue drained.
    pub fn wait_until_empty(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if self.storage.queue().select_tasks()?.is_empty() {
                return Ok(true);
            }
            if self.signal.wait_until(&mut state, deadline).timed_out() {
                return Ok(self.storage.queue().select_tasks()?.is_empty());
            }
        }
    }

    pub fn task(&self, task_uuid: &str) -> Result<Option<Task>> {
        self.storage.queue().select_task(task_uuid)
    }

    pub fn activity(&self, task_uuid: &str) -> Result<Option<Activity>> {
        self.storage.queue().select_activity(task_uuid)
    }

    pub fn load_report(&self, task_uuid: &str) -> Result<Option<Vec<u8>>> {
        self.reports.load(task_uuid)
    }
}
