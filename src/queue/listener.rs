use super::{ReportStore, Task, TaskStatus};
use crate::errors::Result;
use std::sync::Arc;
use tracing::debug;

/// Notified once for every task removed from the queue.
///
/// Errors are logged by the queue and never change the outcome of the task.
pub trait QueueListener: Send + Sync {
    fn on_remove(&self, task: &Task, status: TaskStatus) -> Result<()>;
}

/// Deletes the report blob of a removed task.
pub struct ReportCleanupListener {
    reports: Arc<dyn ReportStore>,
}

impl ReportCleanupListener {
    pub fn new(reports: Arc<dyn ReportStore>) -> Self {
        Self { reports }
    }
}

impl QueueListener for ReportCleanupListener {
    fn on_remove(&self, task: &Task, status: TaskStatus) -> Result<()> {
        debug!(task = %task.uuid, %status, "Deleting report of removed task");
        self.reports.delete(&task.uuid)
    }
}
