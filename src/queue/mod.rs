//! Task queue and workers.
//!
//! Submitted reports wait in a [`ReportStore`] while their [`Task`] sits in
//! the storage queue. A [`WorkerPool`] runs [`CeWorker`]s that peek tasks,
//! process them in a [`TaskContainer`] and remove them with their final
//! status, notifying every [`QueueListener`] once.

mod ce_queue;
mod container;
mod listener;
mod report_store;
mod task;
mod worker;

pub use ce_queue::{CeQueue, WorkersPauseStatus};
pub use container::TaskContainer;
pub use listener::{QueueListener, ReportCleanupListener};
pub use report_store::{FsReportStore, MemoryReportStore, ReportStore};
pub use task::{Activity, Task, TaskStatus, TaskSubmit, TaskType};
pub use worker::{
    CeWorker, ReportTaskProcessor, TaskProcessor, TaskResult, WorkerPool, WorkerPoolOptions,
};
