//! Compute engine for a code quality platform.
//!
//! Scanner reports are queued as tasks and processed by a pool of workers.
//! Each task runs an ordered pipeline that builds the component tree, computes
//! measures and issues, and diff-persists everything into storage before a
//! retention purge cleans up old and orphaned data.

pub mod cli;
pub mod clock;
pub mod component;
pub mod config;
pub mod errors;
pub mod index;
pub mod issue;
pub mod measure;
pub mod metric;
pub mod observability;
pub mod period;
pub mod persist;
pub mod pipeline;
pub mod purge;
pub mod queue;
pub mod report;
pub mod rules;
pub mod storage;

// Re-export commonly used types
pub use crate::component::{Component, ComponentTree, ComponentType};
pub use crate::errors::{CeError, Result};
pub use crate::pipeline::{ComputationStep, StepExecutor, TaskContext};
pub use crate::purge::PurgeTask;
pub use crate::queue::{CeQueue, CeWorker, Task, TaskStatus, TaskSubmit, WorkerPool};
pub use crate::report::ScannerReport;
pub use crate::storage::{InMemoryStorage, Storage};
