//! Storage collaborator.
//!
//! The pipeline reads and writes rows through these narrow traits only. Each
//! call is assumed atomic; nothing here spans several calls in a transaction.
//! [`InMemoryStorage`] implements every trait and can be saved to and loaded
//! from a JSON state file.

mod memory;

pub use memory::InMemoryStorage;

use crate::component::ComponentType;
use crate::errors::Result;
use crate::issue::Issue;
use crate::measure::MeasureValue;
use crate::metric::Metric;
use crate::persist::{FileDependency, LineHashes, RowStore};
use crate::queue::{Activity, Task};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRow {
    pub uuid: String,
    pub key: String,
    /// Uuid of the project or view the component belongs to
    pub root_uuid: String,
    #[serde(default)]
    pub parent_uuid: Option<String>,
    pub component_type: ComponentType,
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotStatus {
    Unprocessed,
    Processed,
}

/// One analysis of a root component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub uuid: String,
    pub component_uuid: String,
    pub created_at: i64,
    pub status: SnapshotStatus,
    pub last: bool,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub period_mode: Option<String>,
    #[serde(default)]
    pub period_param: Option<String>,
    #[serde(default)]
    pub period_date: Option<i64>,
}

impl SnapshotRow {
    pub fn is_processed(&self) -> bool {
        self.status == SnapshotStatus::Processed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureRow {
    pub analysis_uuid: String,
    pub component_uuid: String,
    pub metric_id: u32,
    pub value: MeasureValue,
    #[serde(default)]
    pub variation: Option<f64>,
}

pub trait ComponentStore: Send + Sync {
    fn select_by_key(&self, key: &str) -> Result<Option<ComponentRow>>;

    /// Every component of a project or view, the root included.
    fn select_by_root(&self, root_uuid: &str) -> Result<Vec<ComponentRow>>;

    /// Insert or replace rows by uuid.
    fn upsert(&self, rows: &[ComponentRow]) -> Result<()>;

    fn disable(&self, uuids: &[String]) -> Result<usize>;
}

pub trait SnapshotStore: Send + Sync {
    /// Analyses of a root component, oldest first.
    fn select_by_component(&self, component_uuid: &str) -> Result<Vec<SnapshotRow>>;

    fn select_by_uuid(&self, uuid: &str) -> Result<Option<SnapshotRow>>;

    fn insert(&self, row: SnapshotRow) -> Result<()>;

    /// Mark an analysis PROCESSED and make it the only `last` one of its component.
    fn enable(&self, uuid: &str) -> Result<()>;

    fn delete(&self, uuids: &[String]) -> Result<usize>;
}

impl dyn SnapshotStore + '_ {
    pub fn select_last(&self, component_uuid: &str) -> Result<Option<SnapshotRow>> {
        Ok(self
            .select_by_component(component_uuid)?
            .into_iter()
            .find(|s| s.last && s.is_processed()))
    }
}

pub trait MeasureStore: Send + Sync {
    fn select_by_analysis(&self, analysis_uuid: &str) -> Result<Vec<MeasureRow>>;

    fn insert(&self, rows: Vec<MeasureRow>) -> Result<()>;

    fn delete_by_analyses(&self, analysis_uuids: &[String]) -> Result<usize>;

    fn delete_by_components(&self, component_uuids: &[String]) -> Result<usize>;
}

pub trait IssueStore: Send + Sync {
    fn select_by_project(&self, project_uuid: &str) -> Result<Vec<Issue>>;

    /// Insert or replace issues by key.
    fn upsert(&self, issues: Vec<Issue>) -> Result<()>;

    /// Delete closed issues of the project closed strictly before `before`.
    fn delete_closed_before(&self, project_uuid: &str, before: i64) -> Result<usize>;
}

pub trait MetricStore: Send + Sync {
    fn select_all(&self) -> Result<Vec<Metric>>;
}

pub trait QueueStore: Send + Sync {
    fn insert_task(&self, task: Task) -> Result<()>;

    fn update_task(&self, task: Task) -> Result<()>;

    fn select_task(&self, uuid: &str) -> Result<Option<Task>>;

    /// Queued tasks in submission order.
    fn select_tasks(&self) -> Result<Vec<Task>>;

    fn delete_task(&self, uuid: &str) -> Result<Option<Task>>;

    fn insert_activity(&self, activity: Activity) -> Result<()>;

    fn select_activity(&self, uuid: &str) -> Result<Option<Activity>>;
}

/// Every store the compute engine needs.
pub trait Storage: Send + Sync {
    fn components(&self) -> &dyn ComponentStore;

    fn snapshots(&self) -> &dyn SnapshotStore;

    fn measures(&self) -> &dyn MeasureStore;

    fn issues(&self) -> &dyn IssueStore;

    fn metrics(&self) -> &dyn MetricStore;

    fn dependencies(&self) -> &dyn RowStore<FileDependency>;

    fn line_hashes(&self) -> &dyn RowStore<LineHashes>;

    fn queue(&self) -> &dyn QueueStore;
}
