use super::{
    ComponentRow, ComponentStore, IssueStore, MeasureRow, MeasureStore, MetricStore, QueueStore,
    SnapshotRow, SnapshotStatus, SnapshotStore, Storage,
};
use crate::errors::{CeError, Result};
use crate::issue::Issue;
use crate::metric::{core_metrics, Metric};
use crate::persist::{Diffable, FileDependency, LineHashes, Row, RowStore};
use crate::queue::{Activity, Task};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StorageData {
    #[serde(default)]
    components: BTreeMap<String, ComponentRow>,
    #[serde(default)]
    snapshots: BTreeMap<String, SnapshotRow>,
    #[serde(default)]
    measures: Vec<MeasureRow>,
    #[serde(default)]
    issues: BTreeMap<String, Issue>,
    #[serde(default)]
    metrics: Vec<Metric>,
    #[serde(default)]
    dependencies: BTreeMap<String, Row<FileDependency>>,
    #[serde(default)]
    line_hashes: BTreeMap<String, Row<LineHashes>>,
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    activities: BTreeMap<String, Activity>,
}

/// Thread-safe storage kept in memory, optionally persisted as JSON.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    data: RwLock<StorageData>,
    writes: AtomicUsize,
}

impl InMemoryStorage {
    /// Empty storage seeded with the core metric catalog.
    pub fn new() -> Self {
        Self::with_metrics(core_metrics())
    }

    pub fn with_metrics(metrics: Vec<Metric>) -> Self {
        Self {
            data: RwLock::new(StorageData {
                metrics,
                ..StorageData::default()
            }),
            writes: AtomicUsize::new(0),
        }
    }

    /// Load a state file; a missing file yields a fresh storage.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let contents = fs::read_to_string(path)?;
        let mut data: StorageData = serde_json::from_str(&contents)?;
        if data.metrics.is_empty() {
            data.metrics = core_metrics();
        }
        Ok(Self {
            data: RwLock::new(data),
            writes: AtomicUsize::new(0),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = self.data.read();
        let json = serde_json::to_string_pretty(&*data)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json)?;
        Ok(())
    }

    /// Number of write calls served so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    fn wrote(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }
}

impl Storage for InMemoryStorage {
    fn components(&self) -> &dyn ComponentStore {
        self
    }

    fn snapshots(&self) -> &dyn SnapshotStore {
        self
    }

    fn measures(&self) -> &dyn MeasureStore {
        self
    }

    fn issues(&self) -> &dyn IssueStore {
        self
    }

    fn metrics(&self) -> &dyn MetricStore {
        self
    }

    fn dependencies(&self) -> &dyn RowStore<FileDependency> {
        self
    }

    fn line_hashes(&self) -> &dyn RowStore<LineHashes> {
        self
    }

    fn queue(&self) -> &dyn QueueStore {
        self
    }
}

impl ComponentStore for InMemoryStorage {
    fn select_by_key(&self, key: &str) -> Result<Option<ComponentRow>> {
        Ok(self
            .data
            .read()
            .components
            .values()
            .find(|c| c.key == key)
            .cloned())
    }

    fn select_by_root(&self, root_uuid: &str) -> Result<Vec<ComponentRow>> {
        Ok(self
            .data
            .read()
            .components
            .values()
            .filter(|c| c.root_uuid == root_uuid)
            .cloned()
            .collect())
    }

    fn upsert(&self, rows: &[ComponentRow]) -> Result<()> {
        let mut data = self.data.write();
        for row in rows {
            data.components.insert(row.uuid.clone(), row.clone());
        }
        self.wrote();
        Ok(())
    }

    fn disable(&self, uuids: &[String]) -> Result<usize> {
        let mut data = self.data.write();
        let mut count = 0;
        for uuid in uuids {
            if let Some(row) = data.components.get_mut(uuid) {
                row.enabled = false;
                count += 1;
            }
        }
        self.wrote();
        Ok(count)
    }
}

impl SnapshotStore for InMemoryStorage {
    fn select_by_component(&self, component_uuid: &str) -> Result<Vec<SnapshotRow>> {
        let mut rows: Vec<SnapshotRow> = self
            .data
            .read()
            .snapshots
            .values()
            .filter(|s| s.component_uuid == component_uuid)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.uuid.cmp(&b.uuid)));
        Ok(rows)
    }

    fn select_by_uuid(&self, uuid: &str) -> Result<Option<SnapshotRow>> {
        Ok(self.data.read().snapshots.get(uuid).cloned())
    }

    fn insert(&self, row: SnapshotRow) -> Result<()> {
        let mut data = self.data.write();
        if data.snapshots.contains_key(&row.uuid) {
            return Err(CeError::storage(format!("Analysis {} already exists", row.uuid)));
        }
        data.snapshots.insert(row.uuid.clone(), row);
        self.wrote();
        Ok(())
    }

    fn enable(&self, uuid: &str) -> Result<()> {
        let mut data = self.data.write();
        let component_uuid = data
            .snapshots
            .get(uuid)
            .map(|s| s.component_uuid.clone())
            .ok_or_else(|| CeError::storage(format!("Analysis {} does not exist", uuid)))?;
        for snapshot in data.snapshots.values_mut() {
            if snapshot.component_uuid == component_uuid {
                snapshot.last = snapshot.uuid == uuid;
                if snapshot.uuid == uuid {
                    snapshot.status = SnapshotStatus::Processed;
                }
            }
        }
        self.wrote();
        Ok(())
    }

    fn delete(&self, uuids: &[String]) -> Result<usize> {
        let mut data = self.data.write();
        let count = uuids
            .iter()
            .filter(|uuid| data.snapshots.remove(uuid.as_str()).is_some())
            .count();
        self.wrote();
        Ok(count)
    }
}

impl MeasureStore for InMemoryStorage {
    fn select_by_analysis(&self, analysis_uuid: &str) -> Result<Vec<MeasureRow>> {
        Ok(self
            .data
            .read()
            .measures
            .iter()
            .filter(|m| m.analysis_uuid == analysis_uuid)
            .cloned()
            .collect())
    }

    fn insert(&self, rows: Vec<MeasureRow>) -> Result<()> {
        self.data.write().measures.extend(rows);
        self.wrote();
        Ok(())
    }

    fn delete_by_analyses(&self, analysis_uuids: &[String]) -> Result<usize> {
        let targets: HashSet<&str> = analysis_uuids.iter().map(String::as_str).collect();
        let mut data = self.data.write();
        let before = data.measures.len();
        data.measures
            .retain(|m| !targets.contains(m.analysis_uuid.as_str()));
        self.wrote();
        Ok(before - data.measures.len())
    }

    fn delete_by_components(&self, component_uuids: &[String]) -> Result<usize> {
        let targets: HashSet<&str> = component_uuids.iter().map(String::as_str).collect();
        let mut data = self.data.write();
        let before = data.measures.len();
        data.measures
            .retain(|m| !targets.contains(m.component_uuid.as_str()));
        self.wrote();
        Ok(before - data.measures.len())
    }
}

impl IssueStore for InMemoryStorage {
    fn select_by_project(&self, project_uuid: &str) -> Result<Vec<Issue>> {
        Ok(self
            .data
            .read()
            .issues
            .values()
            .filter(|i| i.project_uuid == project_uuid)
            .cloned()
            .collect())
    }

    fn upsert(&self, issues: Vec<Issue>) -> Result<()> {
        let mut data = self.data.write();
        for issue in issues {
            data.issues.insert(issue.key.clone(), issue);
        }
        self.wrote();
        Ok(())
    }

    fn delete_closed_before(&self, project_uuid: &str, before: i64) -> Result<usize> {
        let mut data = self.data.write();
        let count = data.issues.len();
        data.issues.retain(|_, issue| {
            !(issue.project_uuid == project_uuid
                && issue.is_closed()
                && issue.close_date.is_some_and(|closed| closed < before))
        });
        self.wrote();
        Ok(count - data.issues.len())
    }
}

impl MetricStore for InMemoryStorage {
    fn select_all(&self) -> Result<Vec<Metric>> {
        Ok(self.data.read().metrics.clone())
    }
}

impl QueueStore for InMemoryStorage {
    fn insert_task(&self, task: Task) -> Result<()> {
        let mut data = self.data.write();
        if data.tasks.iter().any(|t| t.uuid == task.uuid) {
            return Err(CeError::storage(format!("Task {} already exists", task.uuid)));
        }
        data.tasks.push(task);
        self.wrote();
        Ok(())
    }

    fn update_task(&self, task: Task) -> Result<()> {
        let mut data = self.data.write();
        let slot = data
            .tasks
            .iter_mut()
            .find(|t| t.uuid == task.uuid)
            .ok_or_else(|| CeError::storage(format!("Task {} does not exist", task.uuid)))?;
        *slot = task;
        self.wrote();
        Ok(())
    }

    fn select_task(&self, uuid: &str) -> Result<Option<Task>> {
        Ok(self.data.read().tasks.iter().find(|t| t.uuid == uuid).cloned())
    }

    fn select_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.data.read().tasks.clone())
    }

    fn delete_task(&self, uuid: &str) -> Result<Option<Task>> {
        let mut data = self.data.write();
        let removed = data
            .tasks
            .iter()
            .position(|t| t.uuid == uuid)
            .map(|index| data.tasks.remove(index));
        self.wrote();
        Ok(removed)
    }

    fn insert_activity(&self, activity: Activity) -> Result<()> {
        self.data
            .write()
            .activities
            .insert(activity.task.uuid.clone(), activity);
        self.wrote();
        Ok(())
    }

    fn select_activity(&self, uuid: &str) -> Result<Option<Activity>> {
        Ok(self.data.read().activities.get(uuid).cloned())
    }
}

fn select_uuids<T: Diffable>(rows: &BTreeMap<String, Row<T>>, scope: &str) -> Vec<String> {
    rows.values()
        .filter(|r| r.content.scope() == scope)
        .map(|r| r.content.uuid().to_string())
        .collect()
}

fn select_rows<T: Diffable>(rows: &BTreeMap<String, Row<T>>, uuids: &[String]) -> Vec<Row<T>> {
    uuids.iter().filter_map(|uuid| rows.get(uuid).cloned()).collect()
}

fn insert_row<T: Diffable>(rows: &mut BTreeMap<String, Row<T>>, row: Row<T>) -> Result<()> {
    let uuid = row.content.uuid().to_string();
    if rows.contains_key(&uuid) {
        return Err(CeError::storage(format!("Row {} already exists", uuid)));
    }
    rows.insert(uuid, row);
    Ok(())
}

fn update_row<T: Diffable>(rows: &mut BTreeMap<String, Row<T>>, row: Row<T>) -> Result<()> {
    let uuid = row.content.uuid().to_string();
    match rows.get_mut(&uuid) {
        Some(slot) => {
            *slot = row;
            Ok(())
        }
        None => Err(CeError::storage(format!("Row {} does not exist", uuid))),
    }
}

fn delete_rows<T: Diffable>(rows: &mut BTreeMap<String, Row<T>>, uuids: &[String]) -> usize {
    uuids.iter().filter(|uuid| rows.remove(uuid.as_str()).is_some()).count()
}

fn delete_referencing<T: Diffable>(
    rows: &mut BTreeMap<String, Row<T>>,
    component_uuids: &[String],
) -> usize {
    let targets: HashSet<&str> = component_uuids.iter().map(String::as_str).collect();
    let before = rows.len();
    rows.retain(|_, row| {
        !row.content
            .component_uuids()
            .iter()
            .any(|uuid| targets.contains(uuid))
    });
    before - rows.len()
}

macro_rules! impl_row_store {
    ($entity:ty, $table:ident) => {
        impl RowStore<$entity> for InMemoryStorage {
            fn select_uuids_by_scope(&self, scope: &str) -> Result<Vec<String>> {
                Ok(select_uuids(&self.data.read().$table, scope))
            }

            fn select_by_uuids(&self, uuids: &[String]) -> Result<Vec<Row<$entity>>> {
                Ok(select_rows(&self.data.read().$table, uuids))
            }

            fn insert(&self, row: Row<$entity>) -> Result<()> {
                insert_row(&mut self.data.write().$table, row)?;
                self.wrote();
                Ok(())
            }

            fn update(&self, row: Row<$entity>) -> Result<()> {
                update_row(&mut self.data.write().$table, row)?;
                self.wrote();
                Ok(())
            }

            fn delete(&self, uuids: &[String]) -> Result<usize> {
                let count = delete_rows(&mut self.data.write().$table, uuids);
                self.wrote();
                Ok(count)
            }

            fn delete_referencing(&self, component_uuids: &[String]) -> Result<usize> {
                let count = delete_referencing(&mut self.data.write().$table, component_uuids);
                self.wrote();
                Ok(count)
            }
        }
    };
}

impl_row_store!(FileDependency, dependencies);
impl_row_store!(LineHashes, line_hashes);
