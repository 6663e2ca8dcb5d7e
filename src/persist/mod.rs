//! Diff-based persistence.
//!
//! Entities computed by an analysis are reconciled against the rows stored for
//! the same scope (usually the project): new uuids are inserted, uuids whose
//! content changed are updated, identical rows are left untouched (timestamps
//! included) and rows no longer produced are deleted.

mod dependencies;
mod line_hashes;

pub use dependencies::FileDependency;
pub use line_hashes::{line_hash, LineHashes};

use crate::errors::{CeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Upper bound of uuids sent to the store in one lookup or delete.
pub const MAX_BATCH_SIZE: usize = 1000;

/// An entity keyed by a stable uuid, reconciled within a scope.
pub trait Diffable: Clone + fmt::Debug + Send + Sync + 'static {
    fn uuid(&self) -> &str;

    /// Parent scope the entity is reconciled in
    fn scope(&self) -> &str;

    /// Content equality; identity and timestamps are excluded.
    fn same_content(&self, other: &Self) -> bool;

    /// Components the entity belongs to, used to purge disabled components.
    fn component_uuids(&self) -> Vec<&str>;
}

/// A persisted entity with its audit timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row<T> {
    pub content: T,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Row-level storage of one entity type.
pub trait RowStore<T: Diffable>: Send + Sync {
    fn select_uuids_by_scope(&self, scope: &str) -> Result<Vec<String>>;

    /// Rows for the given uuids; unknown uuids are ignored.
    fn select_by_uuids(&self, uuids: &[String]) -> Result<Vec<Row<T>>>;

    fn insert(&self, row: Row<T>) -> Result<()>;

    fn update(&self, row: Row<T>) -> Result<()>;

    fn delete(&self, uuids: &[String]) -> Result<usize>;

    /// Delete every row attached to one of the components.
    fn delete_referencing(&self, component_uuids: &[String]) -> Result<usize>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
}

impl DiffStats {
    pub fn writes(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

impl fmt::Display for DiffStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "inserted={} updated={} unchanged={} deleted={}",
            self.inserted, self.updated, self.unchanged, self.deleted
        )
    }
}

/// Reconcile `computed` against the rows stored for `scope`.
pub fn reconcile<T: Diffable>(
    store: &dyn RowStore<T>,
    scope: &str,
    computed: Vec<T>,
    now: i64,
) -> Result<DiffStats> {
    reconcile_in_batches(store, scope, computed, now, MAX_BATCH_SIZE)
}

/// Same as [`reconcile`] with an explicit lookup batch size.
pub fn reconcile_in_batches<T: Diffable>(
    store: &dyn RowStore<T>,
    scope: &str,
    computed: Vec<T>,
    now: i64,
    batch_size: usize,
) -> Result<DiffStats> {
    let batch_size = batch_size.max(1);
    let mut seen = HashSet::with_capacity(computed.len());
    for entity in &computed {
        if entity.scope() != scope {
            return Err(CeError::state(format!(
                "Entity {} belongs to scope {} instead of {}",
                entity.uuid(),
                entity.scope(),
                scope
            )));
        }
        if !seen.insert(entity.uuid().to_string()) {
            return Err(CeError::state(format!(
                "Entity {} is computed twice",
                entity.uuid()
            )));
        }
    }

    let persisted_uuids: HashSet<String> = store.select_uuids_by_scope(scope)?.into_iter().collect();
    let to_fetch: Vec<String> = computed
        .iter()
        .map(|e| e.uuid().to_string())
        .filter(|uuid| persisted_uuids.contains(uuid))
        .collect();
    let mut persisted: HashMap<String, Row<T>> = HashMap::with_capacity(to_fetch.len());
    for chunk in to_fetch.chunks(batch_size) {
        for row in store.select_by_uuids(chunk)? {
            persisted.insert(row.content.uuid().to_string(), row);
        }
    }

    let mut stats = DiffStats::default();
    for entity in computed {
        match persisted.get(entity.uuid()) {
            Some(existing) if existing.content.same_content(&entity) => stats.unchanged += 1,
            Some(existing) => {
                let created_at = existing.created_at;
                store.update(Row {
                    content: entity,
                    created_at,
                    updated_at: now,
                })?;
                stats.updated += 1;
            }
            None => {
                store.insert(Row {
                    content: entity,
                    created_at: now,
                    updated_at: now,
                })?;
                stats.inserted += 1;
            }
        }
    }

    let mut obsolete: Vec<String> = persisted_uuids
        .into_iter()
        .filter(|uuid| !seen.contains(uuid))
        .collect();
    obsolete.sort();
    for chunk in obsolete.chunks(batch_size) {
        stats.deleted += store.delete(chunk)?;
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use crate::storage::Storage;

    fn dep(from: &str, to: &str, weight: u32) -> FileDependency {
        FileDependency::new("proj", from, to, weight)
    }

    #[test]
    fn test_insert_update_delete_unchanged() {
        let storage = InMemoryStorage::new();
        let store = storage.dependencies();
        let first = reconcile(store, "proj", vec![dep("a", "b", 1), dep("a", "c", 1)], 10).unwrap();
        assert_eq!(first, DiffStats { inserted: 2, ..Default::default() });

        let second = reconcile(store, "proj", vec![dep("a", "b", 1), dep("a", "c", 3), dep("b", "c", 1)], 20).unwrap();
        assert_eq!(
            second,
            DiffStats {
                inserted: 1,
                updated: 1,
                unchanged: 1,
                deleted: 0
            }
        );

        let third = reconcile(store, "proj", vec![dep("a", "c", 3)], 30).unwrap();
        assert_eq!(third.deleted, 2);
        assert_eq!(third.unchanged, 1);

        let rows = store
            .select_by_uuids(&[dep("a", "c", 0).uuid().to_string()])
            .unwrap();
        assert_eq!(rows[0].created_at, 10);
        assert_eq!(rows[0].updated_at, 20);
    }

    #[test]
    fn test_second_run_writes_nothing() {
        let storage = InMemoryStorage::new();
        let computed = vec![dep("a", "b", 1), dep("b", "c", 2)];
        reconcile(storage.dependencies(), "proj", computed.clone(), 10).unwrap();
        let writes = storage.write_count();
        let stats = reconcile(storage.dependencies(), "proj", computed, 99).unwrap();
        assert_eq!(stats.writes(), 0);
        assert_eq!(storage.write_count(), writes);
    }

    #[test]
    fn test_other_scopes_are_untouched() {
        let storage = InMemoryStorage::new();
        let other = FileDependency::new("other", "x", "y", 1);
        reconcile(storage.dependencies(), "other", vec![other.clone()], 1).unwrap();
        reconcile(storage.dependencies(), "proj", vec![], 2).unwrap();
        assert_eq!(
            storage.dependencies().select_uuids_by_scope("other").unwrap(),
            vec![other.uuid().to_string()]
        );
    }

    #[test]
    fn test_entity_from_another_scope_is_rejected() {
        let storage = InMemoryStorage::new();
        let err = reconcile(storage.dependencies(), "proj", vec![FileDependency::new("x", "a", "b", 1)], 1);
        assert!(matches!(err, Err(CeError::State(_))));
    }

    #[test]
    fn test_duplicated_uuid_is_rejected() {
        let storage = InMemoryStorage::new();
        let err = reconcile(storage.dependencies(), "proj", vec![dep("a", "b", 1), dep("a", "b", 2)], 1);
        assert!(err.is_err());
    }
}
