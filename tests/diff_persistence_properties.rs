//! Property-based tests for diff-persistence
//!
//! These tests verify invariants that hold for any previous and computed state:
//! - After reconciliation the stored rows equal the computed entities
//! - Reconciling the same state twice writes nothing the second time
//! - Rows of other scopes are never touched
//! - The batch size used for lookups does not change the outcome

use compute_engine::persist::{reconcile, reconcile_in_batches, FileDependency, Row, RowStore};
use compute_engine::storage::{InMemoryStorage, Storage};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

const SCOPE: &str = "project";

/// Dependencies between up to six files, one per (from, to) pair.
fn dependencies(prefix: &'static str) -> impl Strategy<Value = Vec<FileDependency>> {
    prop::collection::btree_map((0u8..6, 0u8..6), 1u32..5, 0..12).prop_map(move |edges| {
        edges
            .into_iter()
            .map(|((from, to), weight)| {
                FileDependency::new(
                    SCOPE,
                    &format!("{}{}", prefix, from),
                    &format!("{}{}", prefix, to),
                    weight,
                )
            })
            .collect()
    })
}

fn stored(storage: &InMemoryStorage, scope: &str) -> BTreeMap<String, u32> {
    let store = storage.dependencies();
    let uuids = store.select_uuids_by_scope(scope).unwrap();
    store
        .select_by_uuids(&uuids)
        .unwrap()
        .into_iter()
        .map(|row| (row.content.uuid.clone(), row.content.weight))
        .collect()
}

fn expected(computed: &[FileDependency]) -> BTreeMap<String, u32> {
    computed.iter().map(|d| (d.uuid.clone(), d.weight)).collect()
}

proptest! {
    /// Property: stored state equals the computed state, and the statistics
    /// account for every previous and computed entity
    #[test]
    fn prop_reconcile_converges_to_computed(
        previous in dependencies("file-"),
        computed in dependencies("file-")
    ) {
        let storage = InMemoryStorage::new();
        reconcile(storage.dependencies(), SCOPE, previous.clone(), 1).unwrap();
        let stats = reconcile(storage.dependencies(), SCOPE, computed.clone(), 2).unwrap();

        prop_assert_eq!(stored(&storage, SCOPE), expected(&computed));
        prop_assert_eq!(stats.inserted + stats.updated + stats.unchanged, computed.len());

        let previous_uuids: BTreeSet<&str> = previous.iter().map(|d| d.uuid.as_str()).collect();
        let computed_uuids: BTreeSet<&str> = computed.iter().map(|d| d.uuid.as_str()).collect();
        prop_assert_eq!(stats.deleted, previous_uuids.difference(&computed_uuids).count());
        prop_assert_eq!(stats.inserted, computed_uuids.difference(&previous_uuids).count());
    }

    /// Property: a second reconciliation of the same state is a no-op
    #[test]
    fn prop_reconcile_is_idempotent(computed in dependencies("file-")) {
        let storage = InMemoryStorage::new();
        reconcile(storage.dependencies(), SCOPE, computed.clone(), 1).unwrap();
        let writes = storage.write_count();

        let stats = reconcile(storage.dependencies(), SCOPE, computed.clone(), 2).unwrap();
        prop_assert_eq!(stats.writes(), 0);
        prop_assert_eq!(stats.unchanged, computed.len());
        prop_assert_eq!(storage.write_count(), writes);
    }

    /// Property: rows of another scope survive any reconciliation
    #[test]
    fn prop_other_scopes_untouched(
        other in dependencies("other-"),
        computed in dependencies("file-")
    ) {
        let storage = InMemoryStorage::new();
        for dependency in &other {
            let foreign = FileDependency {
                project_uuid: "other-project".to_string(),
                ..dependency.clone()
            };
            storage
                .dependencies()
                .insert(Row { content: foreign, created_at: 0, updated_at: 0 })
                .unwrap();
        }
        let before = stored(&storage, "other-project");

        reconcile(storage.dependencies(), SCOPE, computed, 1).unwrap();
        prop_assert_eq!(stored(&storage, "other-project"), before);
    }

    /// Property: the lookup batch size does not change the result
    #[test]
    fn prop_batch_size_is_transparent(
        previous in dependencies("file-"),
        computed in dependencies("file-"),
        batch_size in 1usize..5
    ) {
        let batched = InMemoryStorage::new();
        let single = InMemoryStorage::new();
        for storage in [&batched, &single] {
            reconcile(storage.dependencies(), SCOPE, previous.clone(), 1).unwrap();
        }

        let a = reconcile_in_batches(batched.dependencies(), SCOPE, computed.clone(), 2, batch_size).unwrap();
        let b = reconcile(single.dependencies(), SCOPE, computed, 2).unwrap();
        prop_assert_eq!(a, b);
        prop_assert_eq!(stored(&batched, SCOPE), stored(&single, SCOPE));
    }
}
