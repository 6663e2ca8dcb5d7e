use crate::errors::{CeError, Result};
use crate::persist::{reconcile, FileDependency, LineHashes};
use crate::pipeline::{ComputationStep, TaskContext};
use crate::storage::{ComponentRow, MeasureRow, SnapshotRow, SnapshotStatus};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Upserts every component of the tree and disables the ones that vanished.
pub struct PersistComponentsStep;

impl ComputationStep for PersistComponentsStep {
    fn description(&self) -> &'static str {
        "Persist components"
    }

    fn execute(&self, ctx: &mut TaskContext) -> Result<()> {
        let storage = Arc::clone(&ctx.services.storage);
        let tree = ctx.tree.get()?;
        let root = tree.root();

        let rows: Vec<ComponentRow> = tree
            .pre_order()
            .into_iter()
            .map(|component| ComponentRow {
                uuid: component.uuid.clone(),
                key: component.key.clone(),
                root_uuid: root.uuid.clone(),
                parent_uuid: tree.parent(component).map(|p| p.uuid.clone()),
                component_type: component.component_type,
                name: component.name.clone(),
                path: component.path.clone(),
                language: component.language().map(str::to_string),
                enabled: true,
            })
            .collect();

        let vanished: Vec<String> = storage
            .components()
            .select_by_root(&root.uuid)?
            .into_iter()
            .filter(|row| row.enabled && tree.get_by_uuid(&row.uuid).is_none())
            .map(|row| row.uuid)
            .collect();

        storage.components().upsert(&rows)?;
        let disabled = if vanished.is_empty() {
            0
        } else {
            storage.components().disable(&vanished)?
        };
        debug!(components = rows.len(), disabled, "Components persisted");
        ctx.stats.components = rows.len();
        ctx.stats.disabled_components = disabled;
        Ok(())
    }
}

/// Inserts the analysis as UNPROCESSED; it only becomes visible once every
/// other write succeeded.
pub struct PersistAnalysisStep;

impl ComputationStep for PersistAnalysisStep {
    fn description(&self) -> &'static str {
        "Persist analysis"
    }

    fn execute(&self, ctx: &mut TaskContext) -> Result<()> {
        let root_uuid = ctx.tree.get()?.root().uuid.clone();
        let period = ctx.period.period()?;
        let row = SnapshotRow {
            uuid: ctx.analysis.uuid.clone(),
            component_uuid: root_uuid,
            created_at: ctx.analysis.date,
            status: SnapshotStatus::Unprocessed,
            last: false,
            version: ctx.analysis.version.clone(),
            period_mode: period.map(|p| p.mode.as_str().to_string()),
            period_param: period.and_then(|p| p.mode_parameter.clone()),
            period_date: period.map(|p| p.snapshot_date),
        };
        ctx.storage().snapshots().insert(row)
    }
}

pub struct PersistMeasuresStep;

impl ComputationStep for PersistMeasuresStep {
    fn description(&self) -> &'static str {
        "Persist measures"
    }

    fn execute(&self, ctx: &mut TaskContext) -> Result<()> {
        let tree = ctx.tree.get()?;
        let mut rows = Vec::with_capacity(ctx.measures.len());
        for component in tree.pre_order() {
            for (metric_id, measure) in ctx.measures.raw_measures_of(component.reference) {
                rows.push(MeasureRow {
                    analysis_uuid: ctx.analysis.uuid.clone(),
                    component_uuid: component.uuid.clone(),
                    metric_id,
                    value: measure.value.clone(),
                    variation: measure.variation,
                });
            }
        }
        let count = rows.len();
        ctx.storage().measures().insert(rows)?;
        ctx.stats.measures = count;
        Ok(())
    }
}

pub struct PersistIssuesStep;

impl ComputationStep for PersistIssuesStep {
    fn description(&self) -> &'static str {
        "Persist issues"
    }

    fn execute(&self, ctx: &mut TaskContext) -> Result<()> {
        let count = ctx.issues.len();
        ctx.storage().issues().upsert(ctx.issues.clone())?;
        ctx.stats.issues = count;
        Ok(())
    }
}

/// Reconciles file dependencies. Several report entries for the same pair of
/// files are merged and their weights added.
pub struct PersistFileDependenciesStep;

impl ComputationStep for PersistFileDependenciesStep {
    fn description(&self) -> &'static str {
        "Persist file dependencies"
    }

    fn execute(&self, ctx: &mut TaskContext) -> Result<()> {
        let storage = Arc::clone(&ctx.services.storage);
        let now = ctx.now();
        let tree = ctx.tree.get()?;
        let project_uuid = tree.root().uuid.as_str();

        let file_uuid = |reference: u32| {
            tree.get_by_ref(reference)
                .filter(|c| c.is_file())
                .map(|c| c.uuid.clone())
                .ok_or_else(|| {
                    CeError::report(format!(
                        "Dependency refers to component ref {} which is not a file",
                        reference
                    ))
                })
        };
        let mut weights: BTreeMap<(String, String), u32> = BTreeMap::new();
        for dependency in &ctx.report.dependencies {
            let pair = (file_uuid(dependency.from_ref)?, file_uuid(dependency.to_ref)?);
            let weight = weights.entry(pair).or_default();
            *weight = weight.checked_add(dependency.weight).ok_or_else(|| {
                CeError::report(format!(
                    "Weight of dependency from ref {} to ref {} is out of range",
                    dependency.from_ref, dependency.to_ref
                ))
            })?;
        }

        let computed: Vec<FileDependency> = weights
            .into_iter()
            .map(|((from, to), weight)| FileDependency::new(project_uuid, &from, &to, weight))
            .collect();
        let stats = reconcile(storage.dependencies(), project_uuid, computed, now)?;
        info!(%stats, "File dependencies persisted");
        ctx.stats.dependencies = stats;
        Ok(())
    }
}

pub struct PersistLineHashesStep;

impl ComputationStep for PersistLineHashesStep {
    fn description(&self) -> &'static str {
        "Persist line hashes"
    }

    fn execute(&self, ctx: &mut TaskContext) -> Result<()> {
        let storage = Arc::clone(&ctx.services.storage);
        let now = ctx.now();
        let tree = ctx.tree.get()?;
        let project_uuid = tree.root().uuid.as_str();

        let mut computed = Vec::with_capacity(ctx.report.sources.len());
        for source in &ctx.report.sources {
            let file = tree
                .get_by_ref(source.component_ref)
                .filter(|c| c.is_file())
                .ok_or_else(|| {
                    CeError::report(format!(
                        "Source attached to component ref {} which is not a file",
                        source.component_ref
                    ))
                })?;
            computed.push(LineHashes::compute(project_uuid, &file.uuid, &source.lines));
        }

        let stats = reconcile(storage.line_hashes(), project_uuid, computed, now)?;
        info!(%stats, "Line hashes persisted");
        ctx.stats.line_hashes = stats;
        Ok(())
    }
}

/// Marks the analysis PROCESSED and last, making the whole result visible.
pub struct EnableAnalysisStep;

impl ComputationStep for EnableAnalysisStep {
    fn description(&self) -> &'static str {
        "Enable analysis"
    }

    fn execute(&self, ctx: &mut TaskContext) -> Result<()> {
        ctx.storage().snapshots().enable(&ctx.analysis.uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentType;
    use crate::pipeline::steps::tree::BuildComponentTreeStep;
    use crate::pipeline::test_context;
    use crate::report::{ReportComponent, ReportDependency, ReportSource};

    fn context() -> TaskContext {
        let mut ctx = test_context();
        ctx.report.components = vec![
            ReportComponent::new(1, ComponentType::Project, "Project").with_children(&[2, 3]),
            ReportComponent::new(2, ComponentType::File, "A.java").with_path("A.java"),
            ReportComponent::new(3, ComponentType::File, "B.java").with_path("B.java"),
        ];
        BuildComponentTreeStep.execute(&mut ctx).unwrap();
        ctx
    }

    #[test]
    fn test_dependency_weights_are_merged() {
        let mut ctx = context();
        ctx.report.dependencies = vec![
            ReportDependency { from_ref: 2, to_ref: 3, weight: 1 },
            ReportDependency { from_ref: 2, to_ref: 3, weight: 2 },
        ];
        PersistFileDependenciesStep.execute(&mut ctx).unwrap();
        assert_eq!(ctx.stats.dependencies.inserted, 1);

        let tree = ctx.tree.get().unwrap();
        let expected = FileDependency::new(
            &tree.root().uuid,
            &tree.get_by_ref(2).unwrap().uuid,
            &tree.get_by_ref(3).unwrap().uuid,
            3,
        );
        let rows = ctx
            .storage()
            .dependencies()
            .select_by_uuids(&[expected.uuid.clone()])
            .unwrap();
        assert_eq!(rows[0].content, expected);
    }

    #[test]
    fn test_dependency_weight_overflow_is_rejected() {
        let mut ctx = context();
        ctx.report.dependencies = vec![
            ReportDependency { from_ref: 2, to_ref: 3, weight: u32::MAX },
            ReportDependency { from_ref: 2, to_ref: 3, weight: 1 },
        ];
        let err = PersistFileDependenciesStep.execute(&mut ctx).unwrap_err();
        assert!(matches!(err, CeError::Report(_)));
        assert!(err.to_string().contains("out of range"));
        assert_eq!(ctx.stats.dependencies.inserted, 0);
    }

    #[test]
    fn test_dependency_on_directory_is_rejected() {
        let mut ctx = context();
        ctx.report.dependencies = vec![ReportDependency { from_ref: 1, to_ref: 3, weight: 1 }];
        let err = PersistFileDependenciesStep.execute(&mut ctx).unwrap_err();
        assert!(matches!(err, CeError::Report(_)));
    }

    #[test]
    fn test_line_hashes_are_inserted() {
        let mut ctx = context();
        ctx.report.sources = vec![ReportSource {
            component_ref: 2,
            lines: vec!["class A {".into(), "".into(), "}".into()],
        }];
        PersistLineHashesStep.execute(&mut ctx).unwrap();
        assert_eq!(ctx.stats.line_hashes.inserted, 1);
    }

    #[test]
    fn test_analysis_is_unprocessed_until_enabled() {
        let mut ctx = context();
        ctx.period.set(None).unwrap();
        PersistAnalysisStep.execute(&mut ctx).unwrap();
        let stored = ctx
            .storage()
            .snapshots()
            .select_by_uuid(&ctx.analysis.uuid)
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, SnapshotStatus::Unprocessed);

        EnableAnalysisStep.execute(&mut ctx).unwrap();
        let stored = ctx
            .storage()
            .snapshots()
            .select_by_uuid(&ctx.analysis.uuid)
            .unwrap()
            .unwrap();
        assert!(stored.is_processed());
        assert!(stored.last);
    }

    #[test]
    fn test_vanished_components_are_disabled() {
        let mut ctx = context();
        PersistComponentsStep.execute(&mut ctx).unwrap();
        assert_eq!(ctx.stats.components, 3);

        let mut next = test_context();
        next.report.components = vec![
            ReportComponent::new(1, ComponentType::Project, "Project").with_children(&[2]),
            ReportComponent::new(2, ComponentType::File, "A.java").with_path("A.java"),
        ];
        next.services.storage = Arc::clone(&ctx.services.storage);
        BuildComponentTreeStep.execute(&mut next).unwrap();
        PersistComponentsStep.execute(&mut next).unwrap();
        assert_eq!(next.stats.disabled_components, 1);

        let b = ctx.storage().components().select_by_key("proj:B.java").unwrap().unwrap();
        assert!(!b.enabled);
        assert_eq!(
            next.tree.get().unwrap().root().uuid,
            ctx.tree.get().unwrap().root().uuid
        );
    }
}
