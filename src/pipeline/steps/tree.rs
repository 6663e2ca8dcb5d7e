use crate::component::ComponentTreeBuilder;
use crate::errors::Result;
use crate::pipeline::{ComputationStep, TaskContext};
use std::collections::HashMap;
use tracing::debug;

/// Builds the component tree, reusing the uuids of components already known
/// under the same key.
pub struct BuildComponentTreeStep;

impl ComputationStep for BuildComponentTreeStep {
    fn description(&self) -> &'static str {
        "Build tree of components"
    }

    fn execute(&self, ctx: &mut TaskContext) -> Result<()> {
        let project_key = ctx.report.metadata.project_key.clone();
        let components = ctx.storage().components();

        let mut known_uuids = HashMap::new();
        if let Some(project) = components.select_by_key(&project_key)? {
            for row in components.select_by_root(&project.uuid)? {
                known_uuids.insert(row.key, row.uuid);
            }
        }
        debug!(known = known_uuids.len(), "Loaded uuids of known components");

        let tree = ComponentTreeBuilder::new(project_key)
            .with_known_uuids(known_uuids)
            .build(ctx.report.metadata.root_component_ref, &ctx.report.components)?;
        debug!(components = tree.len(), root = %tree.root(), "Component tree built");
        ctx.tree.set(tree)
    }
}
