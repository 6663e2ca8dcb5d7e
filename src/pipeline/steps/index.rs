use crate::errors::Result;
use crate::index::IndexDocument;
use crate::pipeline::{ComputationStep, TaskContext};
use std::collections::BTreeMap;
use tracing::debug;

/// Pushes the project measures and the issues to the search collaborator.
pub struct IndexAnalysisStep;

impl ComputationStep for IndexAnalysisStep {
    fn description(&self) -> &'static str {
        "Index analysis"
    }

    fn execute(&self, ctx: &mut TaskContext) -> Result<()> {
        let root = ctx.tree.get()?.root();

        let mut measures = BTreeMap::new();
        for (metric_id, measure) in ctx.measures.raw_measures_of(root.reference) {
            if let Some(value) = measure.value.as_f64() {
                measures.insert(ctx.metrics.get_by_id(metric_id)?.key.clone(), value);
            }
        }

        let mut documents = Vec::with_capacity(ctx.issues.len() + 1);
        documents.push(IndexDocument::ProjectMeasures {
            project_uuid: root.uuid.clone(),
            project_key: root.key.clone(),
            analysis_uuid: ctx.analysis.uuid.clone(),
            analysis_date: ctx.analysis.date,
            measures,
        });
        documents.extend(ctx.issues.iter().map(|issue| IndexDocument::Issue {
            key: issue.key.clone(),
            project_uuid: issue.project_uuid.clone(),
            component_uuid: issue.component_uuid.clone(),
            rule_key: issue.rule_key.to_string(),
            severity: issue.severity,
            status: issue.status,
            line: issue.line,
        }));

        debug!(documents = documents.len(), "Indexing analysis");
        ctx.services.indexer.index(documents)
    }
}
