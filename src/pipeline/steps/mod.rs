//! Steps of the report pipeline, in execution order.

pub mod index;
pub mod issues;
pub mod measures;
pub mod period;
pub mod persist;
pub mod tree;

use super::ComputationStep;

pub use index::IndexAnalysisStep;
pub use issues::{
    ComputeIssueMeasuresStep, ExecuteCommonRulesStep, FilterIssuesStep, TrackIssuesStep,
};
pub use measures::{ComputeAggregatesStep, ComputeVariationsStep, LoadMeasuresStep};
pub use period::LoadPeriodStep;
pub use persist::{
    EnableAnalysisStep, PersistAnalysisStep, PersistComponentsStep, PersistFileDependenciesStep,
    PersistIssuesStep, PersistLineHashesStep, PersistMeasuresStep,
};
pub use tree::BuildComponentTreeStep;

/// Steps run for a report task.
///
/// The analysis is inserted UNPROCESSED before measures and issues are
/// written and only enabled once everything else succeeded, so a failed task
/// never exposes a partial analysis.
pub fn report_steps() -> Vec<Box<dyn ComputationStep>> {
    vec![
        Box::new(BuildComponentTreeStep),
        Box::new(LoadMeasuresStep),
        Box::new(LoadPeriodStep),
        Box::new(ComputeAggregatesStep),
        Box::new(ExecuteCommonRulesStep),
        Box::new(FilterIssuesStep),
        Box::new(TrackIssuesStep),
        Box::new(ComputeIssueMeasuresStep),
        Box::new(ComputeVariationsStep),
        Box::new(PersistComponentsStep),
        Box::new(PersistAnalysisStep),
        Box::new(PersistMeasuresStep),
        Box::new(PersistIssuesStep),
        Box::new(PersistFileDependenciesStep),
        Box::new(PersistLineHashesStep),
        Box::new(EnableAnalysisStep),
        Box::new(IndexAnalysisStep),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_steps_order() {
        let descriptions: Vec<&str> = report_steps().iter().map(|s| s.description()).collect();
        assert_eq!(descriptions.len(), 17);
        assert_eq!(descriptions[0], "Build tree of components");
        assert_eq!(descriptions[10], "Persist analysis");
        assert_eq!(descriptions[15], "Enable analysis");
        assert_eq!(descriptions[16], "Index analysis");
    }
}
