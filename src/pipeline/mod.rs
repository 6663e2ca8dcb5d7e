//! Report computation pipeline.
//!
//! A submitted report goes through a fixed, ordered list of
//! [`ComputationStep`]s run by the [`StepExecutor`] against one
//! [`TaskContext`]: the tree is built, measures and issues are computed, then
//! everything is persisted and indexed.

pub mod context;
pub mod executor;
pub mod step;
pub mod steps;

pub use context::{AnalysisMetadata, CeServices, ComponentTreeHolder, PersistStats, TaskContext};
pub use executor::{ExecutorState, StepExecutor, StepTiming};
pub use step::ComputationStep;
pub use steps::report_steps;

#[cfg(test)]
pub(crate) fn test_services() -> CeServices {
    use crate::clock::FixedClock;
    use crate::config::Settings;
    use crate::index::MemoryIndexer;
    use crate::rules::ActiveRulesHolder;
    use crate::storage::InMemoryStorage;
    use std::sync::Arc;

    CeServices {
        storage: Arc::new(InMemoryStorage::new()),
        indexer: Arc::new(MemoryIndexer::new()),
        clock: Arc::new(FixedClock::new(1_000)),
        settings: Arc::new(Settings::default()),
        active_rules: Arc::new(ActiveRulesHolder::default()),
    }
}

#[cfg(test)]
pub(crate) fn test_task(component_key: &str) -> crate::queue::Task {
    use crate::queue::{Task, TaskStatus, TaskType};

    Task {
        uuid: "task-1".into(),
        task_type: TaskType::Report,
        component_key: component_key.into(),
        component_uuid: None,
        branch: None,
        submitter: None,
        status: TaskStatus::InProgress,
        worker_uuid: Some("worker-1".into()),
        execution_count: 1,
        submitted_at: 0,
        started_at: Some(0),
    }
}

#[cfg(test)]
pub(crate) fn test_context() -> TaskContext {
    use crate::component::ComponentType;
    use crate::report::{ReportComponent, ReportMetadata, ScannerReport};

    let report = ScannerReport {
        metadata: ReportMetadata {
            project_key: "proj".into(),
            branch: None,
            analysis_date: 1_000,
            project_version: None,
            root_component_ref: 1,
        },
        components: vec![ReportComponent::new(1, ComponentType::Project, "Project")],
        measures: Vec::new(),
        issues: Vec::new(),
        dependencies: Vec::new(),
        sources: Vec::new(),
    };
    TaskContext::new(test_task("proj"), report, test_services()).expect("context")
}
