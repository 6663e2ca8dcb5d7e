// Shared fixtures for compute engine integration tests
#![allow(dead_code)]

use compute_engine::clock::FixedClock;
use compute_engine::component::ComponentType;
use compute_engine::config::Settings;
use compute_engine::errors::Result;
use compute_engine::index::MemoryIndexer;
use compute_engine::pipeline::{report_steps, CeServices, StepExecutor, TaskContext};
use compute_engine::queue::{Task, TaskStatus, TaskType};
use compute_engine::report::{
    ReportComponent, ReportDependency, ReportIssue, ReportMeasure, ReportMetadata, ReportSource,
    ReportValue, ScannerReport,
};
use compute_engine::rules::{ActiveRule, ActiveRulesHolder, RuleKey};
use compute_engine::issue::Severity;
use compute_engine::storage::InMemoryStorage;
use std::sync::Arc;

pub const PROJECT_KEY: &str = "acme";
pub const DAY: i64 = 24 * 60 * 60 * 1000;
pub const FIRST_ANALYSIS: i64 = 1_700_000_000_000;

/// Everything a pipeline run needs, with handles kept for assertions.
pub struct Harness {
    pub storage: Arc<InMemoryStorage>,
    pub indexer: Arc<MemoryIndexer>,
    pub clock: Arc<FixedClock>,
    pub services: CeServices,
}

impl Harness {
    pub fn new(settings: Settings, rules: ActiveRulesHolder) -> Self {
        let storage = Arc::new(InMemoryStorage::new());
        let indexer = Arc::new(MemoryIndexer::new());
        let clock = Arc::new(FixedClock::new(FIRST_ANALYSIS));
        let services = CeServices {
            storage: storage.clone(),
            indexer: indexer.clone(),
            clock: clock.clone(),
            settings: Arc::new(settings),
            active_rules: Arc::new(rules),
        };
        Self {
            storage,
            indexer,
            clock,
            services,
        }
    }

    /// Run every report step; the context is returned even when a step fails.
    pub fn run(&self, report: ScannerReport) -> (TaskContext, Result<()>) {
        let mut ctx = TaskContext::new(task(PROJECT_KEY), report, self.services.clone())
            .expect("task context");
        let outcome = StepExecutor::new(report_steps())
            .execute(&mut ctx)
            .map(|_| ());
        (ctx, outcome)
    }
}

pub fn task(component_key: &str) -> Task {
    Task {
        uuid: "task".into(),
        task_type: TaskType::Report,
        component_key: component_key.into(),
        component_uuid: None,
        branch: None,
        submitter: None,
        status: TaskStatus::InProgress,
        worker_uuid: Some("worker".into()),
        execution_count: 1,
        submitted_at: 0,
        started_at: Some(0),
    }
}

pub fn comment_density_rule(min_density: &str) -> ActiveRulesHolder {
    ActiveRulesHolder::new([ActiveRule::new(
        RuleKey::common("java", "InsufficientCommentDensity"),
        Severity::Critical,
    )
    .with_param("minimumCommentDensity", min_density)])
}

fn int(component_ref: u32, metric_key: &str, value: i64) -> ReportMeasure {
    ReportMeasure {
        component_ref,
        metric_key: metric_key.into(),
        value: ReportValue::Int(value),
    }
}

/// Project (1) > src (2) > Foo.java (3), Bar.java (4).
///
/// Foo has 80 ncloc and 20 comment lines, Bar 40 ncloc and 10 comment lines,
/// Foo depends on Bar and Bar carries one scanner issue.
pub fn sample_report(analysis_date: i64, version: &str) -> ScannerReport {
    ScannerReport {
        metadata: ReportMetadata {
            project_key: PROJECT_KEY.into(),
            branch: None,
            analysis_date,
            project_version: Some(version.into()),
            root_component_ref: 1,
        },
        components: vec![
            ReportComponent::new(1, ComponentType::Project, "Acme").with_children(&[2]),
            ReportComponent::new(2, ComponentType::Directory, "src")
                .with_path("src")
                .with_children(&[3, 4]),
            ReportComponent::new(3, ComponentType::File, "Foo.java")
                .with_path("src/Foo.java")
                .with_language("java"),
            ReportComponent::new(4, ComponentType::File, "Bar.java")
                .with_path("src/Bar.java")
                .with_language("java"),
        ],
        measures: vec![
            int(3, "ncloc", 80),
            int(3, "comment_lines", 20),
            int(4, "ncloc", 40),
            int(4, "comment_lines", 10),
        ],
        issues: vec![ReportIssue {
            component_ref: 4,
            rule_key: "squid:S1135".into(),
            message: "Complete the task associated to this TODO comment.".into(),
            line: Some(12),
            severity: Some(Severity::Info),
            gap: None,
        }],
        dependencies: vec![ReportDependency {
            from_ref: 3,
            to_ref: 4,
            weight: 2,
        }],
        sources: vec![
            ReportSource {
                component_ref: 3,
                lines: vec!["class Foo {".into(), "}".into()],
            },
            ReportSource {
                component_ref: 4,
                lines: vec!["class Bar {".into(), "  // TODO".into(), "}".into()],
            },
        ],
    }
}
