//! Per-task state shared by the computation steps.

use crate::clock::Clock;
use crate::component::ComponentTree;
use crate::config::Settings;
use crate::errors::{CeError, Result};
use crate::index::SearchIndexer;
use crate::issue::{Issue, RawIssue};
use crate::measure::MeasureRepository;
use crate::metric::MetricRepository;
use crate::period::PeriodHolder;
use crate::persist::DiffStats;
use crate::queue::Task;
use crate::report::ScannerReport;
use crate::rules::{ActiveRulesHolder, CommonRuleEngine};
use crate::storage::Storage;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use uuid::Uuid;

/// Collaborators shared by every task of the process.
#[derive(Clone)]
pub struct CeServices {
    pub storage: Arc<dyn Storage>,
    pub indexer: Arc<dyn SearchIndexer>,
    pub clock: Arc<dyn Clock>,
    pub settings: Arc<Settings>,
    pub active_rules: Arc<ActiveRulesHolder>,
}

/// Write-once holder of the component tree.
#[derive(Debug, Default)]
pub struct ComponentTreeHolder {
    tree: OnceCell<ComponentTree>,
}

impl ComponentTreeHolder {
    pub fn set(&self, tree: ComponentTree) -> Result<()> {
        self.tree
            .set(tree)
            .map_err(|_| CeError::state("Component tree has already been built"))
    }

    pub fn get(&self) -> Result<&ComponentTree> {
        self.tree
            .get()
            .ok_or_else(|| CeError::state("Component tree has not been built yet"))
    }

    pub fn is_built(&self) -> bool {
        self.tree.get().is_some()
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisMetadata {
    /// Uuid of the analysis being computed
    pub uuid: String,
    pub date: i64,
    pub project_key: String,
    pub version: Option<String>,
}

/// What the persistence steps wrote.
#[derive(Debug, Clone, Default)]
pub struct PersistStats {
    pub components: usize,
    pub disabled_components: usize,
    pub measures: usize,
    pub issues: usize,
    pub dependencies: DiffStats,
    pub line_hashes: DiffStats,
}

/// Everything one task works on.
///
/// Built by the worker before the steps run and dropped with the task. Fields
/// are public so steps can borrow disjoint parts at the same time (the rule
/// engine reads measures while issues are appended).
pub struct TaskContext {
    pub task: Task,
    pub report: ScannerReport,
    pub services: CeServices,
    /// Settings with the overrides of the analysed project applied
    pub settings: Settings,
    pub metrics: MetricRepository,
    pub rule_engine: CommonRuleEngine,
    pub analysis: AnalysisMetadata,
    pub tree: ComponentTreeHolder,
    pub measures: MeasureRepository,
    pub period: PeriodHolder,
    pub raw_issues: Vec<RawIssue>,
    pub issues: Vec<Issue>,
    pub stats: PersistStats,
}

impl TaskContext {
    pub fn new(task: Task, report: ScannerReport, services: CeServices) -> Result<Self> {
        let metrics = MetricRepository::new(services.storage.metrics().select_all()?);
        let settings = services.settings.for_component(&report.metadata.project_key);
        let analysis = AnalysisMetadata {
            uuid: Uuid::new_v4().to_string(),
            date: report.metadata.analysis_date,
            project_key: report.metadata.project_key.clone(),
            version: report.metadata.project_version.clone(),
        };
        Ok(Self {
            task,
            report,
            services,
            settings,
            metrics,
            rule_engine: CommonRuleEngine::default(),
            analysis,
            tree: ComponentTreeHolder::default(),
            measures: MeasureRepository::new(),
            period: PeriodHolder::new(),
            raw_issues: Vec::new(),
            issues: Vec::new(),
            stats: PersistStats::default(),
        })
    }

    pub fn storage(&self) -> &dyn Storage {
        self.services.storage.as_ref()
    }

    pub fn now(&self) -> i64 {
        self.services.clock.now_millis()
    }
}
