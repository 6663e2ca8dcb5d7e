//! Metric catalog.
//!
//! Metrics are loaded once per task from the storage catalog into a
//! [`MetricRepository`] and never mutated afterwards.

use crate::errors::{CeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    Int,
    Float,
    Percent,
    Bool,
    Millisec,
    Rating,
    WorkDur,
    String,
    Data,
    Distrib,
    Level,
}

impl ValueType {
    /// Whether values of this type are stored as integers
    pub fn is_integer(self) -> bool {
        matches!(self, Self::Int | Self::Millisec | Self::Rating | Self::WorkDur)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || matches!(self, Self::Float | Self::Percent)
    }

    pub fn is_textual(self) -> bool {
        matches!(self, Self::String | Self::Data | Self::Distrib | Self::Level)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: u32,
    pub key: String,
    pub name: String,
    pub value_type: ValueType,
    #[serde(default)]
    pub decimal_scale: Option<u32>,
    #[serde(default)]
    pub best_value: Option<f64>,
    #[serde(default)]
    pub worst_value: Option<f64>,
    #[serde(default)]
    pub optimized_best_value: bool,
}

impl Metric {
    pub fn new(id: u32, key: &str, name: &str, value_type: ValueType) -> Self {
        Self {
            id,
            key: key.to_string(),
            name: name.to_string(),
            value_type,
            decimal_scale: matches!(value_type, ValueType::Float | ValueType::Percent).then_some(1),
            best_value: None,
            worst_value: None,
            optimized_best_value: false,
        }
    }

    fn best(mut self, best: f64, worst: Option<f64>) -> Self {
        self.best_value = Some(best);
        self.worst_value = worst;
        self.optimized_best_value = true;
        self
    }
}

/// Keys of the metrics the built-in steps and rules rely on.
pub mod keys {
    pub const LINES: &str = "lines";
    pub const NCLOC: &str = "ncloc";
    pub const FILES: &str = "files";
    pub const FUNCTIONS: &str = "functions";
    pub const COMPLEXITY: &str = "complexity";
    pub const COMMENT_LINES: &str = "comment_lines";
    pub const COMMENT_LINES_DENSITY: &str = "comment_lines_density";
    pub const COVERAGE: &str = "coverage";
    pub const LINE_COVERAGE: &str = "line_coverage";
    pub const BRANCH_COVERAGE: &str = "branch_coverage";
    pub const LINES_TO_COVER: &str = "lines_to_cover";
    pub const UNCOVERED_LINES: &str = "uncovered_lines";
    pub const CONDITIONS_TO_COVER: &str = "conditions_to_cover";
    pub const UNCOVERED_CONDITIONS: &str = "uncovered_conditions";
    pub const DUPLICATED_BLOCKS: &str = "duplicated_blocks";
    pub const TESTS: &str = "tests";
    pub const TEST_ERRORS: &str = "test_errors";
    pub const TEST_FAILURES: &str = "test_failures";
    pub const SKIPPED_TESTS: &str = "skipped_tests";
    pub const VIOLATIONS: &str = "violations";
    pub const NEW_VIOLATIONS: &str = "new_violations";
}

/// The catalog every fresh storage starts with.
pub fn core_metrics() -> Vec<Metric> {
    use keys::*;
    use ValueType::*;
    vec![
        Metric::new(1, LINES, "Lines", Int),
        Metric::new(2, NCLOC, "Lines of Code", Int),
        Metric::new(3, FILES, "Files", Int),
        Metric::new(4, FUNCTIONS, "Functions", Int),
        Metric::new(5, COMPLEXITY, "Cyclomatic Complexity", Int),
        Metric::new(6, COMMENT_LINES, "Comment Lines", Int),
        Metric::new(7, COMMENT_LINES_DENSITY, "Comments (%)", Percent).best(100.0, Some(0.0)),
        Metric::new(8, COVERAGE, "Coverage", Percent).best(100.0, Some(0.0)),
        Metric::new(9, LINE_COVERAGE, "Line Coverage", Percent).best(100.0, Some(0.0)),
        Metric::new(10, BRANCH_COVERAGE, "Condition Coverage", Percent).best(100.0, Some(0.0)),
        Metric::new(11, LINES_TO_COVER, "Lines to Cover", Int),
        Metric::new(12, UNCOVERED_LINES, "Uncovered Lines", Int).best(0.0, None),
        Metric::new(13, CONDITIONS_TO_COVER, "Conditions to Cover", Int),
        Metric::new(14, UNCOVERED_CONDITIONS, "Uncovered Conditions", Int).best(0.0, None),
        Metric::new(15, DUPLICATED_BLOCKS, "Duplicated Blocks", Int).best(0.0, None),
        Metric::new(16, TESTS, "Unit Tests", Int),
        Metric::new(17, TEST_ERRORS, "Unit Test Errors", Int).best(0.0, None),
        Metric::new(18, TEST_FAILURES, "Unit Test Failures", Int).best(0.0, None),
        Metric::new(19, SKIPPED_TESTS, "Skipped Unit Tests", Int).best(0.0, None),
        Metric::new(20, VIOLATIONS, "Issues", Int).best(0.0, None),
        Metric::new(21, NEW_VIOLATIONS, "New Issues", Int).best(0.0, None),
    ]
}

/// Read-only view over the metric catalog of one task.
#[derive(Debug, Clone, Default)]
pub struct MetricRepository {
    metrics: Vec<Metric>,
    by_key: HashMap<String, usize>,
    by_id: HashMap<u32, usize>,
}

impl MetricRepository {
    pub fn new(metrics: Vec<Metric>) -> Self {
        let by_key = metrics
            .iter()
            .enumerate()
            .map(|(i, m)| (m.key.clone(), i))
            .collect();
        let by_id = metrics.iter().enumerate().map(|(i, m)| (m.id, i)).collect();
        Self {
            metrics,
            by_key,
            by_id,
        }
    }

    /// Unknown keys are catalog defects, not data conditions.
    pub fn get_by_key(&self, key: &str) -> Result<&Metric> {
        self.by_key
            .get(key)
            .map(|i| &self.metrics[*i])
            .ok_or_else(|| CeError::state(format!("Metric with key '{}' does not exist", key)))
    }

    pub fn get_by_id(&self, id: u32) -> Result<&Metric> {
        self.by_id
            .get(&id)
            .map(|i| &self.metrics[*i])
            .ok_or_else(|| CeError::state(format!("Metric with id '{}' does not exist", id)))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn all(&self) -> &[Metric] {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_key_and_id() {
        let repo = MetricRepository::new(core_metrics());
        let ncloc = repo.get_by_key(keys::NCLOC).unwrap();
        assert_eq!(repo.get_by_id(ncloc.id).unwrap().key, "ncloc");
        assert_eq!(ncloc.value_type, ValueType::Int);
    }

    #[test]
    fn test_unknown_metric_fails_with_state_error() {
        let repo = MetricRepository::new(core_metrics());
        let err = repo.get_by_key("does_not_exist").unwrap_err();
        assert!(matches!(err, CeError::State(_)));
        assert!(err.to_string().contains("does_not_exist"));
        assert!(repo.get_by_id(9999).is_err());
    }

    #[test]
    fn test_core_metric_keys_are_unique() {
        let metrics = core_metrics();
        let repo = MetricRepository::new(metrics.clone());
        assert_eq!(repo.all().len(), metrics.len());
        for metric in &metrics {
            assert_eq!(repo.get_by_key(&metric.key).unwrap().id, metric.id);
        }
    }
}
