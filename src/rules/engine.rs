use super::{
    ActiveRule, ActiveRulesHolder, BranchCoverageRule, CommentDensityRule, DuplicatedBlocksRule,
    FailedUnitTestsRule, LineCoverageRule, RuleKey, SkippedUnitTestsRule,
};
use crate::component::Component;
use crate::errors::{CeError, Result};
use crate::issue::RawIssue;
use crate::measure::MeasureRepository;
use crate::metric::MetricRepository;
use tracing::debug;

/// Issue candidate produced by a common rule.
#[derive(Debug, Clone, PartialEq)]
pub struct CommonRuleIssue {
    pub effort: f64,
    pub message: String,
}

/// Read access to the metric catalog and the measures of the task.
#[derive(Clone, Copy)]
pub struct RuleInput<'a> {
    pub metrics: &'a MetricRepository,
    pub measures: &'a MeasureRepository,
}

impl<'a> RuleInput<'a> {
    pub fn new(metrics: &'a MetricRepository, measures: &'a MeasureRepository) -> Self {
        Self { metrics, measures }
    }

    /// Numeric value of a measure of the component, if any.
    pub fn value(&self, component: &Component, metric_key: &str) -> Result<Option<f64>> {
        let metric = self.metrics.get_by_key(metric_key)?;
        Ok(self
            .measures
            .get_raw_measure(component.reference, metric)
            .and_then(|m| m.value.as_f64()))
    }
}

/// A rule computing at most one issue per file from its measures.
///
/// Implementations are stateless: the result only depends on the file, the
/// active rule and the measures.
pub trait CommonRule: Send + Sync {
    /// Rule key inside the `common-<language>` repository.
    fn key(&self) -> &'static str;

    fn process_file(
        &self,
        file: &Component,
        active_rule: &ActiveRule,
        input: &RuleInput<'_>,
    ) -> Result<Option<CommonRuleIssue>>;
}

/// Runs the common rules, in a fixed order, on file components.
pub struct CommonRuleEngine {
    rules: Vec<Box<dyn CommonRule>>,
}

impl Default for CommonRuleEngine {
    fn default() -> Self {
        Self::new(vec![
            Box::new(CommentDensityRule),
            Box::new(LineCoverageRule),
            Box::new(BranchCoverageRule),
            Box::new(DuplicatedBlocksRule),
            Box::new(FailedUnitTestsRule),
            Box::new(SkippedUnitTestsRule),
        ])
    }
}

impl CommonRuleEngine {
    pub fn new(rules: Vec<Box<dyn CommonRule>>) -> Self {
        Self { rules }
    }

    pub fn rule_keys(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.key()).collect()
    }

    pub fn process(
        &self,
        component: &Component,
        active_rules: &ActiveRulesHolder,
        input: &RuleInput<'_>,
    ) -> Result<Vec<RawIssue>> {
        let Some(language) = component.language().filter(|_| component.is_file()) else {
            return Ok(Vec::new());
        };

        let mut issues = Vec::new();
        for rule in &self.rules {
            let rule_key = RuleKey::common(language, rule.key());
            let Some(active_rule) = active_rules.get(&rule_key) else {
                continue;
            };
            if let Some(issue) = rule.process_file(component, active_rule, input)? {
                debug!(rule = %rule_key, component = %component, effort = issue.effort, "Common rule raised an issue");
                issues.push(RawIssue {
                    rule_key,
                    component_ref: component.reference,
                    message: issue.message,
                    severity: active_rule.severity,
                    line: None,
                    gap: Some(issue.effort),
                });
            }
        }
        Ok(issues)
    }
}

/// Required numeric parameter of an active rule.
pub(crate) fn numeric_param(active_rule: &ActiveRule, name: &str) -> Result<f64> {
    let raw = active_rule.param(name).ok_or_else(|| {
        CeError::state(format!(
            "Required parameter [{}] is missing on rule [{}]",
            name, active_rule.rule_key
        ))
    })?;
    raw.trim().parse::<f64>().map_err(|_| {
        CeError::state(format!(
            "Invalid value '{}' for parameter [{}] of rule [{}]",
            raw, name, active_rule.rule_key
        ))
    })
}
