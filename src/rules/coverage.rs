use super::engine::numeric_param;
use super::{format_double, ActiveRule, CommonRule, CommonRuleIssue, RuleInput};
use crate::component::Component;
use crate::errors::{CeError, Result};
use crate::metric::keys;

/// Measures and wording of one flavour of coverage rule.
struct CoverageKind {
    rule_key: &'static str,
    param: &'static str,
    coverage_metric: &'static str,
    to_cover_metric: &'static str,
    uncovered_metric: &'static str,
    unit: &'static str,
    label: &'static str,
}

const LINES: CoverageKind = CoverageKind {
    rule_key: "InsufficientLineCoverage",
    param: "minimumLineCoverageRatio",
    coverage_metric: keys::LINE_COVERAGE,
    to_cover_metric: keys::LINES_TO_COVER,
    uncovered_metric: keys::UNCOVERED_LINES,
    unit: "lines of code",
    label: "lines coverage",
};

const BRANCHES: CoverageKind = CoverageKind {
    rule_key: "InsufficientBranchCoverage",
    param: "minimumBranchCoverageRatio",
    coverage_metric: keys::BRANCH_COVERAGE,
    to_cover_metric: keys::CONDITIONS_TO_COVER,
    uncovered_metric: keys::UNCOVERED_CONDITIONS,
    unit: "branches",
    label: "branch coverage",
};

#[derive(Debug, Clone, Copy, Default)]
pub struct LineCoverageRule;

#[derive(Debug, Clone, Copy, Default)]
pub struct BranchCoverageRule;

impl CommonRule for LineCoverageRule {
    fn key(&self) -> &'static str {
        LINES.rule_key
    }

    fn process_file(
        &self,
        file: &Component,
        active_rule: &ActiveRule,
        input: &RuleInput<'_>,
    ) -> Result<Option<CommonRuleIssue>> {
        process(&LINES, file, active_rule, input)
    }
}

impl CommonRule for BranchCoverageRule {
    fn key(&self) -> &'static str {
        BRANCHES.rule_key
    }

    fn process_file(
        &self,
        file: &Component,
        active_rule: &ActiveRule,
        input: &RuleInput<'_>,
    ) -> Result<Option<CommonRuleIssue>> {
        process(&BRANCHES, file, active_rule, input)
    }
}

fn process(
    kind: &CoverageKind,
    file: &Component,
    active_rule: &ActiveRule,
    input: &RuleInput<'_>,
) -> Result<Option<CommonRuleIssue>> {
    if file.is_unit_test() {
        return Ok(None);
    }
    let min_coverage = numeric_param(active_rule, kind.param)?;
    if !(0.0..=100.0).contains(&min_coverage) {
        return Err(CeError::state(format!(
            "Minimum coverage of rule [{}] is incorrect. It must be between 0 and 100.",
            active_rule.rule_key
        )));
    }

    let Some(coverage) = input.value(file, kind.coverage_metric)? else {
        return Ok(None);
    };
    if coverage >= min_coverage {
        return Ok(None);
    }
    let to_cover = input.value(file, kind.to_cover_metric)?.unwrap_or(0.0);
    let uncovered = input.value(file, kind.uncovered_metric)?.unwrap_or(0.0);
    let covered = to_cover - uncovered;
    let missing = (min_coverage * to_cover / 100.0 - covered).ceil();
    if missing <= 0.0 {
        return Ok(None);
    }
    Ok(Some(CommonRuleIssue {
        effort: missing,
        message: format!(
            "{} more {} need to be covered by tests to reach the minimum threshold of {}% {}.",
            missing as i64,
            kind.unit,
            format_double(min_coverage),
            kind.label
        ),
    }))
}
