use crate::component::ComponentId;
use crate::errors::{CeError, Result};
use crate::issue::{track, IssueFilter, RawIssue};
use crate::measure::Measure;
use crate::metric::keys;
use crate::pipeline::{ComputationStep, TaskContext};
use crate::rules::{RuleInput, RuleKey};
use std::collections::HashMap;
use tracing::{debug, info};

/// Reads the issues of the report and runs the common rules on every file.
pub struct ExecuteCommonRulesStep;

impl ComputationStep for ExecuteCommonRulesStep {
    fn description(&self) -> &'static str {
        "Load report issues and execute common rules"
    }

    fn execute(&self, ctx: &mut TaskContext) -> Result<()> {
        let tree = ctx.tree.get()?;
        let active_rules = ctx.services.active_rules.as_ref();
        let mut raws = Vec::with_capacity(ctx.report.issues.len());

        for issue in &ctx.report.issues {
            let component = tree.get_by_ref(issue.component_ref).ok_or_else(|| {
                CeError::report(format!(
                    "Issue is attached to unknown component ref {}",
                    issue.component_ref
                ))
            })?;
            let rule_key: RuleKey = issue.rule_key.parse().map_err(|_| {
                CeError::report(format!(
                    "Issue on {} has an invalid rule key '{}'",
                    component, issue.rule_key
                ))
            })?;
            let severity = issue
                .severity
                .or_else(|| active_rules.get(&rule_key).map(|r| r.severity))
                .unwrap_or_default();
            raws.push(RawIssue {
                rule_key,
                component_ref: component.reference,
                message: issue.message.clone(),
                severity,
                line: issue.line,
                gap: issue.gap,
            });
        }
        let reported = raws.len();

        let input = RuleInput::new(&ctx.metrics, &ctx.measures);
        for file in tree.pre_order().into_iter().filter(|c| c.is_file()) {
            raws.extend(ctx.rule_engine.process(file, active_rules, &input)?);
        }
        debug!(
            reported,
            common = raws.len() - reported,
            "Raw issues collected"
        );
        ctx.raw_issues.extend(raws);
        Ok(())
    }
}

/// Applies the exclusion and inclusion patterns of the project settings.
pub struct FilterIssuesStep;

impl ComputationStep for FilterIssuesStep {
    fn description(&self) -> &'static str {
        "Filter issues"
    }

    fn execute(&self, ctx: &mut TaskContext) -> Result<()> {
        let filter = IssueFilter::from_settings(&ctx.settings)?;
        let tree = ctx.tree.get()?;
        let before = ctx.raw_issues.len();
        ctx.raw_issues.retain(|raw| {
            tree.get_by_ref(raw.component_ref)
                .map_or(true, |component| filter.accept(&raw.rule_key, component))
        });
        debug!(removed = before - ctx.raw_issues.len(), "Issues filtered");
        Ok(())
    }
}

/// Matches raw issues with the issues of the previous analysis.
pub struct TrackIssuesStep;

impl ComputationStep for TrackIssuesStep {
    fn description(&self) -> &'static str {
        "Track issues against previous analysis"
    }

    fn execute(&self, ctx: &mut TaskContext) -> Result<()> {
        let tree = ctx.tree.get()?;
        let project_uuid = tree.root().uuid.as_str();
        let base = ctx.storage().issues().select_by_project(project_uuid)?;
        let result = track(tree, project_uuid, &ctx.raw_issues, &base, ctx.analysis.date)?;
        info!(
            new = result.new_count,
            matched = result.matched_count,
            closed = result.closed_count,
            "Issues tracked"
        );
        ctx.issues = result.issues;
        Ok(())
    }
}

/// Counts open issues per component, and the ones created during the
/// period when there is one.
pub struct ComputeIssueMeasuresStep;

impl ComputationStep for ComputeIssueMeasuresStep {
    fn description(&self) -> &'static str {
        "Compute issue measures"
    }

    fn execute(&self, ctx: &mut TaskContext) -> Result<()> {
        let tree = ctx.tree.get()?;
        let new_since = ctx.period.period()?.map(|p| p.snapshot_date);

        // (open, new) per component uuid
        let mut own: HashMap<&str, (i64, i64)> = HashMap::new();
        for issue in ctx.issues.iter().filter(|i| i.is_open()) {
            let counts = own.entry(issue.component_uuid.as_str()).or_default();
            counts.0 += 1;
            if new_since.is_some_and(|date| issue.creation_date > date) {
                counts.1 += 1;
            }
        }

        let violations = ctx.metrics.get_by_key(keys::VIOLATIONS)?;
        let new_violations = match new_since {
            Some(_) => Some(ctx.metrics.get_by_key(keys::NEW_VIOLATIONS)?),
            None => None,
        };

        let mut totals: HashMap<ComponentId, (i64, i64)> = HashMap::with_capacity(tree.len());
        for component in tree.post_order() {
            let mut total = own.get(component.uuid.as_str()).copied().unwrap_or_default();
            for child in tree.children(component) {
                if let Some((open, new)) = totals.get(&child.id()) {
                    total.0 += open;
                    total.1 += new;
                }
            }
            totals.insert(component.id(), total);

            ctx.measures
                .add(component.reference, violations, Measure::int(total.0))?;
            if let Some(metric) = new_violations {
                ctx.measures
                    .add(component.reference, metric, Measure::int(total.1))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentType;
    use crate::config::Settings;
    use crate::issue::filter::EXCLUSION_KEY;
    use crate::issue::Severity;
    use crate::pipeline::steps::measures::{ComputeAggregatesStep, LoadMeasuresStep};
    use crate::pipeline::steps::tree::BuildComponentTreeStep;
    use crate::pipeline::{test_services, test_task, TaskContext};
    use crate::report::{ReportComponent, ReportIssue, ReportMeasure, ReportMetadata, ReportValue, ScannerReport};
    use crate::rules::{ActiveRule, ActiveRulesHolder};
    use std::sync::Arc;

    fn report() -> ScannerReport {
        ScannerReport {
            metadata: ReportMetadata {
                project_key: "proj".into(),
                branch: None,
                analysis_date: 5_000,
                project_version: None,
                root_component_ref: 1,
            },
            components: vec![
                ReportComponent::new(1, ComponentType::Project, "Project").with_children(&[2, 3]),
                ReportComponent::new(2, ComponentType::File, "A.java")
                    .with_path("src/A.java")
                    .with_language("java"),
                ReportComponent::new(3, ComponentType::File, "Gen.java")
                    .with_path("generated/Gen.java")
                    .with_language("java"),
            ],
            measures: vec![
                ReportMeasure {
                    component_ref: 2,
                    metric_key: keys::DUPLICATED_BLOCKS.into(),
                    value: ReportValue::Int(3),
                },
            ],
            issues: vec![
                ReportIssue {
                    component_ref: 2,
                    rule_key: "java:S100".into(),
                    message: "Rename this method".into(),
                    line: Some(4),
                    severity: Some(Severity::Minor),
                    gap: None,
                },
                ReportIssue {
                    component_ref: 3,
                    rule_key: "java:S100".into(),
                    message: "Rename this method".into(),
                    line: Some(9),
                    severity: None,
                    gap: None,
                },
            ],
            dependencies: Vec::new(),
            sources: Vec::new(),
        }
    }

    fn context(settings: Settings) -> TaskContext {
        let mut services = test_services();
        services.settings = Arc::new(settings);
        services.active_rules = Arc::new(ActiveRulesHolder::new([ActiveRule::new(
            RuleKey::common("java", "DuplicatedBlocks"),
            Severity::Critical,
        )]));
        let mut ctx = TaskContext::new(test_task("proj"), report(), services).unwrap();
        BuildComponentTreeStep.execute(&mut ctx).unwrap();
        LoadMeasuresStep.execute(&mut ctx).unwrap();
        ComputeAggregatesStep.execute(&mut ctx).unwrap();
        ctx
    }

    #[test]
    fn test_report_and_common_rule_issues_are_collected() {
        let mut ctx = context(Settings::default());
        ExecuteCommonRulesStep.execute(&mut ctx).unwrap();
        assert_eq!(ctx.raw_issues.len(), 3);
        let common = &ctx.raw_issues[2];
        assert_eq!(common.rule_key.to_string(), "common-java:DuplicatedBlocks");
        assert_eq!(common.severity, Severity::Critical);
        assert_eq!(common.gap, Some(3.0));
        assert_eq!(common.message, "3 duplicated blocks of code must be removed.");
        assert_eq!(ctx.raw_issues[1].severity, Severity::Major);
    }

    #[test]
    fn test_invalid_rule_key_is_a_report_error() {
        let mut ctx = context(Settings::default());
        ctx.report.issues[0].rule_key = "no-separator".into();
        let err = ExecuteCommonRulesStep.execute(&mut ctx).unwrap_err();
        assert!(matches!(err, CeError::Report(_)));
    }

    #[test]
    fn test_filter_drops_excluded_issues() {
        let settings = Settings::default()
            .with(EXCLUSION_KEY, "1")
            .with(&format!("{EXCLUSION_KEY}.1.resourceKey"), "generated/**")
            .with(&format!("{EXCLUSION_KEY}.1.ruleKey"), "*");
        let mut ctx = context(settings);
        ExecuteCommonRulesStep.execute(&mut ctx).unwrap();
        FilterIssuesStep.execute(&mut ctx).unwrap();
        assert!(ctx.raw_issues.iter().all(|i| i.component_ref == 2));
        assert_eq!(ctx.raw_issues.len(), 2);
    }

    #[test]
    fn test_issue_measures_are_aggregated() {
        let mut ctx = context(Settings::default());
        ctx.period.set(None).unwrap();
        ExecuteCommonRulesStep.execute(&mut ctx).unwrap();
        TrackIssuesStep.execute(&mut ctx).unwrap();
        assert_eq!(ctx.issues.len(), 3);
        ComputeIssueMeasuresStep.execute(&mut ctx).unwrap();

        let violations = ctx.metrics.get_by_key(keys::VIOLATIONS).unwrap();
        let on = |r: u32| ctx.measures.get_raw_measure(r, violations).unwrap().value.as_i64();
        assert_eq!(on(1), Some(3));
        assert_eq!(on(2), Some(2));
        assert_eq!(on(3), Some(1));
        let new_violations = ctx.metrics.get_by_key(keys::NEW_VIOLATIONS).unwrap();
        assert!(ctx.measures.get_raw_measure(1, new_violations).is_none());
    }
}
