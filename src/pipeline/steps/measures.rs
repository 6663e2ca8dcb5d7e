use crate::component::{Component, ComponentTree};
use crate::errors::{CeError, Result};
use crate::measure::{Measure, MeasureRepository, MeasureValue};
use crate::metric::{keys, MetricRepository};
use crate::pipeline::{ComputationStep, TaskContext};
use std::collections::HashMap;
use tracing::debug;

/// Metrics whose value on a parent is the sum of its children.
const SUMMED_METRICS: &[&str] = &[
    keys::LINES,
    keys::NCLOC,
    keys::FILES,
    keys::FUNCTIONS,
    keys::COMPLEXITY,
    keys::COMMENT_LINES,
    keys::LINES_TO_COVER,
    keys::UNCOVERED_LINES,
    keys::CONDITIONS_TO_COVER,
    keys::UNCOVERED_CONDITIONS,
    keys::DUPLICATED_BLOCKS,
    keys::TESTS,
    keys::TEST_ERRORS,
    keys::TEST_FAILURES,
    keys::SKIPPED_TESTS,
];

pub struct LoadMeasuresStep;

impl ComputationStep for LoadMeasuresStep {
    fn description(&self) -> &'static str {
        "Load measures from report"
    }

    fn execute(&self, ctx: &mut TaskContext) -> Result<()> {
        let tree = ctx.tree.get()?;
        for raw in &ctx.report.measures {
            if tree.get_by_ref(raw.component_ref).is_none() {
                return Err(CeError::report(format!(
                    "Measure '{}' is attached to unknown component ref {}",
                    raw.metric_key, raw.component_ref
                )));
            }
            let metric = ctx.metrics.get_by_key(&raw.metric_key)?;
            let value = MeasureValue::from_report(&raw.value, metric)?;
            ctx.measures
                .load_raw(raw.component_ref, metric, Measure::new(value))?;
        }
        debug!(measures = ctx.measures.len(), "Raw measures loaded");
        Ok(())
    }
}

/// Sums additive metrics bottom-up, then derives densities and coverage
/// ratios on every component that does not carry them already.
pub struct ComputeAggregatesStep;

impl ComputationStep for ComputeAggregatesStep {
    fn description(&self) -> &'static str {
        "Compute aggregated measures"
    }

    fn execute(&self, ctx: &mut TaskContext) -> Result<()> {
        let tree = ctx.tree.get()?;
        let mut computer = Aggregator {
            metrics: &ctx.metrics,
            measures: &mut ctx.measures,
        };
        for component in tree.post_order() {
            if component.is_file() {
                computer.add_if_absent(component, keys::FILES, 1.0)?;
            } else {
                for key in SUMMED_METRICS {
                    computer.sum_children(tree, component, key)?;
                }
            }
            computer.compute_ratios(component)?;
        }
        Ok(())
    }
}

struct Aggregator<'a> {
    metrics: &'a MetricRepository,
    measures: &'a mut MeasureRepository,
}

impl Aggregator<'_> {
    fn value(&self, component: &Component, key: &str) -> Option<f64> {
        let metric = self.metrics.get_by_key(key).ok()?;
        self.measures
            .get_raw_measure(component.reference, metric)
            .and_then(|m| m.value.as_f64())
    }

    fn add_if_absent(&mut self, component: &Component, key: &str, value: f64) -> Result<()> {
        if !self.metrics.contains_key(key) {
            return Ok(());
        }
        let metric = self.metrics.get_by_key(key)?;
        if self.measures.has_measure(component.reference, metric) {
            return Ok(());
        }
        let measure = if metric.value_type.is_integer() {
            Measure::int(value.round() as i64)
        } else {
            Measure::float(round_to(value, metric.decimal_scale.unwrap_or(1)))
        };
        self.measures.add(component.reference, metric, measure)
    }

    fn sum_children(&mut self, tree: &ComponentTree, component: &Component, key: &str) -> Result<()> {
        let values: Vec<f64> = tree
            .children(component)
            .filter_map(|child| self.value(child, key))
            .collect();
        if values.is_empty() {
            return Ok(());
        }
        self.add_if_absent(component, key, values.iter().sum())
    }

    fn compute_ratios(&mut self, component: &Component) -> Result<()> {
        if let (Some(ncloc), Some(comments)) = (
            self.value(component, keys::NCLOC),
            self.value(component, keys::COMMENT_LINES),
        ) {
            if ncloc + comments > 0.0 {
                let density = comments / (ncloc + comments) * 100.0;
                self.add_if_absent(component, keys::COMMENT_LINES_DENSITY, density)?;
            }
        }

        let lines = self.coverage_pair(component, keys::LINES_TO_COVER, keys::UNCOVERED_LINES);
        let conditions =
            self.coverage_pair(component, keys::CONDITIONS_TO_COVER, keys::UNCOVERED_CONDITIONS);
        if let Some((to_cover, uncovered)) = lines.filter(|(t, _)| *t > 0.0) {
            let ratio = (to_cover - uncovered) / to_cover * 100.0;
            self.add_if_absent(component, keys::LINE_COVERAGE, ratio)?;
        }
        if let Some((to_cover, uncovered)) = conditions.filter(|(t, _)| *t > 0.0) {
            let ratio = (to_cover - uncovered) / to_cover * 100.0;
            self.add_if_absent(component, keys::BRANCH_COVERAGE, ratio)?;
        }

        let (lines_total, lines_uncovered) = lines.unwrap_or((0.0, 0.0));
        let (conds_total, conds_uncovered) = conditions.unwrap_or((0.0, 0.0));
        let total = lines_total + conds_total;
        if total > 0.0 {
            let ratio = (total - lines_uncovered - conds_uncovered) / total * 100.0;
            self.add_if_absent(component, keys::COVERAGE, ratio)?;
        }
        Ok(())
    }

    fn coverage_pair(&self, component: &Component, to_cover: &str, uncovered: &str) -> Option<(f64, f64)> {
        let total = self.value(component, to_cover)?;
        Some((total, self.value(component, uncovered).unwrap_or(0.0)))
    }
}

fn round_to(value: f64, scale: u32) -> f64 {
    let factor = 10f64.powi(scale as i32);
    (value * factor).round() / factor
}

/// Attaches to every numeric measure its difference with the measure of the
/// period baseline analysis.
pub struct ComputeVariationsStep;

impl ComputationStep for ComputeVariationsStep {
    fn description(&self) -> &'static str {
        "Compute measure variations"
    }

    fn execute(&self, ctx: &mut TaskContext) -> Result<()> {
        let Some(baseline) = ctx.period.period()?.map(|p| p.analysis_uuid.clone()) else {
            debug!("No period, variations skipped");
            return Ok(());
        };

        let base: HashMap<(String, u32), f64> = ctx
            .storage()
            .measures()
            .select_by_analysis(&baseline)?
            .into_iter()
            .filter_map(|row| {
                row.value
                    .as_f64()
                    .map(|v| ((row.component_uuid, row.metric_id), v))
            })
            .collect();

        let tree = ctx.tree.get()?;
        let mut updated = 0usize;
        for component in tree.pre_order() {
            let variations: Vec<(u32, Measure)> = ctx
                .measures
                .raw_measures_of(component.reference)
                .into_iter()
                .filter_map(|(metric_id, measure)| {
                    let current = measure.value.as_f64()?;
                    let previous = base.get(&(component.uuid.clone(), metric_id))?;
                    Some((metric_id, measure.clone().with_variation(current - previous)))
                })
                .collect();
            for (metric_id, measure) in variations {
                let metric = ctx.metrics.get_by_id(metric_id)?;
                ctx.measures.update(component.reference, metric, measure)?;
                updated += 1;
            }
        }
        debug!(baseline = %baseline, updated, "Variations computed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentType;
    use crate::pipeline::steps::tree::BuildComponentTreeStep;
    use crate::pipeline::test_context;
    use crate::report::{ReportComponent, ReportMeasure, ReportValue};

    fn measure(component_ref: u32, key: &str, value: i64) -> ReportMeasure {
        ReportMeasure {
            component_ref,
            metric_key: key.into(),
            value: ReportValue::Int(value),
        }
    }

    fn context() -> TaskContext {
        let mut ctx = test_context();
        ctx.report.components = vec![
            ReportComponent::new(1, ComponentType::Project, "Project").with_children(&[2]),
            ReportComponent::new(2, ComponentType::Directory, "src")
                .with_path("src")
                .with_children(&[3, 4]),
            ReportComponent::new(3, ComponentType::File, "A.java")
                .with_path("src/A.java")
                .with_language("java"),
            ReportComponent::new(4, ComponentType::File, "B.java")
                .with_path("src/B.java")
                .with_language("java"),
        ];
        ctx.report.measures = vec![
            measure(3, keys::NCLOC, 80),
            measure(3, keys::COMMENT_LINES, 20),
            measure(4, keys::NCLOC, 20),
            measure(3, keys::LINES_TO_COVER, 10),
            measure(3, keys::UNCOVERED_LINES, 5),
        ];
        BuildComponentTreeStep.execute(&mut ctx).unwrap();
        LoadMeasuresStep.execute(&mut ctx).unwrap();
        ctx
    }

    fn value_of(ctx: &TaskContext, component_ref: u32, key: &str) -> Option<f64> {
        let metric = ctx.metrics.get_by_key(key).unwrap();
        ctx.measures
            .get_raw_measure(component_ref, metric)
            .and_then(|m| m.value.as_f64())
    }

    #[test]
    fn test_unknown_metric_fails_the_load() {
        let mut ctx = test_context();
        ctx.report.measures = vec![measure(1, "unknown_metric", 1)];
        BuildComponentTreeStep.execute(&mut ctx).unwrap();
        let err = LoadMeasuresStep.execute(&mut ctx).unwrap_err();
        assert!(err.to_string().contains("unknown_metric"));
    }

    #[test]
    fn test_measure_on_unknown_component_fails() {
        let mut ctx = test_context();
        ctx.report.measures = vec![measure(9, keys::NCLOC, 1)];
        BuildComponentTreeStep.execute(&mut ctx).unwrap();
        assert!(LoadMeasuresStep.execute(&mut ctx).is_err());
    }

    #[test]
    fn test_aggregates_sum_bottom_up() {
        let mut ctx = context();
        ComputeAggregatesStep.execute(&mut ctx).unwrap();
        assert_eq!(value_of(&ctx, 2, keys::NCLOC), Some(100.0));
        assert_eq!(value_of(&ctx, 1, keys::NCLOC), Some(100.0));
        assert_eq!(value_of(&ctx, 1, keys::FILES), Some(2.0));
        assert_eq!(value_of(&ctx, 1, keys::COMMENT_LINES), Some(20.0));
    }

    #[test]
    fn test_ratios_are_derived() {
        let mut ctx = context();
        ComputeAggregatesStep.execute(&mut ctx).unwrap();
        assert_eq!(value_of(&ctx, 3, keys::COMMENT_LINES_DENSITY), Some(20.0));
        assert_eq!(value_of(&ctx, 1, keys::COMMENT_LINES_DENSITY), Some(16.7));
        assert_eq!(value_of(&ctx, 3, keys::LINE_COVERAGE), Some(50.0));
        assert_eq!(value_of(&ctx, 3, keys::COVERAGE), Some(50.0));
        assert_eq!(value_of(&ctx, 4, keys::LINE_COVERAGE), None);
    }

    #[test]
    fn test_no_variation_without_period() {
        let mut ctx = context();
        ctx.period.set(None).unwrap();
        ComputeVariationsStep.execute(&mut ctx).unwrap();
        let metric = ctx.metrics.get_by_key(keys::NCLOC).unwrap();
        assert_eq!(ctx.measures.get_raw_measure(3, metric).unwrap().variation, None);
    }
}
