mod common;

use common::{comment_density_rule, sample_report, Harness, DAY, FIRST_ANALYSIS, PROJECT_KEY};
use compute_engine::config::Settings;
use compute_engine::errors::CeError;
use compute_engine::index::IndexDocument;
use compute_engine::issue::filter::EXCLUSION_KEY;
use compute_engine::issue::IssueStatus;
use compute_engine::measure::MeasureValue;
use compute_engine::metric::keys;
use compute_engine::pipeline::TaskContext;
use compute_engine::report::{ReportDependency, ReportValue};
use compute_engine::rules::ActiveRulesHolder;
use compute_engine::storage::{MeasureRow, Storage};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;

fn root_uuid(harness: &Harness) -> String {
    harness
        .storage
        .components()
        .select_by_key(PROJECT_KEY)
        .unwrap()
        .expect("project row")
        .uuid
}

fn stored_measure(harness: &Harness, ctx: &TaskContext, component_key: &str, metric: &str) -> MeasureRow {
    let component = harness
        .storage
        .components()
        .select_by_key(component_key)
        .unwrap()
        .expect("component row");
    let metric_id = ctx.metrics.get_by_key(metric).unwrap().id;
    harness
        .storage
        .measures()
        .select_by_analysis(&ctx.analysis.uuid)
        .unwrap()
        .into_iter()
        .find(|m| m.component_uuid == component.uuid && m.metric_id == metric_id)
        .unwrap_or_else(|| panic!("no {} measure on {}", metric, component_key))
}

#[test]
fn test_first_analysis_persists_everything() {
    let harness = Harness::new(Settings::default(), comment_density_rule("25"));
    let (ctx, outcome) = harness.run(sample_report(FIRST_ANALYSIS, "1.0"));
    outcome.unwrap();

    let root = root_uuid(&harness);
    assert_eq!(harness.storage.components().select_by_root(&root).unwrap().len(), 4);

    let last = harness.storage.snapshots().select_last(&root).unwrap().expect("last analysis");
    assert_eq!(last.uuid, ctx.analysis.uuid);
    assert_eq!(last.version.as_deref(), Some("1.0"));
    assert!(!ctx.period.has_period());

    let density = stored_measure(&harness, &ctx, PROJECT_KEY, keys::COMMENT_LINES_DENSITY);
    assert_eq!(density.value, MeasureValue::Float(20.0));
    let ncloc = stored_measure(&harness, &ctx, PROJECT_KEY, keys::NCLOC);
    assert_eq!(ncloc.value, MeasureValue::Int(120));
    let files = stored_measure(&harness, &ctx, "acme:src", keys::FILES);
    assert_eq!(files.value, MeasureValue::Int(2));

    let issues = harness.storage.issues().select_by_project(&root).unwrap();
    assert_eq!(issues.len(), 3);
    let messages: BTreeSet<String> = issues.iter().map(|i| i.message.clone()).collect();
    assert!(messages.contains(
        "7 more comment lines need to be written to reach the minimum threshold of 25.0% comment density."
    ));
    assert!(messages.contains(
        "4 more comment lines need to be written to reach the minimum threshold of 25.0% comment density."
    ));

    let violations = stored_measure(&harness, &ctx, PROJECT_KEY, keys::VIOLATIONS);
    assert_eq!(violations.value, MeasureValue::Int(3));

    let documents = harness.indexer.documents();
    assert_eq!(documents.len(), 4);
    match harness.indexer.get(&root) {
        Some(IndexDocument::ProjectMeasures { measures, .. }) => {
            assert_eq!(measures.get(keys::NCLOC), Some(&120.0));
        }
        other => panic!("unexpected project document {:?}", other),
    }

    assert_eq!(ctx.stats.dependencies.inserted, 1);
    assert_eq!(ctx.stats.line_hashes.inserted, 2);
}

#[test]
fn test_rerun_of_identical_report_is_stable() {
    let harness = Harness::new(Settings::default(), comment_density_rule("25"));
    let (first, outcome) = harness.run(sample_report(FIRST_ANALYSIS, "1.0"));
    outcome.unwrap();
    let root = root_uuid(&harness);
    let first_keys: BTreeSet<String> = harness
        .storage
        .issues()
        .select_by_project(&root)
        .unwrap()
        .into_iter()
        .map(|i| i.key)
        .collect();

    harness.clock.advance(DAY);
    let (second, outcome) = harness.run(sample_report(FIRST_ANALYSIS + DAY, "1.0"));
    outcome.unwrap();

    assert_eq!(root_uuid(&harness), root);
    assert_eq!(second.stats.dependencies.writes(), 0);
    assert_eq!(second.stats.dependencies.unchanged, 1);
    assert_eq!(second.stats.line_hashes.writes(), 0);
    assert_eq!(second.stats.line_hashes.unchanged, 2);

    let issues = harness.storage.issues().select_by_project(&root).unwrap();
    let second_keys: BTreeSet<String> = issues.iter().map(|i| i.key.clone()).collect();
    assert_eq!(second_keys, first_keys);
    assert!(issues.iter().all(|i| i.status == IssueStatus::Open));

    let period = second.period.period().unwrap().expect("period");
    assert_eq!(period.analysis_uuid, first.analysis.uuid);
    let new_violations = stored_measure(&harness, &second, PROJECT_KEY, keys::NEW_VIOLATIONS);
    assert_eq!(new_violations.value, MeasureValue::Int(0));

    let snapshots = harness.storage.snapshots().select_by_component(&root).unwrap();
    assert_eq!(snapshots.len(), 2);
    let last: Vec<&str> = snapshots.iter().filter(|s| s.last).map(|s| s.uuid.as_str()).collect();
    assert_eq!(last, vec![second.analysis.uuid.as_str()]);
}

#[test]
fn test_variation_against_previous_analysis() {
    let settings = Settings::default().with("ce.newCode.period", "previous_analysis");
    let harness = Harness::new(settings, ActiveRulesHolder::default());
    harness.run(sample_report(FIRST_ANALYSIS, "1.0")).1.unwrap();

    let mut report = sample_report(FIRST_ANALYSIS + DAY, "1.1");
    for measure in &mut report.measures {
        if measure.component_ref == 3 && measure.metric_key == keys::NCLOC {
            measure.value = ReportValue::Int(100);
        }
    }
    let (ctx, outcome) = harness.run(report);
    outcome.unwrap();

    let ncloc = stored_measure(&harness, &ctx, PROJECT_KEY, keys::NCLOC);
    assert_eq!(ncloc.value, MeasureValue::Int(140));
    assert_eq!(ncloc.variation, Some(20.0));
}

#[test]
fn test_excluded_issues_are_not_persisted() {
    let settings = Settings::default()
        .with(EXCLUSION_KEY, "1")
        .with(&format!("{}.1.resourceKey", EXCLUSION_KEY), "**/Bar.java")
        .with(&format!("{}.1.ruleKey", EXCLUSION_KEY), "*");
    let harness = Harness::new(settings, comment_density_rule("25"));
    harness.run(sample_report(FIRST_ANALYSIS, "1.0")).1.unwrap();

    let root = root_uuid(&harness);
    let issues = harness.storage.issues().select_by_project(&root).unwrap();
    assert_eq!(issues.len(), 1);
    assert!(issues[0].message.starts_with("7 more comment lines"));
}

#[test]
fn test_removed_file_is_disabled_and_its_issue_closed() {
    let harness = Harness::new(Settings::default(), ActiveRulesHolder::default());
    harness.run(sample_report(FIRST_ANALYSIS, "1.0")).1.unwrap();

    let mut report = sample_report(FIRST_ANALYSIS + DAY, "1.0");
    report.components[1].children = vec![3];
    report.components.retain(|c| c.reference != 4);
    report.measures.retain(|m| m.component_ref != 4);
    report.issues.clear();
    report.dependencies.clear();
    report.sources.retain(|s| s.component_ref != 4);
    let (ctx, outcome) = harness.run(report);
    outcome.unwrap();

    let bar = harness
        .storage
        .components()
        .select_by_key("acme:src/Bar.java")
        .unwrap()
        .expect("bar row");
    assert!(!bar.enabled);
    assert_eq!(ctx.stats.disabled_components, 1);
    assert_eq!(ctx.stats.dependencies.deleted, 1);
    assert_eq!(ctx.stats.line_hashes.deleted, 1);

    let issues = harness.storage.issues().select_by_project(&root_uuid(&harness)).unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].status, IssueStatus::Closed);
}

#[test]
fn test_failed_step_leaves_no_visible_analysis() {
    let harness = Harness::new(Settings::default(), ActiveRulesHolder::default());
    let mut report = sample_report(FIRST_ANALYSIS, "1.0");
    report.dependencies.push(ReportDependency {
        from_ref: 2,
        to_ref: 4,
        weight: 1,
    });
    let (ctx, outcome) = harness.run(report);

    let err = outcome.unwrap_err();
    assert!(matches!(err, CeError::Step { .. }));
    assert!(matches!(err.root_cause(), CeError::Report(_)));

    let root = root_uuid(&harness);
    assert!(harness.storage.snapshots().select_last(&root).unwrap().is_none());
    let stored = harness
        .storage
        .snapshots()
        .select_by_uuid(&ctx.analysis.uuid)
        .unwrap()
        .expect("unprocessed analysis");
    assert!(!stored.is_processed());
    assert!(harness.indexer.documents().is_empty());
}
