use super::{Issue, IssueStatus, RawIssue};
use crate::component::ComponentTree;
use crate::errors::{CeError, Result};
use std::collections::HashMap;
use uuid::Uuid;

/// Outcome of matching the raw issues of an analysis against the base issues.
#[derive(Debug, Default, Clone)]
pub struct TrackingResult {
    /// Every issue to persist: new, matched and closed ones
    pub issues: Vec<Issue>,
    pub new_count: usize,
    pub matched_count: usize,
    pub closed_count: usize,
}

/// Match raw issues against the open issues of the previous analysis.
///
/// Matching happens per component in three passes with decreasing precision:
/// (rule, line, message), then (rule, message), then (rule, line). A matched
/// issue keeps its key and creation date; base issues left unmatched are closed.
pub fn track(
    tree: &ComponentTree,
    project_uuid: &str,
    raws: &[RawIssue],
    base: &[Issue],
    analysis_date: i64,
) -> Result<TrackingResult> {
    let mut open_base: HashMap<&str, Vec<&Issue>> = HashMap::new();
    for issue in base.iter().filter(|i| i.is_open()) {
        open_base
            .entry(issue.component_uuid.as_str())
            .or_default()
            .push(issue);
    }

    let mut result = TrackingResult::default();
    let mut raw_by_component: Vec<(&str, Vec<&RawIssue>)> = Vec::new();
    for component in tree.pre_order() {
        let on_component: Vec<&RawIssue> = raws
            .iter()
            .filter(|r| r.component_ref == component.reference)
            .collect();
        raw_by_component.push((component.uuid.as_str(), on_component));
    }
    if let Some(raw) = raws.iter().find(|r| tree.get_by_ref(r.component_ref).is_none()) {
        return Err(CeError::report(format!(
            "Issue on unknown component ref {}",
            raw.component_ref
        )));
    }

    for (component_uuid, component_raws) in raw_by_component {
        let candidates = open_base.remove(component_uuid).unwrap_or_default();
        let mut taken = vec![false; candidates.len()];
        let mut matches: Vec<Option<usize>> = vec![None; component_raws.len()];

        let passes: [fn(&RawIssue, &Issue) -> bool; 3] = [
            |r, b| r.rule_key == b.rule_key && r.line == b.line && r.message == b.message,
            |r, b| r.rule_key == b.rule_key && r.message == b.message,
            |r, b| r.rule_key == b.rule_key && r.line.is_some() && r.line == b.line,
        ];
        for same in passes {
            for (i, raw) in component_raws.iter().enumerate() {
                if matches[i].is_some() {
                    continue;
                }
                if let Some(j) = (0..candidates.len()).find(|j| !taken[*j] && same(raw, candidates[*j])) {
                    taken[j] = true;
                    matches[i] = Some(j);
                }
            }
        }

        for (raw, matched) in component_raws.iter().zip(matches) {
            let issue = match matched {
                Some(j) => {
                    result.matched_count += 1;
                    let base = candidates[j];
                    Issue {
                        message: raw.message.clone(),
                        severity: raw.severity,
                        line: raw.line,
                        gap: raw.gap,
                        update_date: if changed(raw, base) { analysis_date } else { base.update_date },
                        ..base.clone()
                    }
                }
                None => {
                    result.new_count += 1;
                    Issue {
                        key: Uuid::new_v4().to_string(),
                        rule_key: raw.rule_key.clone(),
                        project_uuid: project_uuid.to_string(),
                        component_uuid: component_uuid.to_string(),
                        message: raw.message.clone(),
                        severity: raw.severity,
                        line: raw.line,
                        gap: raw.gap,
                        status: IssueStatus::Open,
                        creation_date: analysis_date,
                        update_date: analysis_date,
                        close_date: None,
                    }
                }
            };
            result.issues.push(issue);
        }

        for (j, base) in candidates.into_iter().enumerate() {
            if !taken[j] {
                result.closed_count += 1;
                result.issues.push(close(base, analysis_date));
            }
        }
    }

    // Components that vanished from the report close all their issues.
    let mut vanished: Vec<&Issue> = open_base.into_values().flatten().collect();
    vanished.sort_by(|a, b| a.key.cmp(&b.key));
    for base in vanished {
        result.closed_count += 1;
        result.issues.push(close(base, analysis_date));
    }

    Ok(result)
}

fn changed(raw: &RawIssue, base: &Issue) -> bool {
    raw.message != base.message
        || raw.severity != base.severity
        || raw.line != base.line
        || raw.gap != base.gap
}

fn close(base: &Issue, analysis_date: i64) -> Issue {
    Issue {
        status: IssueStatus::Closed,
        close_date: Some(analysis_date),
        update_date: analysis_date,
        ..base.clone()
    }
}
