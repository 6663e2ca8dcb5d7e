use super::engine::numeric_param;
use super::{format_double, ActiveRule, CommonRule, CommonRuleIssue, RuleInput};
use crate::component::Component;
use crate::errors::{CeError, Result};
use crate::metric::keys;

pub const MIN_DENSITY_PARAM: &str = "minimumCommentDensity";

#[derive(Debug, Clone, Copy, Default)]
pub struct CommentDensityRule;

impl CommonRule for CommentDensityRule {
    fn key(&self) -> &'static str {
        "InsufficientCommentDensity"
    }

    fn process_file(
        &self,
        file: &Component,
        active_rule: &ActiveRule,
        input: &RuleInput<'_>,
    ) -> Result<Option<CommonRuleIssue>> {
        let min_density = numeric_param(active_rule, MIN_DENSITY_PARAM)?;
        if min_density < 0.0 {
            return Err(CeError::state(format!(
                "Minimum density of rule [{}] is incorrect. It must be greater than or equal to 0.",
                active_rule.rule_key
            )));
        }
        if min_density.is_nan() || min_density >= 100.0 {
            return Err(CeError::state(format!(
                "Minimum density of rule [{}] is incorrect. It must be strictly less than 100.",
                active_rule.rule_key
            )));
        }

        let Some(density) = input.value(file, keys::COMMENT_LINES_DENSITY)? else {
            return Ok(None);
        };
        let ncloc = input.value(file, keys::NCLOC)?.unwrap_or(0.0);
        if ncloc <= 0.0 || density >= min_density {
            return Ok(None);
        }

        let comments = input.value(file, keys::COMMENT_LINES)?.unwrap_or(0.0);
        let expected = (min_density * ncloc / (100.0 - min_density)).ceil();
        let missing = expected - comments;
        if missing <= 0.0 {
            return Ok(None);
        }
        Ok(Some(CommonRuleIssue {
            effort: missing,
            message: format!(
                "{} more comment lines need to be written to reach the minimum threshold of {}% comment density.",
                missing as i64,
                format_double(min_density)
            ),
        }))
    }
}
