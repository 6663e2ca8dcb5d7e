use super::{ActiveRule, CommonRule, CommonRuleIssue, RuleInput};
use crate::component::Component;
use crate::errors::Result;
use crate::metric::keys;

#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicatedBlocksRule;

impl CommonRule for DuplicatedBlocksRule {
    fn key(&self) -> &'static str {
        "DuplicatedBlocks"
    }

    fn process_file(
        &self,
        file: &Component,
        _active_rule: &ActiveRule,
        input: &RuleInput<'_>,
    ) -> Result<Option<CommonRuleIssue>> {
        let blocks = input.value(file, keys::DUPLICATED_BLOCKS)?.unwrap_or(0.0);
        if blocks <= 0.0 {
            return Ok(None);
        }
        Ok(Some(CommonRuleIssue {
            effort: blocks,
            message: format!("{} duplicated blocks of code must be removed.", blocks as i64),
        }))
    }
}
