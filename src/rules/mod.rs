//! Rule keys, active rules and the common rule engine.
//!
//! Common rules derive issues from file measures (comment density, coverage,
//! duplications, unit tests) rather than from static analysis. They live in
//! the `common-<language>` repository and are activated per language through
//! the active rules of the quality profile.

mod comment_density;
mod coverage;
mod duplications;
mod engine;

pub use comment_density::CommentDensityRule;
pub use coverage::{BranchCoverageRule, LineCoverageRule};
pub use duplications::DuplicatedBlocksRule;
pub use engine::{CommonRule, CommonRuleEngine, CommonRuleIssue, RuleInput};
pub use unit_tests::{FailedUnitTestsRule, SkippedUnitTestsRule};

use crate::errors::{CeError, Result};
use crate::issue::Severity;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

pub const COMMON_REPOSITORY_PREFIX: &str = "common-";

/// `repository:rule`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RuleKey {
    repository: String,
    rule: String,
}

impl RuleKey {
    pub fn new(repository: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            rule: rule.into(),
        }
    }

    /// Key of a common rule for the given language.
    pub fn common(language: &str, rule: &str) -> Self {
        Self::new(format!("{}{}", COMMON_REPOSITORY_PREFIX, language), rule)
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn rule(&self) -> &str {
        &self.rule
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.rule)
    }
}

impl FromStr for RuleKey {
    type Err = CeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((repository, rule)) if !repository.is_empty() && !rule.is_empty() => {
                Ok(Self::new(repository, rule))
            }
            _ => Err(CeError::config(format!(
                "Invalid rule key '{}', expected <repository>:<rule>",
                s
            ))),
        }
    }
}

impl TryFrom<String> for RuleKey {
    type Error = CeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RuleKey> for String {
    fn from(key: RuleKey) -> Self {
        key.to_string()
    }
}

/// A rule activated in the quality profile, with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveRule {
    pub rule_key: RuleKey,
    pub severity: Severity,
    pub params: BTreeMap<String, String>,
}

impl ActiveRule {
    pub fn new(rule_key: RuleKey, severity: Severity) -> Self {
        Self {
            rule_key,
            severity,
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// Active rules of the analysed project, loaded once per task.
#[derive(Debug, Clone, Default)]
pub struct ActiveRulesHolder {
    rules: HashMap<RuleKey, ActiveRule>,
}

impl ActiveRulesHolder {
    pub fn new(rules: impl IntoIterator<Item = ActiveRule>) -> Self {
        Self {
            rules: rules
                .into_iter()
                .map(|r| (r.rule_key.clone(), r))
                .collect(),
        }
    }

    pub fn get(&self, key: &RuleKey) -> Option<&ActiveRule> {
        self.rules.get(key)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Java-like rendering of a double: integral values keep one decimal.
pub(crate) fn format_double(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}
