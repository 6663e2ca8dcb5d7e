//! Issues raised on components.
//!
//! Issues come from the report or from the common rules, go through the
//! [`IssueFilter`] and are tracked against the issues of the previous analysis
//! so that keys and creation dates survive re-analysis.

pub mod filter;
pub mod tracking;

pub use filter::{IssueFilter, IssuePattern};
pub use tracking::{track, TrackingResult};

use crate::errors::{CeError, Result};
use crate::rules::RuleKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Minor,
    #[default]
    Major,
    Critical,
    Blocker,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Minor => "MINOR",
            Self::Major => "MAJOR",
            Self::Critical => "CRITICAL",
            Self::Blocker => "BLOCKER",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = CeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INFO" => Ok(Self::Info),
            "MINOR" => Ok(Self::Minor),
            "MAJOR" => Ok(Self::Major),
            "CRITICAL" => Ok(Self::Critical),
            "BLOCKER" => Ok(Self::Blocker),
            other => Err(CeError::config(format!("Unknown severity '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub key: String,
    pub rule_key: RuleKey,
    pub project_uuid: String,
    pub component_uuid: String,
    pub message: String,
    pub severity: Severity,
    #[serde(default)]
    pub line: Option<u32>,
    /// Effort to fix, in the unit of the rule
    #[serde(default)]
    pub gap: Option<f64>,
    pub status: IssueStatus,
    pub creation_date: i64,
    pub update_date: i64,
    #[serde(default)]
    pub close_date: Option<i64>,
}

impl Issue {
    pub fn is_open(&self) -> bool {
        self.status == IssueStatus::Open
    }

    pub fn is_closed(&self) -> bool {
        self.status == IssueStatus::Closed
    }
}

/// Issue produced during the current analysis, before tracking assigns it a key.
#[derive(Debug, Clone, PartialEq)]
pub struct RawIssue {
    pub rule_key: RuleKey,
    pub component_ref: u32,
    pub message: String,
    pub severity: Severity,
    pub line: Option<u32>,
    pub gap: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_parsing() {
        assert_eq!("critical".parse::<Severity>().unwrap(), Severity::Critical);
        assert_eq!(" MAJOR ".parse::<Severity>().unwrap(), Severity::Major);
        assert!("urgent".parse::<Severity>().is_err());
        assert!(Severity::Blocker > Severity::Info);
    }
}
