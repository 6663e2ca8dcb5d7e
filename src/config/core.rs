use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::settings::Settings;
use crate::errors::Result;
use crate::issue::Severity;
use crate::rules::{ActiveRule, ActiveRulesHolder, RuleKey};

pub const PURGE_PROFILING_KEY: &str = "ce.purge.profiling";
pub const KEEP_HISTORY_DAYS_KEY: &str = "ce.purge.keepHistoryDays";
pub const DELETE_CLOSED_ISSUES_DAYS_KEY: &str = "ce.purge.deleteClosedIssuesAfterDays";

/// Root configuration structure for the compute engine
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CeConfig {
    /// Worker pool configuration
    #[serde(default)]
    pub workers: WorkersConfig,

    /// Retention and purge configuration
    #[serde(default)]
    pub purge: PurgeConfig,

    /// Global settings, e.g. `ce.newCode.period`
    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    /// Per-project setting overrides, keyed by project key
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectConfig>,

    /// Rules of the quality profile
    #[serde(default)]
    pub active_rules: Vec<ActiveRuleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_worker_count")]
    pub count: usize,
    /// How long an idle worker waits before polling the queue again
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Parent directory of the per-task working directories
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            poll_interval_ms: default_poll_interval_ms(),
            work_dir: None,
        }
    }
}

fn default_worker_count() -> usize {
    1
}

fn default_poll_interval_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeConfig {
    #[serde(default)]
    pub profiling: bool,
    #[serde(default = "default_keep_history_days")]
    pub keep_history_days: i64,
    #[serde(default = "default_delete_closed_issues_after_days")]
    pub delete_closed_issues_after_days: i64,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            profiling: false,
            keep_history_days: default_keep_history_days(),
            delete_closed_issues_after_days: default_delete_closed_issues_after_days(),
        }
    }
}

fn default_keep_history_days() -> i64 {
    365
}

fn default_delete_closed_issues_after_days() -> i64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectConfig {
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveRuleConfig {
    pub key: String,
    #[serde(default = "default_severity")]
    pub severity: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

fn default_severity() -> String {
    "MAJOR".to_string()
}

impl CeConfig {
    /// Layered settings: purge section, then `[properties]`, then project overrides.
    pub fn settings(&self) -> Settings {
        let mut global = BTreeMap::from([
            (PURGE_PROFILING_KEY.to_string(), self.purge.profiling.to_string()),
            (
                KEEP_HISTORY_DAYS_KEY.to_string(),
                self.purge.keep_history_days.to_string(),
            ),
            (
                DELETE_CLOSED_ISSUES_DAYS_KEY.to_string(),
                self.purge.delete_closed_issues_after_days.to_string(),
            ),
        ]);
        global.extend(self.properties.clone());

        let mut settings = Settings::new(global);
        for (project_key, project) in &self.projects {
            for (key, value) in &project.properties {
                settings.set_for_component(project_key, key, value);
            }
        }
        settings
    }

    pub fn active_rules(&self) -> Result<ActiveRulesHolder> {
        let rules = self
            .active_rules
            .iter()
            .map(|rule| {
                let rule_key: RuleKey = rule.key.parse()?;
                let severity: Severity = rule.severity.parse()?;
                Ok(ActiveRule {
                    rule_key,
                    severity,
                    params: rule.params.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ActiveRulesHolder::new(rules))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn test_defaults() {
        let config = CeConfig::default();
        assert_eq!(config.workers.count, 1);
        assert_eq!(config.purge.keep_history_days, 365);
        let settings = config.settings();
        assert_eq!(settings.get_bool(PURGE_PROFILING_KEY).unwrap(), Some(false));
        assert_eq!(settings.get_i64(DELETE_CLOSED_ISSUES_DAYS_KEY).unwrap(), Some(30));
    }

    #[test]
    fn test_properties_override_purge_section() {
        let config: CeConfig = toml::from_str(indoc! {r#"
            [purge]
            profiling = true
            keep_history_days = 10

            [properties]
            "ce.purge.keepHistoryDays" = "20"

            [projects."proj".properties]
            "ce.purge.keepHistoryDays" = "5"

            [[active_rules]]
            key = "common-java:DuplicatedBlocks"
            params = { foo = "bar" }
        "#})
        .unwrap();
        let settings = config.settings();
        assert_eq!(settings.get_i64(KEEP_HISTORY_DAYS_KEY).unwrap(), Some(20));
        assert_eq!(
            settings.for_component("proj").get_i64(KEEP_HISTORY_DAYS_KEY).unwrap(),
            Some(5)
        );
        let rules = config.active_rules().unwrap();
        let rule = rules.get(&RuleKey::common("java", "DuplicatedBlocks")).unwrap();
        assert_eq!(rule.severity, Severity::Major);
        assert_eq!(rule.param("foo"), Some("bar"));
    }

    #[test]
    fn test_invalid_rule_key() {
        let config = CeConfig {
            active_rules: vec![ActiveRuleConfig {
                key: "no-repository".into(),
                severity: "MAJOR".into(),
                params: BTreeMap::new(),
            }],
            ..CeConfig::default()
        };
        assert!(config.active_rules().is_err());
    }
}
