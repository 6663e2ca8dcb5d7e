//! Validation with error accumulation for configuration.
//!
//! Checks return stillwater's [`Validation`] so that every problem is
//! collected, and a single run shows all configuration issues at once.
//! [`validate_config_result`] wraps the accumulated errors for fail-fast
//! callers such as the loader.

use std::collections::BTreeMap;

use stillwater::{NonEmptyVec, Validation};

use super::core::{
    ActiveRuleConfig, CeConfig, DELETE_CLOSED_ISSUES_DAYS_KEY, KEEP_HISTORY_DAYS_KEY,
};
use crate::clock::DAY_MILLIS;
use crate::errors::{CeError, Result};
use crate::issue::Severity;
use crate::rules::RuleKey;

/// Validation result accumulating human-readable messages.
pub type ConfigValidation<T> = Validation<T, NonEmptyVec<String>>;

fn success() -> ConfigValidation<()> {
    Validation::Success(())
}

fn failure(message: String) -> ConfigValidation<()> {
    Validation::Failure(NonEmptyVec::new(message, Vec::new()))
}

fn ensure(condition: bool, message: impl FnOnce() -> String) -> ConfigValidation<()> {
    if condition {
        success()
    } else {
        failure(message())
    }
}

/// Combine validations, keeping every error in order.
fn combine(validations: Vec<ConfigValidation<()>>) -> ConfigValidation<()> {
    let errors: Vec<String> = validations
        .into_iter()
        .filter_map(|v| match v {
            Validation::Success(()) => None,
            Validation::Failure(errors) => Some(errors.into_vec()),
        })
        .flatten()
        .collect();
    match NonEmptyVec::from_vec(errors) {
        Some(errors) => Validation::Failure(errors),
        None => success(),
    }
}

/// Validate entire config, accumulating ALL errors.
pub fn validate_config(config: &CeConfig) -> ConfigValidation<()> {
    let mut validations = vec![
        ensure(config.workers.count > 0, || {
            "workers.count must be at least 1".to_string()
        }),
        ensure(config.workers.poll_interval_ms > 0, || {
            "workers.poll_interval_ms must be positive".to_string()
        }),
        validate_retention("purge.keep_history_days", config.purge.keep_history_days),
        validate_retention(
            "purge.delete_closed_issues_after_days",
            config.purge.delete_closed_issues_after_days,
        ),
        validate_retention_properties("properties", &config.properties),
    ];
    validations.extend(config.projects.iter().map(|(key, project)| {
        validate_retention_properties(&format!("projects.{}", key), &project.properties)
    }));
    validations.extend(config.active_rules.iter().map(validate_active_rule));
    combine(validations)
}

/// Validate config with fail-fast Result API.
pub fn validate_config_result(config: &CeConfig) -> Result<()> {
    match validate_config(config) {
        Validation::Success(()) => Ok(()),
        Validation::Failure(errors) => Err(CeError::config(errors.into_vec().join("; "))),
    }
}

/// A retention period is a day count whose span in millis fits an `i64`.
fn validate_retention(field: &str, days: i64) -> ConfigValidation<()> {
    if days < 0 {
        failure(format!("{} cannot be negative, got {}", field, days))
    } else if days.checked_mul(DAY_MILLIS).is_none() {
        failure(format!("{} is out of range, got {}", field, days))
    } else {
        success()
    }
}

/// Retention settings given as raw properties, globally or per project.
fn validate_retention_properties(
    section: &str,
    properties: &BTreeMap<String, String>,
) -> ConfigValidation<()> {
    let validations = [KEEP_HISTORY_DAYS_KEY, DELETE_CLOSED_ISSUES_DAYS_KEY]
        .into_iter()
        .filter_map(|key| properties.get(key).map(|value| (key, value)))
        .map(|(key, value)| {
            let field = format!("{}.\"{}\"", section, key);
            match value.trim().parse::<i64>() {
                Ok(days) => validate_retention(&field, days),
                Err(_) => failure(format!("{} must be a number of days, got '{}'", field, value)),
            }
        })
        .collect();
    combine(validations)
}

fn validate_active_rule(rule: &ActiveRuleConfig) -> ConfigValidation<()> {
    combine(vec![
        ensure(rule.key.parse::<RuleKey>().is_ok(), || {
            format!(
                "active rule key '{}' must have the form <repository>:<rule>",
                rule.key
            )
        }),
        ensure(rule.severity.parse::<Severity>().is_ok(), || {
            format!(
                "active rule '{}' has an unknown severity '{}'",
                rule.key, rule.severity
            )
        }),
    ])
}
