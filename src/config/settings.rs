use crate::errors::{CeError, Result};
use std::collections::BTreeMap;

/// Key/value settings with per-component overrides.
///
/// Values are strings, converted on read by the typed getters. Multi-value
/// settings are comma-separated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    global: BTreeMap<String, String>,
    components: BTreeMap<String, BTreeMap<String, String>>,
}

impl Settings {
    pub fn new(global: BTreeMap<String, String>) -> Self {
        Self {
            global,
            components: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.global.insert(key.to_string(), value.to_string());
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    /// Register an override of `key` for one component.
    pub fn set_for_component(&mut self, component_key: &str, key: &str, value: &str) {
        self.components
            .entry(component_key.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    /// Settings as seen by one component: its overrides win over global values.
    pub fn for_component(&self, component_key: &str) -> Settings {
        let mut global = self.global.clone();
        if let Some(overrides) = self.components.get(component_key) {
            global.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Settings::new(global)
    }

    /// Trimmed value; blank values read as absent.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.global
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        self.get_string(key)
            .map(|v| match v.to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(invalid(key, v, "a boolean")),
            })
            .transpose()
    }

    pub fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        self.get_string(key)
            .map(|v| v.parse::<i64>().map_err(|_| invalid(key, v, "an integer")))
            .transpose()
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>> {
        self.get_string(key)
            .map(|v| v.parse::<f64>().map_err(|_| invalid(key, v, "a number")))
            .transpose()
    }

    pub fn get_strings(&self, key: &str) -> Vec<String> {
        self.get_string(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the key is set at all, blank values included.
    pub fn contains_key(&self, key: &str) -> bool {
        self.global.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.global.keys().map(String::as_str)
    }
}

fn invalid(key: &str, value: &str, expected: &str) -> CeError {
    CeError::config(format!(
        "Setting '{}' must be {}, got '{}'",
        key, expected, value
    ))
}
