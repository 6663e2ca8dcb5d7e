//! Per-task measure store.
//!
//! Holds the raw measures of the report and the measures computed by steps
//! and rules, keyed by (component ref, metric id). Computed measures shadow
//! raw ones when read back.

use crate::errors::{CeError, Result};
use crate::metric::{Metric, ValueType};
use crate::report::ReportValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MeasureValue {
    NoValue,
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
}

impl MeasureValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::NoValue | Self::String(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Whether this value can be stored for a metric of the given type.
    pub fn fits(&self, value_type: ValueType) -> bool {
        match self {
            Self::NoValue => true,
            Self::Int(_) => value_type.is_integer(),
            Self::Float(_) => matches!(value_type, ValueType::Float | ValueType::Percent),
            Self::Bool(_) => value_type == ValueType::Bool,
            Self::String(_) => value_type.is_textual(),
        }
    }

    /// Convert a report value into the kind expected by the metric.
    pub fn from_report(value: &ReportValue, metric: &Metric) -> Result<Self> {
        let converted = match (value, metric.value_type) {
            (ReportValue::Int(v), t) if t.is_integer() => Some(Self::Int(*v)),
            (ReportValue::Int(v), ValueType::Float | ValueType::Percent) => {
                Some(Self::Float(*v as f64))
            }
            (ReportValue::Float(v), ValueType::Float | ValueType::Percent) => Some(Self::Float(*v)),
            (ReportValue::Float(v), t) if t.is_integer() && v.fract() == 0.0 => {
                Some(Self::Int(*v as i64))
            }
            (ReportValue::Bool(v), ValueType::Bool) => Some(Self::Bool(*v)),
            (ReportValue::Text(v), t) if t.is_textual() => Some(Self::String(v.clone())),
            _ => None,
        };
        converted.ok_or_else(|| {
            CeError::state(format!(
                "Value {:?} is incompatible with metric '{}' of type {:?}",
                value, metric.key, metric.value_type
            ))
        })
    }
}

impl fmt::Display for MeasureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoValue => f.write_str("<none>"),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::String(v) => f.write_str(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub value: MeasureValue,
    /// Difference with the value of the period baseline
    #[serde(default)]
    pub variation: Option<f64>,
    #[serde(default)]
    pub data: Option<String>,
}

impl Measure {
    pub fn new(value: MeasureValue) -> Self {
        Self {
            value,
            variation: None,
            data: None,
        }
    }

    pub fn int(value: i64) -> Self {
        Self::new(MeasureValue::Int(value))
    }

    pub fn float(value: f64) -> Self {
        Self::new(MeasureValue::Float(value))
    }

    pub fn with_variation(mut self, variation: f64) -> Self {
        self.variation = Some(variation);
        self
    }
}

type MeasureKey = (u32, u32);

#[derive(Debug, Default)]
pub struct MeasureRepository {
    raw: HashMap<MeasureKey, Measure>,
    added: HashMap<MeasureKey, Measure>,
}

impl MeasureRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a measure read from the report.
    pub fn load_raw(&mut self, component_ref: u32, metric: &Metric, measure: Measure) -> Result<()> {
        check_value_type(metric, &measure)?;
        if self.raw.insert((component_ref, metric.id), measure).is_some() {
            return Err(CeError::state(format!(
                "Report contains two measures for metric '{}' on component ref {}",
                metric.key, component_ref
            )));
        }
        Ok(())
    }

    /// Computed measure if any, otherwise the measure from the report.
    pub fn get_raw_measure(&self, component_ref: u32, metric: &Metric) -> Option<&Measure> {
        let key = (component_ref, metric.id);
        self.added.get(&key).or_else(|| self.raw.get(&key))
    }

    pub fn has_measure(&self, component_ref: u32, metric: &Metric) -> bool {
        self.get_raw_measure(component_ref, metric).is_some()
    }

    /// Add a computed measure. Fails if any measure already exists for the pair.
    pub fn add(&mut self, component_ref: u32, metric: &Metric, measure: Measure) -> Result<()> {
        check_value_type(metric, &measure)?;
        let key = (component_ref, metric.id);
        if self.raw.contains_key(&key) || self.added.contains_key(&key) {
            return Err(CeError::state(format!(
                "a measure can be set only once for a specific Component (ref={}) and Metric (key={})",
                component_ref, metric.key
            )));
        }
        self.added.insert(key, measure);
        Ok(())
    }

    /// Replace an existing measure. Fails if none exists for the pair.
    pub fn update(&mut self, component_ref: u32, metric: &Metric, measure: Measure) -> Result<()> {
        check_value_type(metric, &measure)?;
        let key = (component_ref, metric.id);
        if !self.raw.contains_key(&key) && !self.added.contains_key(&key) {
            return Err(CeError::state(format!(
                "a measure can be updated only if one already exists for a specific Component (ref={}) and Metric (key={})",
                component_ref, metric.key
            )));
        }
        self.added.insert(key, measure);
        Ok(())
    }

    /// Every measure of a component as (metric id, measure), ordered by metric id.
    pub fn raw_measures_of(&self, component_ref: u32) -> Vec<(u32, &Measure)> {
        let mut merged: HashMap<u32, &Measure> = self
            .raw
            .iter()
            .filter(|((c, _), _)| *c == component_ref)
            .map(|((_, metric), m)| (*metric, m))
            .collect();
        for ((c, metric), m) in &self.added {
            if *c == component_ref {
                merged.insert(*metric, m);
            }
        }
        let mut out: Vec<(u32, &Measure)> = merged.into_iter().collect();
        out.sort_by_key(|(metric, _)| *metric);
        out
    }

    pub fn len(&self) -> usize {
        let shadowed = self.added.keys().filter(|k| self.raw.contains_key(k)).count();
        self.raw.len() + self.added.len() - shadowed
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty() && self.added.is_empty()
    }
}

fn check_value_type(metric: &Metric, measure: &Measure) -> Result<()> {
    if measure.value.fits(metric.value_type) {
        Ok(())
    } else {
        Err(CeError::state(format!(
            "Measure's ValueType {:?} is not consistent with the Metric's ValueType {:?} (key={})",
            measure.value, metric.value_type, metric.key
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{core_metrics, keys, MetricRepository};

    fn metrics() -> MetricRepository {
        MetricRepository::new(core_metrics())
    }

    #[test]
    fn test_add_twice_fails() {
        let metrics = metrics();
        let ncloc = metrics.get_by_key(keys::NCLOC).unwrap();
        let mut repo = MeasureRepository::new();
        repo.add(1, ncloc, Measure::int(10)).unwrap();
        let err = repo.add(1, ncloc, Measure::int(10)).unwrap_err();
        assert!(err.to_string().contains("can be set only once"));
    }

    #[test]
    fn test_add_over_raw_measure_fails() {
        let metrics = metrics();
        let ncloc = metrics.get_by_key(keys::NCLOC).unwrap();
        let mut repo = MeasureRepository::new();
        repo.load_raw(1, ncloc, Measure::int(10)).unwrap();
        assert!(repo.add(1, ncloc, Measure::int(11)).is_err());
    }

    #[test]
    fn test_update_requires_existing_measure() {
        let metrics = metrics();
        let ncloc = metrics.get_by_key(keys::NCLOC).unwrap();
        let mut repo = MeasureRepository::new();
        assert!(repo.update(1, ncloc, Measure::int(1)).is_err());
        repo.add(1, ncloc, Measure::int(1)).unwrap();
        repo.update(1, ncloc, Measure::int(1)).unwrap();
        repo.update(1, ncloc, Measure::int(2)).unwrap();
        assert_eq!(repo.get_raw_measure(1, ncloc).unwrap().value, MeasureValue::Int(2));
    }

    #[test]
    fn test_value_type_must_match_metric() {
        let metrics = metrics();
        let coverage = metrics.get_by_key(keys::COVERAGE).unwrap();
        let mut repo = MeasureRepository::new();
        assert!(repo.add(1, coverage, Measure::int(3)).is_err());
        assert!(repo.add(1, coverage, Measure::new(MeasureValue::NoValue)).is_ok());
    }

    #[test]
    fn test_computed_measure_shadows_raw() {
        let metrics = metrics();
        let lines = metrics.get_by_key(keys::LINES).unwrap();
        let ncloc = metrics.get_by_key(keys::NCLOC).unwrap();
        let mut repo = MeasureRepository::new();
        repo.load_raw(7, lines, Measure::int(100)).unwrap();
        repo.load_raw(7, ncloc, Measure::int(80)).unwrap();
        repo.update(7, ncloc, Measure::int(81)).unwrap();
        let all = repo.raw_measures_of(7);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0, lines.id);
        assert_eq!(all[1].1.value, MeasureValue::Int(81));
        assert_eq!(repo.len(), 2);
        assert!(repo.raw_measures_of(8).is_empty());
    }

    #[test]
    fn test_from_report_converts_by_metric_type() {
        let metrics = metrics();
        let coverage = metrics.get_by_key(keys::COVERAGE).unwrap();
        let ncloc = metrics.get_by_key(keys::NCLOC).unwrap();
        assert_eq!(
            MeasureValue::from_report(&ReportValue::Int(50), coverage).unwrap(),
            MeasureValue::Float(50.0)
        );
        assert!(MeasureValue::from_report(&ReportValue::Float(1.5), ncloc).is_err());
        assert!(MeasureValue::from_report(&ReportValue::Text("x".into()), ncloc).is_err());
    }
}
