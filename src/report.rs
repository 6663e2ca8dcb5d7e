//! Scanner report model.
//!
//! The report is an opaque blob for the queue; the pipeline decodes it as JSON
//! into [`ScannerReport`] inside the task container.

use crate::component::ComponentType;
use crate::errors::{CeError, Result};
use crate::issue::Severity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerReport {
    pub metadata: ReportMetadata,
    #[serde(default)]
    pub components: Vec<ReportComponent>,
    #[serde(default)]
    pub measures: Vec<ReportMeasure>,
    #[serde(default)]
    pub issues: Vec<ReportIssue>,
    #[serde(default)]
    pub dependencies: Vec<ReportDependency>,
    #[serde(default)]
    pub sources: Vec<ReportSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub project_key: String,
    #[serde(default)]
    pub branch: Option<String>,
    /// Analysis date in milliseconds since epoch
    pub analysis_date: i64,
    #[serde(default)]
    pub project_version: Option<String>,
    pub root_component_ref: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportComponent {
    #[serde(rename = "ref")]
    pub reference: u32,
    #[serde(rename = "type")]
    pub component_type: ComponentType,
    #[serde(default)]
    pub key: Option<String>,
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub is_test: bool,
    #[serde(default)]
    pub lines: Option<u32>,
    #[serde(default)]
    pub children: Vec<u32>,
}

impl ReportComponent {
    pub fn new(reference: u32, component_type: ComponentType, name: impl Into<String>) -> Self {
        Self {
            reference,
            component_type,
            key: None,
            name: name.into(),
            path: None,
            language: None,
            is_test: false,
            lines: None,
            children: Vec::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_children(mut self, children: &[u32]) -> Self {
        self.children = children.to_vec();
        self
    }

    pub fn unit_test(mut self) -> Self {
        self.is_test = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMeasure {
    pub component_ref: u32,
    pub metric_key: String,
    pub value: ReportValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportIssue {
    pub component_ref: u32,
    pub rule_key: String,
    pub message: String,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub gap: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDependency {
    pub from_ref: u32,
    pub to_ref: u32,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSource {
    pub component_ref: u32,
    pub lines: Vec<String>,
}

impl ScannerReport {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let report: ScannerReport = serde_json::from_slice(bytes)?;
        if report.metadata.project_key.trim().is_empty() {
            return Err(CeError::report("project key is missing"));
        }
        Ok(report)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn component(&self, reference: u32) -> Option<&ReportComponent> {
        self.components.iter().find(|c| c.reference == reference)
    }
}
