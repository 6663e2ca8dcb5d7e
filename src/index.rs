//! Search collaborator.
//!
//! The last step of an analysis pushes documents to a search engine. The
//! engine itself is out of reach; the pipeline only sees [`SearchIndexer`].

use crate::errors::Result;
use crate::issue::{IssueStatus, Severity};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexDocument {
    ProjectMeasures {
        project_uuid: String,
        project_key: String,
        analysis_uuid: String,
        analysis_date: i64,
        /// Numeric measures of the root component, by metric key
        measures: BTreeMap<String, f64>,
    },
    Issue {
        key: String,
        project_uuid: String,
        component_uuid: String,
        rule_key: String,
        severity: Severity,
        status: IssueStatus,
        line: Option<u32>,
    },
}

impl IndexDocument {
    pub fn id(&self) -> &str {
        match self {
            Self::ProjectMeasures { project_uuid, .. } => project_uuid,
            Self::Issue { key, .. } => key,
        }
    }
}

pub trait SearchIndexer: Send + Sync {
    fn index(&self, documents: Vec<IndexDocument>) -> Result<()>;
}

/// Keeps the latest version of every document, by id.
#[derive(Debug, Default)]
pub struct MemoryIndexer {
    documents: Mutex<BTreeMap<String, IndexDocument>>,
}

impl MemoryIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn documents(&self) -> Vec<IndexDocument> {
        self.documents.lock().values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<IndexDocument> {
        self.documents.lock().get(id).cloned()
    }
}

impl SearchIndexer for MemoryIndexer {
    fn index(&self, documents: Vec<IndexDocument>) -> Result<()> {
        let mut stored = self.documents.lock();
        for document in documents {
            stored.insert(document.id().to_string(), document);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopIndexer;

impl SearchIndexer for NoopIndexer {
    fn index(&self, _documents: Vec<IndexDocument>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_doc(analysis: &str) -> IndexDocument {
        IndexDocument::ProjectMeasures {
            project_uuid: "p1".into(),
            project_key: "proj".into(),
            analysis_uuid: analysis.into(),
            analysis_date: 0,
            measures: BTreeMap::new(),
        }
    }

    #[test]
    fn test_reindexing_replaces_document() {
        let indexer = MemoryIndexer::new();
        indexer.index(vec![project_doc("a1")]).unwrap();
        indexer.index(vec![project_doc("a2")]).unwrap();
        assert_eq!(indexer.documents().len(), 1);
        assert_eq!(indexer.get("p1"), Some(project_doc("a2")));
    }
}
