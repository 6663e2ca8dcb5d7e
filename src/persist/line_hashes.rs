use super::Diffable;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Per-line hashes of a source file, used to track issues across edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineHashes {
    pub file_uuid: String,
    pub project_uuid: String,
    pub hashes: Vec<String>,
    pub src_hash: String,
    pub line_count: usize,
}

impl LineHashes {
    pub fn compute(project_uuid: &str, file_uuid: &str, lines: &[String]) -> Self {
        Self {
            file_uuid: file_uuid.to_string(),
            project_uuid: project_uuid.to_string(),
            hashes: lines.iter().map(|line| line_hash(line)).collect(),
            src_hash: sha256_hex(&lines.join("\n")),
            line_count: lines.len(),
        }
    }
}

/// Hash of a line ignoring whitespace; blank lines hash to an empty string.
pub fn line_hash(line: &str) -> String {
    let stripped: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    if stripped.is_empty() {
        String::new()
    } else {
        sha256_hex(&stripped)
    }
}

fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl Diffable for LineHashes {
    fn uuid(&self) -> &str {
        &self.file_uuid
    }

    fn scope(&self) -> &str {
        &self.project_uuid
    }

    fn same_content(&self, other: &Self) -> bool {
        self.src_hash == other.src_hash && self.hashes == other.hashes
    }

    fn component_uuids(&self) -> Vec<&str> {
        vec![self.file_uuid.as_str()]
    }
}
