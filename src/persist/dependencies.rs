use super::Diffable;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dependency between two files of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDependency {
    pub uuid: String,
    pub project_uuid: String,
    pub from_component_uuid: String,
    pub to_component_uuid: String,
    pub weight: u32,
}

impl FileDependency {
    /// The uuid only depends on both ends, so it is stable across analyses.
    pub fn new(project_uuid: &str, from: &str, to: &str, weight: u32) -> Self {
        let name = format!("{}->{}", from, to);
        Self {
            uuid: Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string(),
            project_uuid: project_uuid.to_string(),
            from_component_uuid: from.to_string(),
            to_component_uuid: to.to_string(),
            weight,
        }
    }
}

impl Diffable for FileDependency {
    fn uuid(&self) -> &str {
        &self.uuid
    }

    fn scope(&self) -> &str {
        &self.project_uuid
    }

    fn same_content(&self, other: &Self) -> bool {
        self.from_component_uuid == other.from_component_uuid
            && self.to_component_uuid == other.to_component_uuid
            && self.weight == other.weight
    }

    fn component_uuids(&self) -> Vec<&str> {
        vec![self.from_component_uuid.as_str(), self.to_component_uuid.as_str()]
    }
}
