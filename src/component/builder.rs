use super::{normalize_path, Component, ComponentId, ComponentTree, ComponentType, FileAttributes};
use crate::errors::{CeError, Result};
use crate::report::ReportComponent;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Builds a [`ComponentTree`] top-down from the components of a report.
///
/// Keys are derived from the project key: modules keep their report key,
/// directories and files become `<module key>:<path>`. Uuids already known
/// for a key are reused so that history survives across analyses.
#[derive(Debug, Clone)]
pub struct ComponentTreeBuilder {
    project_key: String,
    known_uuids: HashMap<String, String>,
}

impl ComponentTreeBuilder {
    pub fn new(project_key: impl Into<String>) -> Self {
        Self {
            project_key: project_key.into(),
            known_uuids: HashMap::new(),
        }
    }

    /// Uuids of previously persisted components, indexed by key.
    pub fn with_known_uuids(mut self, known_uuids: HashMap<String, String>) -> Self {
        self.known_uuids = known_uuids;
        self
    }

    pub fn build(&self, root_ref: u32, components: &[ReportComponent]) -> Result<ComponentTree> {
        let mut by_ref: HashMap<u32, &ReportComponent> = HashMap::with_capacity(components.len());
        for component in components {
            if by_ref.insert(component.reference, component).is_some() {
                return Err(CeError::report(format!(
                    "Component ref {} is declared twice",
                    component.reference
                )));
            }
        }

        let root = by_ref
            .get(&root_ref)
            .copied()
            .ok_or_else(|| CeError::report(format!("Root component ref {} is missing", root_ref)))?;
        if !root.component_type.is_root_type() {
            return Err(CeError::report(format!(
                "Root component must be a PROJECT or a VIEW, got {}",
                root.component_type
            )));
        }

        let mut nodes: Vec<Component> = Vec::with_capacity(components.len());
        let mut parents: Vec<Option<ComponentId>> = Vec::with_capacity(components.len());
        let mut visited: HashSet<u32> = HashSet::with_capacity(components.len());
        let mut keys: HashSet<String> = HashSet::with_capacity(components.len());
        // (report ref, parent id, key of the enclosing module)
        let mut stack: Vec<(u32, Option<ComponentId>, String)> =
            vec![(root_ref, None, self.project_key.clone())];

        while let Some((reference, parent, module_key)) = stack.pop() {
            let report_component = by_ref.get(&reference).copied().ok_or_else(|| {
                CeError::report(format!("Component ref {} is referenced but not declared", reference))
            })?;
            if !visited.insert(reference) {
                return Err(CeError::report(format!(
                    "Component ref {} is reachable more than once",
                    reference
                )));
            }
            if report_component.component_type == ComponentType::File
                && !report_component.children.is_empty()
            {
                return Err(CeError::report(format!(
                    "File component ref {} cannot have children",
                    reference
                )));
            }
            if parent.is_some() && report_component.component_type.is_root_type() {
                return Err(CeError::report(format!(
                    "Component ref {} of type {} can only be the root",
                    reference, report_component.component_type
                )));
            }

            let id = ComponentId(nodes.len());
            let key = self.component_key(report_component, &module_key);
            if !keys.insert(key.clone()) {
                return Err(CeError::report(format!(
                    "Component key {} is declared twice",
                    key
                )));
            }
            let child_module_key = match report_component.component_type {
                ComponentType::Project | ComponentType::Module => key.clone(),
                _ => module_key,
            };
            let uuid = self
                .known_uuids
                .get(&key)
                .cloned()
                .unwrap_or_else(|| Uuid::new_v4().to_string());

            nodes.push(Component {
                id,
                reference,
                uuid,
                key,
                component_type: report_component.component_type,
                name: report_component.name.clone(),
                path: report_component.path.as_deref().map(normalize_path),
                file_attributes: file_attributes(report_component),
                children: Vec::with_capacity(report_component.children.len()),
            });
            parents.push(parent);
            if let Some(parent) = parent {
                nodes[parent.0].children.push(id);
            }

            for child in report_component.children.iter().rev() {
                stack.push((*child, Some(id), child_module_key.clone()));
            }
        }

        Ok(ComponentTree::from_parts(nodes, parents, ComponentId(0)))
    }

    fn component_key(&self, component: &ReportComponent, module_key: &str) -> String {
        match component.component_type {
            ComponentType::Project => self.project_key.clone(),
            ComponentType::Directory | ComponentType::File => {
                let path = component
                    .path
                    .as_deref()
                    .map(normalize_path)
                    .unwrap_or_else(|| normalize_path(&component.name));
                format!("{}:{}", module_key, path)
            }
            ComponentType::Module
            | ComponentType::View
            | ComponentType::Subview
            | ComponentType::ProjectView => component
                .key
                .clone()
                .unwrap_or_else(|| format!("{}:{}", self.project_key, component.name)),
        }
    }
}

fn file_attributes(component: &ReportComponent) -> Option<FileAttributes> {
    (component.component_type == ComponentType::File).then(|| FileAttributes {
        language: component.language.clone(),
        unit_test: component.is_test,
        lines: component.lines,
    })
}
