//! Component tree model.
//!
//! A task works on one immutable tree of components (project, modules,
//! directories, files) built from the scanner report. Views use the same
//! model with VIEW/SUBVIEW/PROJECT_VIEW nodes.

mod builder;
mod tree;

pub use builder::ComponentTreeBuilder;
pub use tree::ComponentTree;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a node in the component tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentType {
    Project,
    Module,
    Directory,
    File,
    View,
    Subview,
    ProjectView,
}

impl ComponentType {
    /// Aggregated virtual components: they hold no independent history.
    pub fn is_view_type(self) -> bool {
        matches!(self, Self::View | Self::Subview | Self::ProjectView)
    }

    /// Types allowed as the root of a tree.
    pub fn is_root_type(self) -> bool {
        matches!(self, Self::Project | Self::View)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Project => "PROJECT",
            Self::Module => "MODULE",
            Self::Directory => "DIRECTORY",
            Self::File => "FILE",
            Self::View => "VIEW",
            Self::Subview => "SUBVIEW",
            Self::ProjectView => "PROJECT_VIEW",
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a component inside its [`ComponentTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(pub(crate) usize);

/// Attributes only files carry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileAttributes {
    pub language: Option<String>,
    pub unit_test: bool,
    pub lines: Option<u32>,
}

/// A node of the component tree.
#[derive(Debug, Clone)]
pub struct Component {
    pub(crate) id: ComponentId,
    /// Task-local reference from the scanner report
    pub reference: u32,
    /// Global identifier, reused across analyses
    pub uuid: String,
    pub key: String,
    pub component_type: ComponentType,
    pub name: String,
    /// Normalized, forward-slash path relative to the module (directories and files)
    pub path: Option<String>,
    pub file_attributes: Option<FileAttributes>,
    pub(crate) children: Vec<ComponentId>,
}

impl Component {
    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn is_file(&self) -> bool {
        self.component_type == ComponentType::File
    }

    pub fn language(&self) -> Option<&str> {
        self.file_attributes
            .as_ref()
            .and_then(|attrs| attrs.language.as_deref())
    }

    pub fn is_unit_test(&self) -> bool {
        self.file_attributes
            .as_ref()
            .is_some_and(|attrs| attrs.unit_test)
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[ref={}, key={}]",
            self.component_type, self.reference, self.key
        )
    }
}

/// Normalize a path to forward slashes without leading `./` or `/`.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let trimmed = unified.trim_start_matches("./").trim_start_matches('/');
    trimmed
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("./src/main.rs"), "src/main.rs");
        assert_eq!(normalize_path("src\\lib\\a.rs"), "src/lib/a.rs");
        assert_eq!(normalize_path("/src//a/./b.rs"), "src/a/b.rs");
    }

    #[test]
    fn test_view_types() {
        assert!(ComponentType::View.is_view_type());
        assert!(ComponentType::Subview.is_view_type());
        assert!(!ComponentType::Project.is_view_type());
        assert!(ComponentType::Project.is_root_type());
        assert!(!ComponentType::Module.is_root_type());
    }
}
